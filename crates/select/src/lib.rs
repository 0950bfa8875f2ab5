//! Converge select: resource selectors, conditions and asserts.
//!
//! A [`ResourceSelector`] is an OR over [`SelectorTerm`]s; each term is an AND
//! over its field, label and annotation constraints. [`Condition`] adds a
//! counting operator on top of a selector and [`Assert`] combines conditions.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use converge_core::{PathError, ResourceError};

mod assert;
mod matcher;

pub use assert::{evaluate_assert, evaluate_condition, AssertOutcome, ConditionOutcome};
pub use matcher::{matches, matches_term, CompiledSelector};

/// One AND-group of constraints. Values are compared as strings, see
/// [`converge_core::render_scalar`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorTerm {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_fields: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_annotations: BTreeMap<String, String>,
}

impl SelectorTerm {
    pub fn field(mut self, path: &str, expected: &str) -> Self {
        self.match_fields.insert(path.to_string(), expected.to_string());
        self
    }

    pub fn label(mut self, key: &str, expected: &str) -> Self {
        self.match_labels.insert(key.to_string(), expected.to_string());
        self
    }

    pub fn annotation(mut self, key: &str, expected: &str) -> Self {
        self.match_annotations.insert(key.to_string(), expected.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSelector {
    #[serde(default)]
    pub selector_terms: SmallVec<[SelectorTerm; 2]>,
}

impl ResourceSelector {
    pub fn new(terms: impl IntoIterator<Item = SelectorTerm>) -> Self {
        Self { selector_terms: terms.into_iter().collect() }
    }

    /// Shorthand for a single term matching `kind` (and nothing else).
    pub fn kind(kind: &str) -> Self {
        Self::new([SelectorTerm::default().field("kind", kind)])
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceOperator {
    #[default]
    Exists,
    NotExist,
    EqualsCount,
    #[serde(rename = "GTE")]
    Gte,
    #[serde(rename = "LTE")]
    Lte,
}

impl ResourceOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceOperator::Exists => "Exists",
            ResourceOperator::NotExist => "NotExist",
            ResourceOperator::EqualsCount => "EqualsCount",
            ResourceOperator::Gte => "GTE",
            ResourceOperator::Lte => "LTE",
        }
    }

    pub fn needs_count(&self) -> bool {
        matches!(self, ResourceOperator::EqualsCount | ResourceOperator::Gte | ResourceOperator::Lte)
    }
}

impl fmt::Display for ResourceOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub resource_selector: ResourceSelector,
    #[serde(default)]
    pub operator: ResourceOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
}

impl Condition {
    /// Validated constructor.
    pub fn new(resource_selector: ResourceSelector, operator: ResourceOperator, count: Option<i64>) -> Result<Self, SelectError> {
        let c = Self { resource_selector, operator, count };
        c.validate()?;
        Ok(c)
    }

    pub fn exists(resource_selector: ResourceSelector) -> Self {
        Self { resource_selector, operator: ResourceOperator::Exists, count: None }
    }

    pub fn validate(&self) -> Result<(), SelectError> {
        if self.resource_selector.selector_terms.is_empty() {
            return Err(SelectError::EmptySelector);
        }
        match self.count {
            None if self.operator.needs_count() => Err(SelectError::MissingCount(self.operator)),
            Some(n) if n < 0 => Err(SelectError::NegativeCount(n)),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssertOperator {
    #[default]
    #[serde(rename = "OR")]
    Or,
    #[serde(rename = "AND")]
    And,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assert {
    #[serde(default)]
    pub operator: AssertOperator,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Assert {
    pub fn any(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self { operator: AssertOperator::Or, conditions: conditions.into_iter().collect() }
    }

    pub fn all(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Self { operator: AssertOperator::And, conditions: conditions.into_iter().collect() }
    }

    pub fn validate(&self) -> Result<(), SelectError> {
        self.conditions.iter().try_for_each(Condition::validate)
    }
}

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("resource selector has no selector terms")]
    EmptySelector,
    #[error("operator {0} requires a count")]
    MissingCount(ResourceOperator),
    #[error("count must not be negative, got {0}")]
    NegativeCount(i64),
    #[error("no resources to evaluate {0} condition(s) against")]
    NoCandidates(usize),
    #[error("selector field {path:?}: {source}")]
    Path {
        path: String,
        #[source]
        source: PathError,
    },
    #[error("reading {id}: {source}")]
    Resource {
        id: String,
        #[source]
        source: ResourceError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_is_required_for_counting_operators() {
        let sel = ResourceSelector::kind("Pod");
        for op in [ResourceOperator::EqualsCount, ResourceOperator::Gte, ResourceOperator::Lte] {
            assert!(matches!(Condition::new(sel.clone(), op, None), Err(SelectError::MissingCount(o)) if o == op));
            assert!(Condition::new(sel.clone(), op, Some(2)).is_ok());
        }
        for op in [ResourceOperator::Exists, ResourceOperator::NotExist] {
            assert!(Condition::new(sel.clone(), op, None).is_ok());
        }
        assert!(matches!(Condition::new(sel, ResourceOperator::Gte, Some(-1)), Err(SelectError::NegativeCount(-1))));
    }

    #[test]
    fn empty_selector_is_invalid() {
        let err = Condition::new(ResourceSelector::default(), ResourceOperator::Exists, None).unwrap_err();
        assert!(matches!(err, SelectError::EmptySelector));
    }

    #[test]
    fn decodes_wire_names() {
        let yaml = r#"
operator: AND
conditions:
  - resourceSelector:
      selectorTerms:
        - matchFields: {kind: Pod}
          matchLabels: {app: web}
    operator: GTE
    count: 2
  - resourceSelector:
      selectorTerms:
        - matchFields: {kind: Service}
"#;
        let a: Assert = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(a.operator, AssertOperator::And);
        assert_eq!(a.conditions.len(), 2);
        assert_eq!(a.conditions[0].operator, ResourceOperator::Gte);
        assert_eq!(a.conditions[0].count, Some(2));
        assert_eq!(a.conditions[1].operator, ResourceOperator::Exists);
        let term = &a.conditions[0].resource_selector.selector_terms[0];
        assert_eq!(term.match_labels.get("app").map(String::as_str), Some("web"));
        assert!(a.validate().is_ok());
        assert_eq!(Assert::default().operator, AssertOperator::Or);
    }
}
