use converge_core::{render_scalar, FieldPath, Resource};

use crate::{ResourceSelector, SelectError, SelectorTerm};

/// Selector with its field paths parsed once, ready to test many resources.
#[derive(Debug, Clone)]
pub struct CompiledSelector<'a> {
    terms: Vec<CompiledTerm<'a>>,
}

#[derive(Debug, Clone)]
struct CompiledTerm<'a> {
    fields: Vec<(FieldPath, &'a str)>,
    term: &'a SelectorTerm,
}

impl<'a> CompiledSelector<'a> {
    pub fn compile(selector: &'a ResourceSelector) -> Result<Self, SelectError> {
        if selector.selector_terms.is_empty() {
            return Err(SelectError::EmptySelector);
        }
        let terms = selector.selector_terms.iter().map(CompiledTerm::compile).collect::<Result<_, _>>()?;
        Ok(Self { terms })
    }

    /// True when at least one term matches.
    pub fn matches(&self, resource: &Resource) -> Result<bool, SelectError> {
        for term in &self.terms {
            if term.matches(resource)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl<'a> CompiledTerm<'a> {
    fn compile(term: &'a SelectorTerm) -> Result<Self, SelectError> {
        let fields = term
            .match_fields
            .iter()
            .map(|(path, expected)| {
                FieldPath::parse(path)
                    .map(|p| (p, expected.as_str()))
                    .map_err(|source| SelectError::Path { path: path.clone(), source })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { fields, term })
    }

    fn matches(&self, resource: &Resource) -> Result<bool, SelectError> {
        for (key, expected) in &self.term.match_labels {
            if resource.label(key) != Some(expected.as_str()) {
                return Ok(false);
            }
        }
        for (key, expected) in &self.term.match_annotations {
            if resource.annotation(key) != Some(expected.as_str()) {
                return Ok(false);
            }
        }
        for (path, expected) in &self.fields {
            let found = resource
                .get_path(path)
                .map_err(|source| SelectError::Resource { id: resource.id().to_string(), source })?;
            match found.as_ref().and_then(render_scalar) {
                Some(actual) if actual == *expected => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }
}

/// Match a single term against a resource.
pub fn matches_term(resource: &Resource, term: &SelectorTerm) -> Result<bool, SelectError> {
    CompiledTerm::compile(term)?.matches(resource)
}

/// Match a resource against a selector (OR across its terms).
pub fn matches(resource: &Resource, selector: &ResourceSelector) -> Result<bool, SelectError> {
    CompiledSelector::compile(selector)?.matches(resource)
}
