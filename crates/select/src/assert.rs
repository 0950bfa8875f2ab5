use metrics::counter;
use smallvec::SmallVec;
use tracing::debug;

use converge_core::Resource;

use crate::{Assert, AssertOperator, CompiledSelector, Condition, ResourceOperator, SelectError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionOutcome {
    pub success: bool,
    /// Indices into the candidate slice, in input order.
    pub matched: SmallVec<[usize; 8]>,
    /// Resources inspected before a decision (smaller than the input on an
    /// `Exists` short-circuit).
    pub evaluated: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertOutcome {
    pub success: bool,
    /// Conditions evaluated before the operator short-circuited.
    pub conditions_evaluated: usize,
}

/// Evaluate one condition over `resources`.
pub fn evaluate_condition(condition: &Condition, resources: &[Resource]) -> Result<ConditionOutcome, SelectError> {
    condition.validate()?;
    if resources.is_empty() {
        return Err(SelectError::NoCandidates(1));
    }
    let selector = CompiledSelector::compile(&condition.resource_selector)?;
    let op = condition.operator;
    counter!("converge_condition_evals_total", 1u64, "operator" => op.as_str());

    let mut matched: SmallVec<[usize; 8]> = SmallVec::new();
    for (i, r) in resources.iter().enumerate() {
        if !selector.matches(r)? {
            continue;
        }
        matched.push(i);
        if op == ResourceOperator::Exists {
            debug!(operator = %op, index = i, "condition satisfied on first match");
            return Ok(ConditionOutcome { success: true, matched, evaluated: i + 1 });
        }
    }

    let n = matched.len() as i64;
    // validate() guarantees a count for the counting operators
    let count = condition.count.unwrap_or_default();
    let success = match op {
        ResourceOperator::Exists => n > 0,
        ResourceOperator::NotExist => n == 0,
        ResourceOperator::EqualsCount => n == count,
        ResourceOperator::Gte => n >= count,
        ResourceOperator::Lte => n <= count,
    };
    debug!(operator = %op, matched = n, count = ?condition.count, success, "condition evaluated");
    Ok(ConditionOutcome { success, matched, evaluated: resources.len() })
}

/// Evaluate an assert: OR succeeds on the first passing condition, AND fails
/// on the first failing one. No conditions means success.
pub fn evaluate_assert(assert: &Assert, resources: &[Resource]) -> Result<AssertOutcome, SelectError> {
    if assert.conditions.is_empty() {
        return Ok(AssertOutcome { success: true, conditions_evaluated: 0 });
    }
    assert.validate()?;
    if resources.is_empty() {
        return Err(SelectError::NoCandidates(assert.conditions.len()));
    }
    let decisive = match assert.operator {
        AssertOperator::Or => true,
        AssertOperator::And => false,
    };
    for (i, c) in assert.conditions.iter().enumerate() {
        if evaluate_condition(c, resources)?.success == decisive {
            return Ok(AssertOutcome { success: decisive, conditions_evaluated: i + 1 });
        }
    }
    Ok(AssertOutcome { success: !decisive, conditions_evaluated: assert.conditions.len() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ResourceSelector, SelectorTerm};
    use serde_json::json;

    fn res(kind: &str, name: &str) -> Resource {
        Resource::from_value(json!({"apiVersion": "v1", "kind": kind, "metadata": {"name": name}})).unwrap()
    }

    fn world() -> Vec<Resource> {
        vec![res("Pod", "p1"), res("Service", "s1"), res("Pod", "p2"), res("Pod", "p3")]
    }

    fn cond(kind: &str, op: ResourceOperator, count: Option<i64>) -> Condition {
        Condition::new(ResourceSelector::kind(kind), op, count).unwrap()
    }

    #[test]
    fn exists_short_circuits_on_first_match() {
        let out = evaluate_condition(&cond("Service", ResourceOperator::Exists, None), &world()).unwrap();
        assert!(out.success);
        assert_eq!(out.evaluated, 2);
        assert_eq!(out.matched.as_slice(), &[1]);
    }

    #[test]
    fn counting_operators() {
        let w = world();
        let ok = |c: Condition| evaluate_condition(&c, &w).unwrap().success;
        assert!(ok(cond("Pod", ResourceOperator::EqualsCount, Some(3))));
        assert!(!ok(cond("Pod", ResourceOperator::EqualsCount, Some(2))));
        assert!(ok(cond("Pod", ResourceOperator::Gte, Some(3))));
        assert!(!ok(cond("Pod", ResourceOperator::Gte, Some(4))));
        assert!(ok(cond("Pod", ResourceOperator::Lte, Some(3))));
        assert!(!ok(cond("Pod", ResourceOperator::Lte, Some(2))));
        assert!(ok(cond("Deployment", ResourceOperator::NotExist, None)));
        assert!(!ok(cond("Pod", ResourceOperator::NotExist, None)));
        assert!(!ok(cond("Deployment", ResourceOperator::Exists, None)));
    }

    #[test]
    fn counting_collects_all_matches_in_order() {
        let out = evaluate_condition(&cond("Pod", ResourceOperator::Gte, Some(1)), &world()).unwrap();
        assert_eq!(out.matched.as_slice(), &[0, 2, 3]);
        assert_eq!(out.evaluated, 4);
    }

    #[test]
    fn empty_candidates_is_an_error() {
        let err = evaluate_condition(&cond("Pod", ResourceOperator::Exists, None), &[]).unwrap_err();
        assert!(matches!(err, SelectError::NoCandidates(1)));
        let a = Assert::any([cond("Pod", ResourceOperator::Exists, None)]);
        assert!(matches!(evaluate_assert(&a, &[]), Err(SelectError::NoCandidates(1))));
    }

    #[test]
    fn invalid_condition_reported_before_evaluation() {
        let c = Condition { resource_selector: ResourceSelector::kind("Pod"), operator: ResourceOperator::Lte, count: None };
        assert!(matches!(evaluate_condition(&c, &world()), Err(SelectError::MissingCount(ResourceOperator::Lte))));
    }

    #[test]
    fn or_and_composition() {
        let w = world();
        let pass = cond("Pod", ResourceOperator::Exists, None);
        let fail = cond("Deployment", ResourceOperator::Exists, None);

        let or = evaluate_assert(&Assert::any([fail.clone(), pass.clone()]), &w).unwrap();
        assert!(or.success);
        assert_eq!(or.conditions_evaluated, 2);

        let or_first = evaluate_assert(&Assert::any([pass.clone(), fail.clone()]), &w).unwrap();
        assert_eq!(or_first.conditions_evaluated, 1);

        let and = evaluate_assert(&Assert::all([pass.clone(), fail.clone()]), &w).unwrap();
        assert!(!and.success);
        assert_eq!(and.conditions_evaluated, 2);

        let and_ok = evaluate_assert(&Assert::all([pass.clone(), pass]), &w).unwrap();
        assert!(and_ok.success);

        assert!(!evaluate_assert(&Assert::any([fail]), &w).unwrap().success);
    }

    #[test]
    fn empty_assert_succeeds_even_without_resources() {
        assert!(evaluate_assert(&Assert::default(), &[]).unwrap().success);
        let empty_and = Assert { operator: AssertOperator::And, conditions: vec![] };
        assert!(evaluate_assert(&empty_and, &world()).unwrap().success);
    }

    #[test]
    fn multi_term_condition_counts_union() {
        let sel = ResourceSelector::new([
            SelectorTerm::default().field("metadata.name", "p1"),
            SelectorTerm::default().field("kind", "Service"),
        ]);
        let c = Condition::new(sel, ResourceOperator::EqualsCount, Some(2)).unwrap();
        assert!(evaluate_condition(&c, &world()).unwrap().success);
    }
}
