//! Expectation verification.
//!
//! Compares each function's recorded calls against its declared expectations.
//! Response-object interceptions are checked after every other group, and the
//! first mismatch ends verification.

use crate::comparator::{Comparator, is_composite};
use crate::recorder::{CallRecord, MockRegistry, MockView};
use tracing::debug;
use understudy_proto::{
    Error, ExpectationRecord, ExpectedArg, InterceptionKey, MatchMode, RecordedArg, Result,
};

/// Verifies every interception in the registry.
pub fn verify_all(registry: &MockRegistry, comparator: &dyn Comparator) -> Result<()> {
    let mut views = registry.views();
    // Stable: registration order is kept within each partition.
    views.sort_by_key(|view| view.key.is_response());

    for view in &views {
        verify_function(view, comparator)?;
    }
    Ok(())
}

/// Verifies a single function's calls.
pub fn verify_function(view: &MockView, comparator: &dyn Comparator) -> Result<()> {
    let key = &view.key;
    if view.ignored_always {
        debug!(key = %key, "Skipping verification for ignored function");
        return Ok(());
    }

    if view.always_expectation.is_none() && view.actual_calls.len() != view.expected_calls.len() {
        return Err(Error::MockCallCountMismatch {
            group: key.group.clone(),
            name: key.name.clone(),
            expected: view.expected_calls.len(),
            actual: view.actual_calls.len(),
        });
    }

    for (call, record) in view.actual_calls.iter().enumerate() {
        let Some(expectation) = view
            .always_expectation
            .as_ref()
            .or_else(|| view.expected_calls.get(call))
        else {
            continue;
        };
        verify_call(key, call, record, expectation, comparator)?;
    }

    debug!(key = %key, calls = view.actual_calls.len(), "Verified");
    Ok(())
}

fn verify_call(
    key: &InterceptionKey,
    call: usize,
    record: &CallRecord,
    expectation: &ExpectationRecord,
    comparator: &dyn Comparator,
) -> Result<()> {
    if expectation.mode == MatchMode::CalledOnly {
        return Ok(());
    }

    for (position, expected) in expectation.args.iter().enumerate() {
        let ExpectedArg::Value(expected) = expected else {
            continue;
        };
        let actual = record.args.get(position).and_then(RecordedArg::as_value);
        let matched = match actual {
            None => false,
            Some(actual) if expectation.mode == MatchMode::Subset && is_composite(actual) => {
                comparator.contains_subset(actual, expected)
            }
            Some(actual) => comparator.equals(actual, expected),
        };

        if !matched {
            return Err(Error::ArgumentMismatch {
                position,
                group: key.group.clone(),
                name: key.name.clone(),
                call,
                expected: Some(expected.clone()),
                actual: actual.cloned(),
            });
        }
    }

    let expected_count = expectation.meaningful_count();
    let actual_count = record
        .args
        .iter()
        .enumerate()
        .filter(|(position, arg)| {
            !arg.is_opaque() && !matches!(expectation.args.get(*position), Some(ExpectedArg::Ignore))
        })
        .count();

    if expected_count != actual_count {
        return Err(Error::WrongParamCount {
            call,
            group: key.group.clone(),
            name: key.name.clone(),
            expected: expected_count,
            actual: actual_count,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparator::JsonComparator;
    use serde_json::{Value, json};

    fn view(
        actual: Vec<Vec<RecordedArg>>,
        expected: Vec<ExpectationRecord>,
        always: Option<ExpectationRecord>,
    ) -> MockView {
        MockView {
            key: InterceptionKey::new("people", "getMiddleName"),
            actual_calls: actual.into_iter().map(|args| CallRecord { args }).collect(),
            expected_calls: expected,
            always_expectation: always,
            ignored_always: false,
        }
    }

    fn values(items: &[Value]) -> Vec<RecordedArg> {
        items.iter().cloned().map(RecordedArg::Value).collect()
    }

    fn exact(items: &[Value]) -> ExpectationRecord {
        ExpectationRecord::new(
            items.iter().cloned().map(ExpectedArg::Value).collect(),
            MatchMode::Exact,
        )
    }

    #[test]
    fn test_matching_calls_verify() {
        let v = view(
            vec![values(&[json!(1), json!("a")]), values(&[json!(2), json!("b")])],
            vec![exact(&[json!(1), json!("a")]), exact(&[json!(2), json!("b")])],
            None,
        );
        verify_function(&v, &JsonComparator).unwrap();
    }

    #[test]
    fn test_call_count_mismatch_reports_counts() {
        let v = view(
            vec![values(&[json!(1)]), values(&[json!(1)]), values(&[json!(1)])],
            vec![exact(&[json!(1)]), exact(&[json!(1)])],
            None,
        );
        let err = verify_function(&v, &JsonComparator).unwrap_err();
        assert!(matches!(
            err,
            Error::MockCallCountMismatch {
                expected: 2,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_argument_mismatch_carries_values() {
        let v = view(
            vec![values(&[json!("Ted")])],
            vec![exact(&[json!("Bill")])],
            None,
        );
        let err = verify_function(&v, &JsonComparator).unwrap_err();
        match err {
            Error::ArgumentMismatch {
                position,
                call,
                expected,
                actual,
                ..
            } => {
                assert_eq!(position, 0);
                assert_eq!(call, 0);
                assert_eq!(expected, Some(json!("Bill")));
                assert_eq!(actual, Some(json!("Ted")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_subset_mode() {
        let subset = |expected: Value| {
            ExpectationRecord::new(vec![ExpectedArg::Value(expected)], MatchMode::Subset)
        };

        let pass = view(
            vec![values(&[json!({"a": 1, "b": 2})])],
            vec![subset(json!({"a": 1}))],
            None,
        );
        verify_function(&pass, &JsonComparator).unwrap();

        let fail = view(
            vec![values(&[json!({"a": 1, "b": 2})])],
            vec![subset(json!({"a": 1, "c": 3}))],
            None,
        );
        assert!(matches!(
            verify_function(&fail, &JsonComparator),
            Err(Error::ArgumentMismatch { .. })
        ));
    }

    #[test]
    fn test_subset_mode_uses_equality_for_scalars() {
        let expectation =
            ExpectationRecord::new(vec![ExpectedArg::Value(json!("Bill"))], MatchMode::Subset);
        let v = view(vec![values(&[json!("Bill Jr")])], vec![expectation], None);
        assert!(verify_function(&v, &JsonComparator).is_err());
    }

    #[test]
    fn test_always_expectation_covers_every_call() {
        let v = view(
            vec![
                values(&[json!("same")]),
                values(&[json!("same")]),
                values(&[json!("same")]),
            ],
            vec![],
            Some(exact(&[json!("same")])),
        );
        verify_function(&v, &JsonComparator).unwrap();
    }

    #[test]
    fn test_always_expectation_wins_over_ordinal() {
        let v = view(
            vec![values(&[json!("same")]), values(&[json!("same")])],
            vec![exact(&[json!("other")])],
            Some(exact(&[json!("same")])),
        );
        verify_function(&v, &JsonComparator).unwrap();
    }

    #[test]
    fn test_ignore_marker_accepts_anything() {
        let expectation = ExpectationRecord::new(
            vec![ExpectedArg::Ignore, ExpectedArg::Value(json!(2))],
            MatchMode::Exact,
        );
        let v = view(
            vec![values(&[json!({"anything": [1, 2, 3]}), json!(2)])],
            vec![expectation],
            None,
        );
        verify_function(&v, &JsonComparator).unwrap();
    }

    #[test]
    fn test_called_only_skips_arguments() {
        let v = view(
            vec![values(&[json!(1), json!(2), json!(3)])],
            vec![ExpectationRecord::called_only()],
            None,
        );
        verify_function(&v, &JsonComparator).unwrap();
    }

    #[test]
    fn test_extra_actual_argument_is_wrong_param_count() {
        let v = view(
            vec![values(&[json!(1), json!(2)])],
            vec![exact(&[json!(1)])],
            None,
        );
        let err = verify_function(&v, &JsonComparator).unwrap_err();
        assert!(matches!(
            err,
            Error::WrongParamCount {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_missing_actual_argument_is_mismatch() {
        let v = view(
            vec![values(&[json!(1)])],
            vec![exact(&[json!(1), json!(2)])],
            None,
        );
        let err = verify_function(&v, &JsonComparator).unwrap_err();
        assert!(matches!(
            err,
            Error::ArgumentMismatch {
                position: 1,
                actual: None,
                ..
            }
        ));
    }

    #[test]
    fn test_trailing_callback_does_not_count() {
        let v = view(
            vec![vec![RecordedArg::Value(json!("Jay")), RecordedArg::Callback]],
            vec![exact(&[json!("Jay")])],
            None,
        );
        verify_function(&v, &JsonComparator).unwrap();
    }

    #[test]
    fn test_ignored_function_is_skipped() {
        let mut v = view(vec![values(&[json!(1)])], vec![], None);
        v.ignored_always = true;
        verify_function(&v, &JsonComparator).unwrap();
    }
}
