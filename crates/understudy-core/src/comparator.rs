//! Value comparison primitives used by the verifier.

use serde_json::Value;

/// Deep-equality and subset comparison.
pub trait Comparator: Send + Sync {
    fn equals(&self, actual: &Value, expected: &Value) -> bool;

    /// True if `actual` contains at least everything in `expected`, recursively.
    fn contains_subset(&self, actual: &Value, expected: &Value) -> bool;
}

/// Structural comparison over JSON values.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonComparator;

impl Comparator for JsonComparator {
    fn equals(&self, actual: &Value, expected: &Value) -> bool {
        actual == expected
    }

    fn contains_subset(&self, actual: &Value, expected: &Value) -> bool {
        match (actual, expected) {
            (Value::Object(actual), Value::Object(expected)) => expected.iter().all(|(k, v)| {
                actual
                    .get(k)
                    .is_some_and(|a| self.contains_subset(a, v))
            }),
            (Value::Array(actual), Value::Array(expected)) => {
                expected.len() <= actual.len()
                    && expected
                        .iter()
                        .zip(actual)
                        .all(|(e, a)| self.contains_subset(a, e))
            }
            _ => actual == expected,
        }
    }
}

/// Arrays and objects are composite; everything else is a scalar.
pub fn is_composite(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}
