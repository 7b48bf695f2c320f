//! Scripted result descriptors.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a scripted result is delivered to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// Returned (or raised) directly from the call.
    Synchronous,
    /// Returned as a future that settles with the value.
    Deferred,
    /// Delivered by invoking the caller's trailing callback with the value spread.
    Callback,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Synchronous => "synchronous",
            ResultKind::Deferred => "deferred",
            ResultKind::Callback => "callback",
        }
    }
}

/// One scripted result: value, delivery kind and whether it is an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultDescriptor {
    pub value: Value,
    pub kind: ResultKind,
    pub is_error: bool,
}

impl ResultDescriptor {
    pub fn new(value: Value, kind: ResultKind, is_error: bool) -> Self {
        Self {
            value,
            kind,
            is_error,
        }
    }

    pub fn returns(value: Value) -> Self {
        Self::new(value, ResultKind::Synchronous, false)
    }

    pub fn raises(value: Value) -> Self {
        Self::new(value, ResultKind::Synchronous, true)
    }

    pub fn resolves(value: Value) -> Self {
        Self::new(value, ResultKind::Deferred, false)
    }

    pub fn rejects(value: Value) -> Self {
        Self::new(value, ResultKind::Deferred, true)
    }

    /// Callback delivery; `args` are spread into the callback.
    pub fn calls_back(args: Vec<Value>) -> Self {
        Self::new(Value::Array(args), ResultKind::Callback, false)
    }

    /// Callback delivery of an error as the callback's first argument.
    pub fn calls_back_error(error: Value) -> Self {
        Self::new(Value::Array(vec![error]), ResultKind::Callback, true)
    }

    /// Values handed to a callback: arrays are spread, anything else is passed alone.
    pub fn callback_args(&self) -> Vec<Value> {
        match &self.value {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_callback_args_spread_arrays() {
        let descriptor = ResultDescriptor::calls_back(vec![json!(null), json!("Parrish")]);
        assert_eq!(descriptor.callback_args(), vec![json!(null), json!("Parrish")]);
    }

    #[test]
    fn test_callback_args_wrap_scalars() {
        let descriptor = ResultDescriptor::new(json!("solo"), ResultKind::Callback, false);
        assert_eq!(descriptor.callback_args(), vec![json!("solo")]);
    }

    #[test]
    fn test_error_constructors_set_flag() {
        assert!(ResultDescriptor::raises(json!("boom")).is_error);
        assert!(ResultDescriptor::rejects(json!("boom")).is_error);
        assert!(!ResultDescriptor::resolves(json!(1)).is_error);
        assert_eq!(ResultDescriptor::rejects(json!(1)).kind, ResultKind::Deferred);
    }
}
