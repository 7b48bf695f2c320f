//! Recorded and expected argument values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One argument as captured at invocation time.
///
/// Plain values are deep copies. Callbacks and host objects cannot be copied,
/// so only their presence (and the object's name) is kept. Opaque arguments
/// never count towards parameter counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RecordedArg {
    Value(Value),
    Callback,
    Object(String),
}

impl RecordedArg {
    /// Returns the captured value, or `None` for opaque arguments.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            RecordedArg::Value(v) => Some(v),
            RecordedArg::Callback | RecordedArg::Object(_) => None,
        }
    }

    pub fn is_opaque(&self) -> bool {
        !matches!(self, RecordedArg::Value(_))
    }
}

/// One expected argument position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ExpectedArg {
    Value(Value),
    /// Any actual value at this position is accepted.
    Ignore,
}

impl ExpectedArg {
    pub fn is_ignore(&self) -> bool {
        matches!(self, ExpectedArg::Ignore)
    }
}

impl From<Value> for ExpectedArg {
    fn from(value: Value) -> Self {
        ExpectedArg::Value(value)
    }
}

/// Builds an expected argument list from plain values.
pub fn expect_args<I>(values: I) -> Vec<ExpectedArg>
where
    I: IntoIterator<Item = Value>,
{
    values.into_iter().map(ExpectedArg::Value).collect()
}

/// How a single expected call is compared against the actual one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Deep equality on every non-ignored position.
    #[default]
    Exact,
    /// Composite actual values only need to contain the expected keys/values.
    Subset,
    /// Only the fact that the call happened is checked.
    CalledOnly,
}

/// One declared expectation: argument positions plus the mode to compare them with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationRecord {
    pub args: Vec<ExpectedArg>,
    pub mode: MatchMode,
}

impl ExpectationRecord {
    pub fn new(args: Vec<ExpectedArg>, mode: MatchMode) -> Self {
        Self { args, mode }
    }

    /// An expectation that only asserts the call happened.
    pub fn called_only() -> Self {
        Self::new(Vec::new(), MatchMode::CalledOnly)
    }

    /// Number of positions carrying a concrete expected value.
    pub fn meaningful_count(&self) -> usize {
        self.args.iter().filter(|a| !a.is_ignore()).count()
    }
}
