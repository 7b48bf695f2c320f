//! Error types for Understudy.
//!
//! Errors fall into tiers:
//! - **Build**: malformed scenario configuration, raised at declaration time.
//! - **Runtime**: the scenario script and the code under test diverged.
//! - **Comparison**: an argument did not match its expectation.
//! - **Escalation**: a failure surfaced after the user callback already ran.
//!
//! `Thrown` carries an error raised by a host function or the entry point
//! itself (including scripted error results); it is the only `Raised` error.

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Errors produced by the harness.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Scenario build error: {0}")]
    Build(String),

    #[error("Function not found: '{name}' is not callable on host '{host}' (group '{group}')")]
    FunctionNotFound {
        group: String,
        name: String,
        host: String,
    },

    #[error("Duplicate registration: {group}.{name} is already intercepted")]
    DuplicateRegistration { group: String, name: String },

    #[error("Missing registration: {group}.{name} has not been registered")]
    MissingRegistration { group: String, name: String },

    #[error("Missing programmed result for {group}.{name} at call {call}")]
    MissingProgrammedResult {
        group: String,
        name: String,
        call: usize,
    },

    #[error("Missing callback: {group}.{name} delivers its result by callback but the last argument is not callable")]
    MissingCallback { group: String, name: String },

    #[error("Call count mismatch for {group}.{name}: expected {expected} call(s), got {actual}")]
    MockCallCountMismatch {
        group: String,
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Wrong parameter count on call {call} of {group}.{name}: expected {expected}, got {actual}")]
    WrongParamCount {
        call: usize,
        group: String,
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error(
        "Argument {position} of call {call} to {group}.{name} did not match: expected {}, got {}",
        describe(.expected),
        describe(.actual)
    )]
    ArgumentMismatch {
        position: usize,
        group: String,
        name: String,
        call: usize,
        expected: Option<Value>,
        actual: Option<Value>,
    },

    #[error("Entry point {function} dropped its completion callback without calling it")]
    CallbackDropped { function: String },

    #[error("Completion signal ({target}) did not fire within {waited_ms}ms")]
    CompletionTimeout { target: String, waited_ms: u64 },

    #[error("Raised: {0}")]
    Thrown(Value),

    #[error(
        "The test callback already ran and then failed: {0}. Handle your own assertions inside the callback instead of letting them escape"
    )]
    UnhandledAssertion(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorTier {
    Build,
    Runtime,
    Comparison,
    Escalation,
    Raised,
}

/// Plain-data view of an error for external message formatters.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorContext {
    pub code: &'static str,
    pub tier: ErrorTier,
    pub message: String,
    pub fields: Value,
}

impl Error {
    pub fn tier(&self) -> ErrorTier {
        match self {
            Error::Build(_)
            | Error::FunctionNotFound { .. }
            | Error::DuplicateRegistration { .. }
            | Error::MissingRegistration { .. } => ErrorTier::Build,
            Error::MissingProgrammedResult { .. }
            | Error::MissingCallback { .. }
            | Error::MockCallCountMismatch { .. }
            | Error::WrongParamCount { .. }
            | Error::CallbackDropped { .. }
            | Error::CompletionTimeout { .. } => ErrorTier::Runtime,
            Error::ArgumentMismatch { .. } => ErrorTier::Comparison,
            Error::UnhandledAssertion(_) => ErrorTier::Escalation,
            Error::Thrown(_) => ErrorTier::Raised,
        }
    }

    /// Build errors bypass mock verification when they are the captured outcome.
    pub fn is_pass_through(&self) -> bool {
        self.tier() == ErrorTier::Build
    }

    /// Stable identifier for message catalogs.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Build(_) => "build_error",
            Error::FunctionNotFound { .. } => "function_not_found",
            Error::DuplicateRegistration { .. } => "duplicate_registration",
            Error::MissingRegistration { .. } => "missing_registration",
            Error::MissingProgrammedResult { .. } => "missing_programmed_result",
            Error::MissingCallback { .. } => "missing_callback",
            Error::MockCallCountMismatch { .. } => "mock_call_count_mismatch",
            Error::WrongParamCount { .. } => "wrong_param_count",
            Error::ArgumentMismatch { .. } => "argument_mismatch",
            Error::CallbackDropped { .. } => "callback_dropped",
            Error::CompletionTimeout { .. } => "completion_timeout",
            Error::Thrown(_) => "thrown",
            Error::UnhandledAssertion(_) => "unhandled_assertion",
        }
    }

    pub fn context(&self) -> ErrorContext {
        let fields = match self {
            Error::Build(reason) => json!({ "reason": reason }),
            Error::FunctionNotFound { group, name, host } => {
                json!({ "group": group, "name": name, "host": host })
            }
            Error::DuplicateRegistration { group, name }
            | Error::MissingRegistration { group, name }
            | Error::MissingCallback { group, name } => json!({ "group": group, "name": name }),
            Error::MissingProgrammedResult { group, name, call } => {
                json!({ "group": group, "name": name, "call": call })
            }
            Error::MockCallCountMismatch {
                group,
                name,
                expected,
                actual,
            } => json!({ "group": group, "name": name, "expected": expected, "actual": actual }),
            Error::WrongParamCount {
                call,
                group,
                name,
                expected,
                actual,
            } => json!({
                "call": call,
                "group": group,
                "name": name,
                "expected": expected,
                "actual": actual,
            }),
            Error::ArgumentMismatch {
                position,
                group,
                name,
                call,
                expected,
                actual,
            } => json!({
                "position": position,
                "group": group,
                "name": name,
                "call": call,
                "expected": expected,
                "actual": actual,
            }),
            Error::CallbackDropped { function } => json!({ "function": function }),
            Error::CompletionTimeout { target, waited_ms } => {
                json!({ "target": target, "waited_ms": waited_ms })
            }
            Error::Thrown(value) => json!({ "value": value }),
            Error::UnhandledAssertion(message) => json!({ "message": message }),
        };

        ErrorContext {
            code: self.code(),
            tier: self.tier(),
            message: self.to_string(),
            fields,
        }
    }
}

fn describe(value: &Option<Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "undefined".to_string(),
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
