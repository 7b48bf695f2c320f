//! # understudy-proto
//!
//! Shared types and error definitions for the Understudy scenario harness.
//!
//! This crate provides the vocabulary used by the engine in `understudy-core`:
//! - The error enum and its tiers
//! - Interception keys
//! - Recorded and expected argument values
//! - Scripted result descriptors

mod args;
mod error;
mod key;
mod result;

pub use args::{ExpectationRecord, ExpectedArg, MatchMode, RecordedArg, expect_args};
pub use error::{Error, ErrorContext, ErrorTier, Result};
pub use key::{InterceptionKey, RESPONSE_GROUP};
pub use result::{ResultDescriptor, ResultKind};

/// Dynamic value type used for arguments and scripted results.
pub use serde_json::Value;
