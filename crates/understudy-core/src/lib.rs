//! # understudy-core
//!
//! Call interception and expectation verification for scenario tests.
//!
//! A test names an entry point on a [`HostObject`], intercepts the
//! collaborators it calls, scripts what they return and declares what they
//! must receive. The [`Scenario`] runs the entry point, waits for completion
//! and verifies every recorded call before handing the outcome to the test.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Scenario   │────▶│ HostObject  │────▶│  Recorder   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        │                                       │
//!        ▼                                       ▼
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Sampler   │────▶│   Report    │     │  Verifier   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - `host`: Function tables that interception patches
//! - `recorder`: Registry of intercepted functions, dispatch and call records
//! - `verifier`: Compares recorded calls with declared expectations
//! - `completion`: Implicit and explicit completion detection
//! - `scenario`: The staged pipeline and fluent mock scripting
//! - `sampler`: Timing samples and outlier-trimmed statistics
//! - `report`: Performance report sinks
//! - `config`: YAML and environment configuration
//! - `logging`: Tracing subscriber setup for test binaries

pub mod comparator;
pub mod completion;
pub mod config;
pub mod host;
pub mod logging;
pub mod recorder;
pub mod report;
pub mod sampler;
pub mod scenario;
pub mod verifier;

pub use comparator::{Comparator, JsonComparator};
pub use completion::{CompletionDesignation, CompletionMode};
pub use config::{ConfigError, HarnessConfig, PERF_ENV, REPORT_DIR_ENV, SamplerConfig};
pub use host::{Arg, Callback, DeferredReply, HostFn, HostObject, Reply};
pub use recorder::{CallRecord, MockRegistry, MockView};
pub use report::{
    JsonlReportWriter, MemoryReportWriter, REPORT_FILE, ReportError, ReportWriter,
};
pub use sampler::{
    MetricStats, OUTLIER_Z, PerformanceReport, PerformanceSampler, compute_statistics,
};
pub use scenario::{
    EntryStyle, MockHandle, RESPONSE_METHODS, Scenario, ScenarioReport, Stage, TestCallback,
};
pub use verifier::{verify_all, verify_function};

pub use understudy_proto::{
    Error, ErrorContext, ErrorTier, ExpectationRecord, ExpectedArg, InterceptionKey, MatchMode,
    RESPONSE_GROUP, RecordedArg, Result, ResultDescriptor, ResultKind, Value, expect_args,
};
