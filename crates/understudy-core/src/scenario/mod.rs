//! Scenario orchestration.
//!
//! A [`Scenario`] drives one test through a fixed pipeline:
//!
//! ```text
//! validate ─▶ execute ─▶ wait_for_completion ─▶ verify_mocks
//!                                                    │
//!          finish ◀── skip_test ◀── performance_sampling
//! ```
//!
//! Validation failures are returned before anything runs. Failures in the
//! later stages are funneled to a single path that tears down interceptions
//! and hands the error to the test callback, which fires at most once.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use serde_json::json;
//! use understudy_core::host::{Arg, HostObject, Reply};
//! use understudy_core::Scenario;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), understudy_core::Error> {
//! let users = Arc::new(HostObject::new("users").with_function("getMiddleName", |_| {
//!     Ok(Reply::Ready(json!("Robert")))
//! }));
//!
//! let callee = Arc::clone(&users);
//! let greeter = Arc::new(HostObject::new("greeter").with_function("greet", move |args| {
//!     let id = args.first().and_then(Arg::as_value).cloned().unwrap_or_default();
//!     let middle = callee.call("getMiddleName", vec![Arg::from(id)])?;
//!     match middle {
//!         Reply::Ready(name) => Ok(Reply::Ready(json!(format!("Hi {}", name.as_str().unwrap_or(""))))),
//!         Reply::Deferred(_) => Ok(Reply::Ready(json!(null))),
//!     }
//! }));
//!
//! let scenario = Scenario::new("greets by middle name")
//!     .entry_point(&greeter, "greet")
//!     .with_inputs([json!(7)])
//!     .on_finish(|outcome| {
//!         assert_eq!(outcome.unwrap(), json!("Hi Bill"));
//!         Ok(())
//!     });
//! scenario
//!     .mock("users", "getMiddleName", &users)?
//!     .does_return(json!("Bill"))?
//!     .expects([json!(7)])?;
//!
//! let report = scenario.run().await?;
//! assert!(report.succeeded);
//! # Ok(())
//! # }
//! ```

mod handle;
mod response;
mod stage;

pub use handle::MockHandle;
pub use response::RESPONSE_METHODS;
pub use stage::Stage;

use crate::comparator::{Comparator, JsonComparator};
use crate::completion::{CompletionMode, wait_for_signal};
use crate::config::HarnessConfig;
use crate::host::{Arg, HostObject, Reply};
use crate::recorder::MockRegistry;
use crate::report::{JsonlReportWriter, ReportWriter};
use crate::sampler::{PerformanceReport, PerformanceSampler};
use crate::verifier::verify_all;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use understudy_proto::{Error, InterceptionKey, RESPONSE_GROUP, Result};

/// Receives the scenario outcome. Returning `Err` means the caller's own
/// assertions failed after the callback ran.
pub type TestCallback = Box<dyn FnOnce(Result<Value>) -> anyhow::Result<()> + Send>;

/// How the entry point reports completion when no designation is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntryStyle {
    /// The entry point's own reply (ready or deferred) is the outcome.
    #[default]
    Direct,
    /// A trailing callback is injected; its `(error, result)` is the outcome.
    Callback,
}

#[derive(Clone)]
struct EntryPoint {
    host: Arc<HostObject>,
    function: String,
    style: EntryStyle,
}

/// What the host runner gets back from a finished scenario.
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub title: String,
    /// Whether the outcome handed to the callback was a success.
    pub succeeded: bool,
    /// Performance mode: the scenario served timing only.
    pub skipped: bool,
    pub failure: Option<String>,
    pub performance: Option<PerformanceReport>,
}

struct Driven {
    outcome: Result<Value>,
    performance: Option<PerformanceReport>,
    skipped: bool,
}

/// One test: an entry point, its collaborators' stand-ins and the checks to run.
pub struct Scenario {
    title: String,
    config: HarnessConfig,
    registry: MockRegistry,
    comparator: Box<dyn Comparator>,
    entry: Option<EntryPoint>,
    inputs: Option<Vec<Arg>>,
    callback: Option<TestCallback>,
    response: Option<Arc<HostObject>>,
    performance: bool,
    testable_invoked: bool,
    report_writer: Option<Box<dyn ReportWriter>>,
}

impl Scenario {
    /// Creates a scenario configured from the environment.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            config: HarnessConfig::from_env(),
            registry: MockRegistry::new(),
            comparator: Box::new(JsonComparator),
            entry: None,
            inputs: None,
            callback: None,
            response: None,
            performance: false,
            testable_invoked: false,
            report_writer: None,
        }
    }

    pub fn with_config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_comparator(mut self, comparator: impl Comparator + 'static) -> Self {
        self.comparator = Box::new(comparator);
        self
    }

    /// Sets the function under test; its reply is the outcome.
    pub fn entry_point(mut self, host: &Arc<HostObject>, function: impl Into<String>) -> Self {
        self.entry = Some(EntryPoint {
            host: Arc::clone(host),
            function: function.into(),
            style: EntryStyle::Direct,
        });
        self
    }

    /// Sets a callback-style function under test.
    pub fn callback_entry_point(
        mut self,
        host: &Arc<HostObject>,
        function: impl Into<String>,
    ) -> Self {
        self.entry = Some(EntryPoint {
            host: Arc::clone(host),
            function: function.into(),
            style: EntryStyle::Callback,
        });
        self
    }

    pub fn with_inputs<I, A>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Arg>,
    {
        self.inputs = Some(inputs.into_iter().map(Into::into).collect());
        self
    }

    pub fn on_finish<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Result<Value>) -> anyhow::Result<()> + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Flags the scenario for sampling when the harness runs in performance mode.
    pub fn measure_performance(mut self) -> Self {
        self.performance = true;
        self
    }

    pub fn with_report_writer(mut self, writer: impl ReportWriter + 'static) -> Self {
        self.report_writer = Some(Box::new(writer));
        self
    }

    /// Appends a synthesized response object to the entry point's inputs.
    pub fn with_response(self) -> Result<Self> {
        self.with_response_methods(RESPONSE_METHODS)
    }

    pub fn with_response_methods(mut self, methods: &[&str]) -> Result<Self> {
        if self.response.is_some() {
            return Err(Error::Build("response object already configured".into()));
        }
        self.response = Some(response::synthesize(&self.registry, methods)?);
        Ok(self)
    }

    /// Intercepts `name` on `host` and returns a handle to script it.
    pub fn mock(&self, group: &str, name: &str, host: &Arc<HostObject>) -> Result<MockHandle<'_>> {
        self.registry.register(group, name, host)?;
        Ok(MockHandle::new(
            &self.registry,
            InterceptionKey::new(group, name),
        ))
    }

    /// Handle to an interception registered earlier.
    pub fn mocked(&self, group: &str, name: &str) -> Result<MockHandle<'_>> {
        if !self.registry.is_registered(group, name) {
            return Err(Error::MissingRegistration {
                group: group.to_string(),
                name: name.to_string(),
            });
        }
        Ok(MockHandle::new(
            &self.registry,
            InterceptionKey::new(group, name),
        ))
    }

    /// Handle to one of the response object's methods.
    pub fn response_mock(&self, method: &str) -> Result<MockHandle<'_>> {
        self.mocked(RESPONSE_GROUP, method)
    }

    pub fn response(&self) -> Option<&Arc<HostObject>> {
        self.response.as_ref()
    }

    pub fn registry(&self) -> &MockRegistry {
        &self.registry
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns true once the entry point has been invoked.
    pub fn testable_invoked(&self) -> bool {
        self.testable_invoked
    }

    /// Runs the pipeline to completion.
    ///
    /// Returns `Err` for build errors (nothing ran) and when the callback
    /// reports failure after it already received the outcome.
    pub async fn run(mut self) -> Result<ScenarioReport> {
        self.enter(Stage::Validate);
        let mode = match self.validate() {
            Ok(mode) => mode,
            Err(error) => {
                warn!(scenario = %self.title, error = %error, "Scenario failed validation");
                self.registry.teardown();
                return Err(error);
            }
        };

        match self.drive(&mode).await {
            Ok(driven) => self.finish(driven),
            Err(error) => self.funnel(error),
        }
    }

    fn validate(&self) -> Result<CompletionMode> {
        let entry = self
            .entry
            .as_ref()
            .ok_or_else(|| Error::Build("no entry point configured".into()))?;
        if !entry.host.has_function(&entry.function) {
            return Err(Error::Build(format!(
                "entry point '{}' is not callable on host '{}'",
                entry.function,
                entry.host.name()
            )));
        }
        if self.inputs.is_none() {
            return Err(Error::Build("no input parameters configured".into()));
        }
        if self.callback.is_none() {
            return Err(Error::Build("no test callback configured".into()));
        }

        match self.registry.completion() {
            Some(designation) => {
                let key = &designation.key;
                if !self.registry.is_registered(&key.group, &key.name) {
                    return Err(Error::Build(format!(
                        "completion designated on unregistered {}",
                        key
                    )));
                }
                Ok(CompletionMode::Explicit(designation))
            }
            None => Ok(CompletionMode::Implicit),
        }
    }

    async fn drive(&mut self, mode: &CompletionMode) -> Result<Driven> {
        let entry = self
            .entry
            .clone()
            .ok_or_else(|| Error::Build("no entry point configured".into()))?;

        self.enter(Stage::Execute);
        self.testable_invoked = true;
        let mut outcome = self.execute_cycle(&entry, mode).await?;
        if let Some(fatal) = self.registry.take_fatal() {
            debug!(scenario = %self.title, error = %fatal, "Runtime error takes priority over entry point outcome");
            outcome = Err(fatal);
        }

        self.enter(Stage::VerifyMocks);
        match &outcome {
            Err(error) if error.is_pass_through() => {
                debug!(scenario = %self.title, error = %error, "Skipping verification for pass-through error");
            }
            _ => {
                if let Err(error) = verify_all(&self.registry, self.comparator.as_ref()) {
                    outcome = Err(error);
                }
            }
        }

        let performance = if self.performance && self.config.performance_mode {
            self.enter(Stage::ExecutePerformanceSampling);
            let report = self.sample(&entry, mode).await?;
            self.persist(&report);
            Some(report)
        } else {
            None
        };

        let skipped = self.config.performance_mode;
        if skipped {
            self.enter(Stage::SkipTest);
        }

        Ok(Driven {
            outcome,
            performance,
            skipped,
        })
    }

    /// Invokes the entry point and waits for completion.
    ///
    /// The outer `Result` is a stage failure (timeout); the inner one is the
    /// captured outcome.
    async fn execute_cycle(&self, entry: &EntryPoint, mode: &CompletionMode) -> Result<Result<Value>> {
        let mut args = self.inputs.clone().unwrap_or_default();
        if let Some(response) = &self.response {
            args.push(Arg::Object(Arc::clone(response)));
        }
        let receiver = match entry.style {
            EntryStyle::Direct => None,
            EntryStyle::Callback => {
                let (callback, receiver) = completion_callback();
                args.push(callback);
                Some(receiver)
            }
        };

        debug!(scenario = %self.title, function = %entry.function, args = args.len(), "Invoking entry point");
        let reply = entry.host.call(&entry.function, args);
        let waiting = self.await_outcome(entry, mode, reply, receiver);

        match self.config.completion_timeout() {
            Some(limit) => tokio::time::timeout(limit, waiting).await.map_err(|_| {
                Error::CompletionTimeout {
                    target: mode.target(),
                    waited_ms: limit.as_millis() as u64,
                }
            }),
            None => Ok(waiting.await),
        }
    }

    async fn await_outcome(
        &self,
        entry: &EntryPoint,
        mode: &CompletionMode,
        reply: Result<Reply>,
        receiver: Option<oneshot::Receiver<Result<Value>>>,
    ) -> Result<Value> {
        let reply = reply?;

        match mode {
            CompletionMode::Explicit(designation) => {
                self.enter(Stage::WaitForCompletionSignal);
                debug!(scenario = %self.title, designation = %designation, "Waiting for completion signal");
                let (ready, pending) = match reply {
                    Reply::Ready(value) => (value, None),
                    Reply::Deferred(pending) => (Value::Null, Some(pending)),
                };
                if let Some(outcome) =
                    wait_for_signal(&self.registry, self.config.poll_interval(), pending).await
                {
                    return outcome;
                }
                if let Some(mut receiver) = receiver
                    && let Ok(outcome) = receiver.try_recv()
                {
                    return outcome;
                }
                Ok(ready)
            }
            CompletionMode::Implicit => match receiver {
                None => reply.settle().await,
                Some(receiver) => settle_with_callback(&entry.function, reply, receiver).await,
            },
        }
    }

    async fn sample(&self, entry: &EntryPoint, mode: &CompletionMode) -> Result<PerformanceReport> {
        let sampler = PerformanceSampler::new(self.config.sampler.clone());
        let report = sampler
            .measure(&self.title, move || async move {
                self.registry.reset_call_counts();
                // Only stage failures abort sampling; outcomes were judged already.
                let _ = self.execute_cycle(entry, mode).await?;
                Ok(())
            })
            .await?;

        info!(
            scenario = %self.title,
            trials = report.total_sample_size,
            mean_ms = report.time.mean,
            "Performance sampling finished"
        );
        Ok(report)
    }

    fn persist(&mut self, report: &PerformanceReport) {
        if self.report_writer.is_none()
            && let Some(dir) = &self.config.report_dir
        {
            match JsonlReportWriter::new(dir) {
                Ok(writer) => self.report_writer = Some(Box::new(writer)),
                Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to open report writer"),
            }
        }

        if let Some(writer) = self.report_writer.as_mut()
            && let Err(e) = writer.write(report)
        {
            warn!(scenario = %self.title, error = %e, "Failed to persist performance report");
        }
    }

    fn finish(mut self, driven: Driven) -> Result<ScenarioReport> {
        self.enter(Stage::Finish);
        let report = ScenarioReport {
            title: self.title.clone(),
            succeeded: driven.outcome.is_ok(),
            skipped: driven.skipped,
            failure: driven.outcome.as_ref().err().map(ToString::to_string),
            performance: driven.performance,
        };

        let fired = self.fire_callback(driven.outcome);
        self.registry.teardown();
        fired?;
        Ok(report)
    }

    fn funnel(mut self, error: Error) -> Result<ScenarioReport> {
        warn!(scenario = %self.title, error = %error, "Scenario aborted");
        self.registry.teardown();

        let report = ScenarioReport {
            title: self.title.clone(),
            succeeded: false,
            skipped: false,
            failure: Some(error.to_string()),
            performance: None,
        };
        self.fire_callback(Err(error))?;
        Ok(report)
    }

    /// Hands the outcome to the callback, at most once. A panic inside the
    /// callback is reported like a returned error.
    fn fire_callback(&mut self, outcome: Result<Value>) -> Result<()> {
        match self.callback.take() {
            Some(callback) => match panic::catch_unwind(AssertUnwindSafe(|| callback(outcome))) {
                Ok(returned) => {
                    returned.map_err(|e| Error::UnhandledAssertion(format!("{e:#}")))
                }
                Err(payload) => Err(Error::UnhandledAssertion(panic_message(payload.as_ref()))),
            },
            None => Err(Error::UnhandledAssertion(match outcome {
                Err(error) => error.to_string(),
                Ok(_) => "scenario finished after its callback already ran".to_string(),
            })),
        }
    }

    fn enter(&self, stage: Stage) {
        debug!(scenario = %self.title, stage = stage.as_str(), "Entering stage");
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("title", &self.title)
            .field("entry", &self.entry.as_ref().map(|e| e.function.as_str()))
            .field("performance", &self.performance)
            .field("testable_invoked", &self.testable_invoked)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "test callback panicked".to_string()
    }
}

/// Injected trailing callback for callback-style entry points.
///
/// A non-null first argument is the entry point's error, the second its result.
fn completion_callback() -> (Arg, oneshot::Receiver<Result<Value>>) {
    let (sender, receiver) = oneshot::channel();
    let slot = Mutex::new(Some(sender));
    let callback = Arg::callback(move |values: Vec<Value>| {
        let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(sender) = sender {
            let outcome = match values.first() {
                Some(error) if !error.is_null() => Err(Error::Thrown(error.clone())),
                _ => Ok(values.get(1).cloned().unwrap_or(Value::Null)),
            };
            let _ = sender.send(outcome);
        }
    });
    (callback, receiver)
}

async fn settle_with_callback(
    function: &str,
    reply: Reply,
    mut receiver: oneshot::Receiver<Result<Value>>,
) -> Result<Value> {
    let dropped = || Error::CallbackDropped {
        function: function.to_string(),
    };

    match reply {
        Reply::Ready(_) => receiver.await.map_err(|_| dropped())?,
        Reply::Deferred(pending) => {
            tokio::select! {
                outcome = &mut receiver => outcome.map_err(|_| dropped())?,
                settled = pending => {
                    settled?;
                    receiver.await.map_err(|_| dropped())?
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_host() -> Arc<HostObject> {
        Arc::new(HostObject::new("echo").with_function("run", |args| {
            Ok(Reply::Ready(
                args.first().and_then(Arg::as_value).cloned().unwrap_or_default(),
            ))
        }))
    }

    #[tokio::test]
    async fn test_missing_entry_point_is_build_error() {
        let err = Scenario::new("no entry")
            .with_inputs(Vec::<Value>::new())
            .on_finish(|_| Ok(()))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Build(ref m) if m.contains("entry point")));
    }

    #[tokio::test]
    async fn test_missing_inputs_is_build_error() {
        let host = echo_host();
        let err = Scenario::new("no inputs")
            .entry_point(&host, "run")
            .on_finish(|_| Ok(()))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Build(ref m) if m.contains("input")));
    }

    #[tokio::test]
    async fn test_missing_callback_is_build_error() {
        let host = echo_host();
        let err = Scenario::new("no callback")
            .entry_point(&host, "run")
            .with_inputs([json!(1)])
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Build(ref m) if m.contains("callback")));
    }

    #[tokio::test]
    async fn test_uncallable_entry_point_is_build_error() {
        let host = echo_host();
        let err = Scenario::new("bad entry")
            .entry_point(&host, "walk")
            .with_inputs([json!(1)])
            .on_finish(|_| Ok(()))
            .run()
            .await
            .unwrap_err();
        assert!(err.is_pass_through());
    }

    #[tokio::test]
    async fn test_direct_entry_outcome_reaches_callback() {
        let host = echo_host();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);

        let report = Scenario::new("echo")
            .with_config(HarnessConfig::default())
            .entry_point(&host, "run")
            .with_inputs([json!("hello")])
            .on_finish(move |outcome| {
                *sink.lock().unwrap() = Some(outcome.unwrap());
                Ok(())
            })
            .run()
            .await
            .unwrap();

        assert!(report.succeeded);
        assert!(!report.skipped);
        assert_eq!(*seen.lock().unwrap(), Some(json!("hello")));
    }

    #[tokio::test]
    async fn test_callback_failure_escalates() {
        let host = echo_host();
        let err = Scenario::new("escalate")
            .with_config(HarnessConfig::default())
            .entry_point(&host, "run")
            .with_inputs([json!(1)])
            .on_finish(|_| anyhow::bail!("assertion failed: 1 == 2"))
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnhandledAssertion(ref m) if m.contains("1 == 2")));
    }

    #[test]
    fn test_completion_callback_maps_error_first_convention() {
        let (callback, mut receiver) = completion_callback();
        let Arg::Callback(callback) = callback else {
            panic!("expected callback arg");
        };
        callback(vec![json!("boom")]);
        callback(vec![json!(null), json!("ignored")]);
        assert!(matches!(receiver.try_recv().unwrap(), Err(Error::Thrown(v)) if v == json!("boom")));
    }

    #[test]
    fn test_response_configured_once() {
        let scenario = Scenario::new("twice").with_response().unwrap();
        let err = scenario.with_response().unwrap_err();
        assert!(matches!(err, Error::Build(_)));
    }
}
