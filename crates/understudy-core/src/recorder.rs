//! Call recorder and result dispatcher.
//!
//! The [`MockRegistry`] owns one [`FunctionMockState`] per interception key.
//! Registering a key installs a wrapper on the host object; every call that
//! reaches the wrapper is recorded, resolved against the scripted results and
//! delivered according to the result kind.
//!
//! Dispatch for a call with arguments `A`:
//! 1. Unless the completion signal already fired, record a deep copy of `A`.
//! 2. Resolve the always-result, else the programmed result at `call_count`.
//!    No result raises `MissingProgrammedResult`.
//! 3. Fire the completion signal if this is the designated call.
//! 4. Increment `call_count`.
//! 5. Deliver synchronously, as a deferred reply, or through the trailing
//!    callback argument.

use crate::completion::{CompletionDesignation, CompletionSignal};
use crate::host::{Arg, HostFn, HostObject, InstallError, Reply};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info, warn};
use understudy_proto::{
    Error, ExpectationRecord, InterceptionKey, RecordedArg, Result, ResultDescriptor, ResultKind,
};

/// Immutable snapshot of one invocation's arguments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    pub args: Vec<RecordedArg>,
}

impl CallRecord {
    pub fn capture(args: &[Arg]) -> Self {
        Self {
            args: args.iter().map(Arg::record).collect(),
        }
    }
}

/// Per-key state owned by the registry.
pub struct FunctionMockState {
    key: InterceptionKey,
    programmed_results: Vec<ResultDescriptor>,
    always_result: Option<ResultDescriptor>,
    fallback_result: Option<ResultDescriptor>,
    call_count: usize,
    actual_calls: Vec<CallRecord>,
    expected_calls: Vec<ExpectationRecord>,
    always_expectation: Option<ExpectationRecord>,
    ignored_always: bool,
    host: Arc<HostObject>,
    original: HostFn,
}

impl FunctionMockState {
    fn view(&self) -> MockView {
        MockView {
            key: self.key.clone(),
            actual_calls: self.actual_calls.clone(),
            expected_calls: self.expected_calls.clone(),
            always_expectation: self.always_expectation.clone(),
            ignored_always: self.ignored_always,
        }
    }

    /// Always-result, then the queued result for this call, then the fallback.
    fn next_result(&self) -> Option<ResultDescriptor> {
        self.always_result
            .clone()
            .or_else(|| self.programmed_results.get(self.call_count).cloned())
            .or_else(|| self.fallback_result.clone())
    }
}

/// What the verifier needs from one function, detached from the registry lock.
#[derive(Debug, Clone)]
pub struct MockView {
    pub key: InterceptionKey,
    pub actual_calls: Vec<CallRecord>,
    pub expected_calls: Vec<ExpectationRecord>,
    pub always_expectation: Option<ExpectationRecord>,
    pub ignored_always: bool,
}

#[derive(Default)]
struct RegistryState {
    functions: Vec<FunctionMockState>,
    signal: CompletionSignal,
    fatal: Option<Error>,
}

impl RegistryState {
    fn function(&self, key: &InterceptionKey) -> Option<&FunctionMockState> {
        self.functions.iter().find(|f| &f.key == key)
    }

    fn function_mut(&mut self, key: &InterceptionKey) -> Result<&mut FunctionMockState> {
        self.functions
            .iter_mut()
            .find(|f| &f.key == key)
            .ok_or_else(|| missing(key))
    }

    fn flag_fatal(&mut self, error: &Error) {
        if self.fatal.is_none() {
            self.fatal = Some(error.clone());
        }
    }
}

/// Scenario-scoped registry of interceptions.
///
/// Dropping the registry restores every intercepted host function.
pub struct MockRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl Default for MockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        let keys: Vec<String> = state.functions.iter().map(|f| f.key.to_string()).collect();
        f.debug_struct("MockRegistry")
            .field("functions", &keys)
            .field("completion", &state.signal.designation())
            .finish_non_exhaustive()
    }
}

impl MockRegistry {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
        }
    }

    /// Intercepts `name` on `host` under `(group, name)`.
    pub fn register(&self, group: &str, name: &str, host: &Arc<HostObject>) -> Result<()> {
        let key = InterceptionKey::new(group, name);
        let mut state = self.lock();

        if state.function(&key).is_some() {
            return Err(Error::DuplicateRegistration {
                group: key.group,
                name: key.name,
            });
        }

        let wrapper = wrapper_for(Arc::downgrade(&self.state), key.clone());
        let original = host.install(name, wrapper).map_err(|e| match e {
            InstallError::NotCallable => Error::FunctionNotFound {
                group: key.group.clone(),
                name: key.name.clone(),
                host: host.name().to_string(),
            },
            InstallError::AlreadyIntercepted => Error::DuplicateRegistration {
                group: key.group.clone(),
                name: key.name.clone(),
            },
        })?;

        debug!(key = %key, host = host.name(), "Registered interception");
        state.functions.push(FunctionMockState {
            key,
            programmed_results: Vec::new(),
            always_result: None,
            fallback_result: None,
            call_count: 0,
            actual_calls: Vec::new(),
            expected_calls: Vec::new(),
            always_expectation: None,
            ignored_always: false,
            host: Arc::clone(host),
            original,
        });
        Ok(())
    }

    pub fn is_registered(&self, group: &str, name: &str) -> bool {
        self.lock()
            .function(&InterceptionKey::new(group, name))
            .is_some()
    }

    /// Scripts a result. `always` replaces the always-result instead of queueing.
    pub fn program_result(
        &self,
        group: &str,
        name: &str,
        descriptor: ResultDescriptor,
        always: bool,
    ) -> Result<()> {
        let key = InterceptionKey::new(group, name);
        let mut state = self.lock();
        let function = state.function_mut(&key)?;
        if always {
            function.always_result = Some(descriptor);
        } else {
            function.programmed_results.push(descriptor);
        }
        Ok(())
    }

    /// Sets the result used once the queue has nothing for the current call.
    pub(crate) fn program_fallback_result(
        &self,
        group: &str,
        name: &str,
        descriptor: ResultDescriptor,
    ) -> Result<()> {
        let key = InterceptionKey::new(group, name);
        self.lock().function_mut(&key)?.fallback_result = Some(descriptor);
        Ok(())
    }

    /// Declares an expected call. `always` replaces the always-expectation
    /// instead of appending an ordinal one.
    ///
    /// Declaring an expectation clears a previous `ignore_always`.
    pub fn declare_expectation(
        &self,
        group: &str,
        name: &str,
        expectation: ExpectationRecord,
        always: bool,
    ) -> Result<()> {
        let key = InterceptionKey::new(group, name);
        let mut state = self.lock();
        let function = state.function_mut(&key)?;
        if always {
            function.always_expectation = Some(expectation);
        } else {
            function.expected_calls.push(expectation);
        }
        function.ignored_always = false;
        Ok(())
    }

    /// Excludes the key from verification entirely.
    pub fn ignore_always(&self, group: &str, name: &str) -> Result<()> {
        let key = InterceptionKey::new(group, name);
        self.lock().function_mut(&key)?.ignored_always = true;
        Ok(())
    }

    /// Makes the `iteration`-th call of the key the completion signal.
    pub fn designate_completion(&self, group: &str, name: &str, iteration: usize) -> Result<()> {
        let key = InterceptionKey::new(group, name);
        let mut state = self.lock();
        state.function_mut(&key)?;
        state
            .signal
            .designate(CompletionDesignation { key, iteration });
        Ok(())
    }

    pub fn completion(&self) -> Option<CompletionDesignation> {
        self.lock().signal.designation().cloned()
    }

    /// Returns true once the designated call happened.
    pub fn is_complete(&self) -> bool {
        self.lock().signal.fired()
    }

    pub fn call_count(&self, group: &str, name: &str) -> Option<usize> {
        self.lock()
            .function(&InterceptionKey::new(group, name))
            .map(|f| f.call_count)
    }

    pub fn actual_calls(&self, group: &str, name: &str) -> Option<Vec<CallRecord>> {
        self.lock()
            .function(&InterceptionKey::new(group, name))
            .map(|f| f.actual_calls.clone())
    }

    /// Takes the first runtime error raised during dispatch, if any.
    pub fn take_fatal(&self) -> Option<Error> {
        self.lock().fatal.take()
    }

    /// Snapshots every function for verification, in registration order.
    pub fn views(&self) -> Vec<MockView> {
        self.lock()
            .functions
            .iter()
            .map(FunctionMockState::view)
            .collect()
    }

    /// Clears call state between performance trials.
    ///
    /// Scripted results, expectations and registrations are kept.
    pub fn reset_call_counts(&self) {
        let mut state = self.lock();
        for function in &mut state.functions {
            function.call_count = 0;
            function.actual_calls.clear();
        }
        state.signal.reset();
        state.fatal = None;
    }

    /// Restores every original host function and forgets all interceptions.
    pub fn teardown(&self) {
        let functions = std::mem::take(&mut self.lock().functions);
        for function in functions {
            function
                .host
                .restore(&function.key.name, function.original.clone());
            debug!(key = %function.key, "Restored interception");
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        lock_state(&self.state)
    }
}

impl Drop for MockRegistry {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn lock_state(state: &Mutex<RegistryState>) -> MutexGuard<'_, RegistryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn missing(key: &InterceptionKey) -> Error {
    Error::MissingRegistration {
        group: key.group.clone(),
        name: key.name.clone(),
    }
}

fn wrapper_for(state: Weak<Mutex<RegistryState>>, key: InterceptionKey) -> HostFn {
    Arc::new(move |args: Vec<Arg>| {
        let state = state.upgrade().ok_or_else(|| missing(&key))?;
        dispatch(&state, &key, args)
    })
}

fn dispatch(state: &Mutex<RegistryState>, key: &InterceptionKey, args: Vec<Arg>) -> Result<Reply> {
    let descriptor = {
        let mut guard = lock_state(state);
        let RegistryState {
            functions,
            signal,
            fatal,
        } = &mut *guard;
        let function = functions
            .iter_mut()
            .find(|f| &f.key == key)
            .ok_or_else(|| missing(key))?;

        if !signal.fired() {
            function.actual_calls.push(CallRecord::capture(&args));
        }

        let call = function.call_count;
        let Some(descriptor) = function.next_result() else {
            let error = Error::MissingProgrammedResult {
                group: key.group.clone(),
                name: key.name.clone(),
                call,
            };
            warn!(key = %key, call, "No programmed result for call");
            if fatal.is_none() {
                *fatal = Some(error.clone());
            }
            return Err(error);
        };

        if signal.observe(key, call) {
            info!(key = %key, call, "Completion signal fired");
        }
        function.call_count += 1;
        debug!(key = %key, call, kind = descriptor.kind.as_str(), "Dispatching scripted result");
        descriptor
    };

    deliver(state, key, descriptor, args)
}

fn deliver(
    state: &Mutex<RegistryState>,
    key: &InterceptionKey,
    descriptor: ResultDescriptor,
    args: Vec<Arg>,
) -> Result<Reply> {
    match descriptor.kind {
        ResultKind::Synchronous => {
            if descriptor.is_error {
                Err(Error::Thrown(descriptor.value))
            } else {
                Ok(Reply::Ready(descriptor.value))
            }
        }
        ResultKind::Deferred => {
            let ResultDescriptor {
                value, is_error, ..
            } = descriptor;
            Ok(Reply::Deferred(Box::pin(async move {
                tokio::task::yield_now().await;
                if is_error {
                    Err(Error::Thrown(value))
                } else {
                    Ok(value)
                }
            })))
        }
        ResultKind::Callback => match args.last() {
            Some(Arg::Callback(callback)) => {
                callback(descriptor.callback_args());
                Ok(Reply::Ready(Value::Null))
            }
            _ => {
                let error = Error::MissingCallback {
                    group: key.group.clone(),
                    name: key.name.clone(),
                };
                warn!(key = %key, "Callback result scripted but last argument is not callable");
                lock_state(state).flag_fatal(&error);
                Err(error)
            }
        },
    }
}
