//! Fluent scripting of a single interception.

use crate::recorder::MockRegistry;
use serde_json::Value;
use understudy_proto::{
    ExpectationRecord, ExpectedArg, InterceptionKey, MatchMode, Result, ResultDescriptor,
};

/// Scripts results and expectations for one registered key.
///
/// ```ignore
/// scenario
///     .mock("users", "getMiddleName", &users)?
///     .does_return(json!("Bill"))?
///     .expects([json!(7)])?;
/// ```
#[derive(Debug)]
pub struct MockHandle<'a> {
    registry: &'a MockRegistry,
    key: InterceptionKey,
}

impl<'a> MockHandle<'a> {
    pub(crate) fn new(registry: &'a MockRegistry, key: InterceptionKey) -> Self {
        Self { registry, key }
    }

    pub fn key(&self) -> &InterceptionKey {
        &self.key
    }

    /// Queues a result for the next unscripted call.
    pub fn returns(self, descriptor: ResultDescriptor) -> Result<Self> {
        self.registry
            .program_result(&self.key.group, &self.key.name, descriptor, false)?;
        Ok(self)
    }

    /// Sets the result used for every call.
    pub fn always_returns(self, descriptor: ResultDescriptor) -> Result<Self> {
        self.registry
            .program_result(&self.key.group, &self.key.name, descriptor, true)?;
        Ok(self)
    }

    pub fn does_return(self, value: Value) -> Result<Self> {
        self.returns(ResultDescriptor::returns(value))
    }

    pub fn does_return_deferred(self, value: Value) -> Result<Self> {
        self.returns(ResultDescriptor::resolves(value))
    }

    pub fn does_return_with_callback(self, args: Vec<Value>) -> Result<Self> {
        self.returns(ResultDescriptor::calls_back(args))
    }

    pub fn does_error(self, error: Value) -> Result<Self> {
        self.returns(ResultDescriptor::raises(error))
    }

    pub fn does_error_deferred(self, error: Value) -> Result<Self> {
        self.returns(ResultDescriptor::rejects(error))
    }

    pub fn does_error_with_callback(self, error: Value) -> Result<Self> {
        self.returns(ResultDescriptor::calls_back_error(error))
    }

    pub fn does_always_return(self, value: Value) -> Result<Self> {
        self.always_returns(ResultDescriptor::returns(value))
    }

    pub fn does_always_return_deferred(self, value: Value) -> Result<Self> {
        self.always_returns(ResultDescriptor::resolves(value))
    }

    pub fn does_always_return_with_callback(self, args: Vec<Value>) -> Result<Self> {
        self.always_returns(ResultDescriptor::calls_back(args))
    }

    pub fn does_always_error(self, error: Value) -> Result<Self> {
        self.always_returns(ResultDescriptor::raises(error))
    }

    pub fn does_always_error_deferred(self, error: Value) -> Result<Self> {
        self.always_returns(ResultDescriptor::rejects(error))
    }

    pub fn does_always_error_with_callback(self, error: Value) -> Result<Self> {
        self.always_returns(ResultDescriptor::calls_back_error(error))
    }

    /// Expects the next call with exactly these arguments.
    pub fn expects<I, A>(self, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<ExpectedArg>,
    {
        self.declare(collect(args), MatchMode::Exact, false)
    }

    /// Expects the next call with composite arguments containing these.
    pub fn expects_subset<I, A>(self, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<ExpectedArg>,
    {
        self.declare(collect(args), MatchMode::Subset, false)
    }

    /// Expects the next call without checking its arguments.
    pub fn expects_called(self) -> Result<Self> {
        self.declare(Vec::new(), MatchMode::CalledOnly, false)
    }

    /// Every call must match these arguments; call counts are not checked.
    pub fn expects_always<I, A>(self, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<ExpectedArg>,
    {
        self.declare(collect(args), MatchMode::Exact, true)
    }

    pub fn expects_always_subset<I, A>(self, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = A>,
        A: Into<ExpectedArg>,
    {
        self.declare(collect(args), MatchMode::Subset, true)
    }

    /// Excludes this function from verification.
    pub fn ignores_always(self) -> Result<Self> {
        self.registry
            .ignore_always(&self.key.group, &self.key.name)?;
        Ok(self)
    }

    /// The first call of this function completes the scenario.
    pub fn completes(self) -> Result<Self> {
        self.completes_at(0)
    }

    /// The `iteration`-th call (0-based) completes the scenario.
    pub fn completes_at(self, iteration: usize) -> Result<Self> {
        self.registry
            .designate_completion(&self.key.group, &self.key.name, iteration)?;
        Ok(self)
    }

    fn declare(self, args: Vec<ExpectedArg>, mode: MatchMode, always: bool) -> Result<Self> {
        self.registry.declare_expectation(
            &self.key.group,
            &self.key.name,
            ExpectationRecord::new(args, mode),
            always,
        )?;
        Ok(self)
    }
}

fn collect<I, A>(args: I) -> Vec<ExpectedArg>
where
    I: IntoIterator<Item = A>,
    A: Into<ExpectedArg>,
{
    args.into_iter().map(Into::into).collect()
}
