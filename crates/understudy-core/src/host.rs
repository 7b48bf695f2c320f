//! Host objects: named tables of callable functions.
//!
//! Code under test reaches its collaborators through a [`HostObject`] and calls
//! functions by name. Interception swaps a table entry for a recording wrapper
//! and hands the original back on teardown, so ownership of the patch is
//! explicit instead of living in ambient process state.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use understudy_core::host::{Arg, HostObject, Reply};
//! use serde_json::json;
//!
//! let users = Arc::new(HostObject::new("users").with_function("getMiddleName", |_args| {
//!     Ok(Reply::Ready(json!("Robert")))
//! }));
//!
//! let reply = users.call("getMiddleName", vec![Arg::from(json!(7))]).unwrap();
//! assert!(matches!(reply, Reply::Ready(v) if v == json!("Robert")));
//! ```

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use understudy_proto::{Error, RecordedArg, Result};

/// Callable argument: receives the values it is called with.
pub type Callback = Arc<dyn Fn(Vec<Value>) + Send + Sync>;

/// Future returned by functions that settle later.
pub type DeferredReply = BoxFuture<'static, Result<Value>>;

/// A function stored on a host object.
pub type HostFn = Arc<dyn Fn(Vec<Arg>) -> Result<Reply> + Send + Sync>;

/// One argument passed to a host function.
#[derive(Clone)]
pub enum Arg {
    Value(Value),
    Callback(Callback),
    Object(Arc<HostObject>),
}

impl Arg {
    /// Wraps a closure as a callback argument.
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        Arg::Callback(Arc::new(f))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Arg::Value(v) => Some(v),
            Arg::Callback(_) | Arg::Object(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<HostObject>> {
        match self {
            Arg::Object(host) => Some(host),
            Arg::Value(_) | Arg::Callback(_) => None,
        }
    }

    /// Snapshot used for call records. Values are deep-copied.
    pub fn record(&self) -> RecordedArg {
        match self {
            Arg::Value(v) => RecordedArg::Value(v.clone()),
            Arg::Callback(_) => RecordedArg::Callback,
            Arg::Object(host) => RecordedArg::Object(host.name().to_string()),
        }
    }
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl fmt::Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(v) => write!(f, "Value({})", v),
            Arg::Callback(_) => write!(f, "Callback"),
            Arg::Object(host) => write!(f, "Object({})", host.name()),
        }
    }
}

/// What a host function hands back.
pub enum Reply {
    Ready(Value),
    Deferred(DeferredReply),
}

impl Reply {
    /// Resolves the reply, awaiting deferred ones.
    pub async fn settle(self) -> Result<Value> {
        match self {
            Reply::Ready(v) => Ok(v),
            Reply::Deferred(fut) => fut.await,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Reply::Deferred(_))
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ready(v) => write!(f, "Ready({})", v),
            Reply::Deferred(_) => write!(f, "Deferred"),
        }
    }
}

/// Why an interception could not be installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InstallError {
    NotCallable,
    AlreadyIntercepted,
}

#[derive(Default)]
struct HostTable {
    functions: HashMap<String, HostFn>,
    intercepted: HashSet<String>,
}

/// A named collection of functions that collaborators expose to code under test.
pub struct HostObject {
    name: String,
    table: Mutex<HostTable>,
}

impl HostObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: Mutex::new(HostTable::default()),
        }
    }

    /// Adds a function while building the host.
    pub fn with_function<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Arg>) -> Result<Reply> + Send + Sync + 'static,
    {
        self.define(name, f);
        self
    }

    /// Defines (or replaces) a function.
    pub fn define<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(Vec<Arg>) -> Result<Reply> + Send + Sync + 'static,
    {
        self.lock().functions.insert(name.into(), Arc::new(f));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.lock().functions.contains_key(name)
    }

    /// Returns true while `name` is replaced by a recording wrapper.
    pub fn is_intercepted(&self, name: &str) -> bool {
        self.lock().intercepted.contains(name)
    }

    /// Calls `name` with `args`.
    ///
    /// The table lock is released before the function runs, so functions may
    /// call back into the same host.
    pub fn call(&self, name: &str, args: Vec<Arg>) -> Result<Reply> {
        let function = self.lock().functions.get(name).cloned();
        match function {
            Some(f) => f(args),
            None => Err(Error::FunctionNotFound {
                group: self.name.clone(),
                name: name.to_string(),
                host: self.name.clone(),
            }),
        }
    }

    /// Calls `name` and settles the reply.
    pub async fn call_async(&self, name: &str, args: Vec<Arg>) -> Result<Value> {
        self.call(name, args)?.settle().await
    }

    /// Replaces `name` with `wrapper`, returning the original function.
    pub(crate) fn install(
        &self,
        name: &str,
        wrapper: HostFn,
    ) -> std::result::Result<HostFn, InstallError> {
        let mut table = self.lock();
        if table.intercepted.contains(name) {
            return Err(InstallError::AlreadyIntercepted);
        }
        if !table.functions.contains_key(name) {
            return Err(InstallError::NotCallable);
        }
        let original = table
            .functions
            .insert(name.to_string(), wrapper)
            .ok_or(InstallError::NotCallable)?;
        table.intercepted.insert(name.to_string());
        Ok(original)
    }

    /// Puts the original function back.
    pub(crate) fn restore(&self, name: &str, original: HostFn) {
        let mut table = self.lock();
        table.functions.insert(name.to_string(), original);
        table.intercepted.remove(name);
    }

    fn lock(&self) -> MutexGuard<'_, HostTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.lock();
        let mut names: Vec<_> = table.functions.keys().collect();
        names.sort();
        f.debug_struct("HostObject")
            .field("name", &self.name)
            .field("functions", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn greeter() -> HostObject {
        HostObject::new("greeter").with_function("hello", |args| {
            let who = args
                .first()
                .and_then(Arg::as_value)
                .cloned()
                .unwrap_or(Value::Null);
            Ok(Reply::Ready(json!({ "hello": who })))
        })
    }

    #[test]
    fn test_call_dispatches_by_name() {
        let host = greeter();
        let reply = host.call("hello", vec![json!("ada").into()]).unwrap();
        assert!(matches!(reply, Reply::Ready(v) if v == json!({"hello": "ada"})));
    }

    #[test]
    fn test_call_unknown_function() {
        let host = greeter();
        let err = host.call("goodbye", vec![]).unwrap_err();
        assert!(matches!(err, Error::FunctionNotFound { ref name, .. } if name == "goodbye"));
    }

    #[test]
    fn test_install_and_restore() {
        let host = greeter();
        let wrapper: HostFn = Arc::new(|_| Ok(Reply::Ready(json!("wrapped"))));

        let original = host.install("hello", wrapper.clone()).unwrap();
        assert!(host.is_intercepted("hello"));
        assert_eq!(
            host.install("hello", wrapper.clone()).err().unwrap(),
            InstallError::AlreadyIntercepted
        );
        assert!(matches!(
            host.call("hello", vec![]).unwrap(),
            Reply::Ready(v) if v == json!("wrapped")
        ));

        host.restore("hello", original);
        assert!(!host.is_intercepted("hello"));
        assert!(matches!(
            host.call("hello", vec![json!("bob").into()]).unwrap(),
            Reply::Ready(v) if v == json!({"hello": "bob"})
        ));
    }

    #[test]
    fn test_install_missing_function() {
        let host = greeter();
        let wrapper: HostFn = Arc::new(|_| Ok(Reply::Ready(Value::Null)));
        assert_eq!(
            host.install("missing", wrapper).err().unwrap(),
            InstallError::NotCallable
        );
        assert!(!host.is_intercepted("missing"));
        assert!(!host.has_function("missing"));
    }

    #[test]
    fn test_record_deep_copies_values() {
        let arg = Arg::from(json!({"name": "Bill"}));
        let recorded = arg.record();
        drop(arg);
        assert_eq!(recorded, RecordedArg::Value(json!({"name": "Bill"})));
        assert_eq!(Arg::callback(|_| {}).record(), RecordedArg::Callback);
    }

    #[tokio::test]
    async fn test_call_async_settles_deferred() {
        let host = HostObject::new("db").with_function("load", |_| {
            Ok(Reply::Deferred(Box::pin(async { Ok(json!(42)) })))
        });
        assert_eq!(host.call_async("load", vec![]).await.unwrap(), json!(42));
    }
}
