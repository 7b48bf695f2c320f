//! Synthesized response object for request/response entry points.

use crate::host::{HostObject, Reply};
use crate::recorder::MockRegistry;
use serde_json::Value;
use std::sync::Arc;
use understudy_proto::{RESPONSE_GROUP, Result, ResultDescriptor};

/// Methods installed on the response object unless others are requested.
pub const RESPONSE_METHODS: &[&str] = &["status", "set", "json", "send", "end"];

/// Builds the response host and registers every method under the response group.
///
/// Methods return null unless scripted otherwise and are excluded from
/// verification until an expectation is declared on them.
pub(crate) fn synthesize(registry: &MockRegistry, methods: &[&str]) -> Result<Arc<HostObject>> {
    let host = HostObject::new(RESPONSE_GROUP);
    for method in methods {
        host.define(*method, |_| Ok(Reply::Ready(Value::Null)));
    }
    let host = Arc::new(host);

    for method in methods {
        registry.register(RESPONSE_GROUP, method, &host)?;
        registry.program_fallback_result(
            RESPONSE_GROUP,
            method,
            ResultDescriptor::returns(Value::Null),
        )?;
        registry.ignore_always(RESPONSE_GROUP, method)?;
    }
    Ok(host)
}
