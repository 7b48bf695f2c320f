//! Completion signal detection.
//!
//! A scenario's observable work is finished either when the entry point
//! settles (implicit) or when a designated interception receives its Nth call
//! (explicit). Only one designation is active at a time; designating again
//! replaces the previous one.

use crate::host::DeferredReply;
use crate::recorder::MockRegistry;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::debug;
use understudy_proto::{InterceptionKey, Result};

/// Explicit completion point: the `iteration`-th call (0-based) of `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionDesignation {
    pub key: InterceptionKey,
    pub iteration: usize,
}

impl fmt::Display for CompletionDesignation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} call {}", self.key, self.iteration)
    }
}

/// How a scenario decides it is done.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionMode {
    Implicit,
    Explicit(CompletionDesignation),
}

impl CompletionMode {
    pub fn is_explicit(&self) -> bool {
        matches!(self, CompletionMode::Explicit(_))
    }

    /// Description used in timeout errors.
    pub fn target(&self) -> String {
        match self {
            CompletionMode::Implicit => "entry point settlement".to_string(),
            CompletionMode::Explicit(designation) => designation.to_string(),
        }
    }
}

/// Scenario-wide signal state, owned by the registry.
#[derive(Debug, Default)]
pub(crate) struct CompletionSignal {
    designation: Option<CompletionDesignation>,
    fired: bool,
}

impl CompletionSignal {
    /// Replaces any previous designation.
    pub(crate) fn designate(&mut self, designation: CompletionDesignation) {
        if let Some(previous) = self.designation.replace(designation) {
            debug!(previous = %previous, "Replacing completion designation");
        }
        self.fired = false;
    }

    pub(crate) fn designation(&self) -> Option<&CompletionDesignation> {
        self.designation.as_ref()
    }

    pub(crate) fn fired(&self) -> bool {
        self.fired
    }

    /// Flips the signal if `call` of `key` is the designated one.
    ///
    /// Returns true only for the call that fires it.
    pub(crate) fn observe(&mut self, key: &InterceptionKey, call: usize) -> bool {
        if self.fired {
            return false;
        }
        let matches = self
            .designation
            .as_ref()
            .is_some_and(|d| &d.key == key && d.iteration == call);
        if matches {
            self.fired = true;
        }
        matches
    }

    pub(crate) fn reset(&mut self) {
        self.fired = false;
    }
}

/// Waits until the registry's completion flag is set.
///
/// The entry point's pending reply keeps being polled meanwhile, so lazily
/// evaluated work still makes progress. Returns the reply's outcome if it
/// settled before the signal fired.
pub(crate) async fn wait_for_signal(
    registry: &MockRegistry,
    poll_interval: Duration,
    mut pending: Option<DeferredReply>,
) -> Option<Result<Value>> {
    let mut settled = None;
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        if registry.is_complete() {
            return settled;
        }

        let outcome = match pending.as_mut() {
            Some(reply) => tokio::select! {
                outcome = reply => Some(outcome),
                _ = ticker.tick() => None,
            },
            None => {
                ticker.tick().await;
                None
            }
        };

        if let Some(outcome) = outcome {
            debug!("Entry point settled before the completion signal");
            settled = Some(outcome);
            pending = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn designation(name: &str, iteration: usize) -> CompletionDesignation {
        CompletionDesignation {
            key: InterceptionKey::new("db", name),
            iteration,
        }
    }

    #[test]
    fn test_signal_fires_once_on_matching_call() {
        let mut signal = CompletionSignal::default();
        signal.designate(designation("save", 1));

        let key = InterceptionKey::new("db", "save");
        assert!(!signal.observe(&key, 0));
        assert!(signal.observe(&key, 1));
        assert!(signal.fired());
        assert!(!signal.observe(&key, 1));
    }

    #[test]
    fn test_signal_ignores_other_keys() {
        let mut signal = CompletionSignal::default();
        signal.designate(designation("save", 0));
        assert!(!signal.observe(&InterceptionKey::new("db", "load"), 0));
        assert!(!signal.fired());
    }

    #[test]
    fn test_new_designation_replaces_previous() {
        let mut signal = CompletionSignal::default();
        signal.designate(designation("save", 0));
        signal.designate(designation("load", 2));

        assert_eq!(signal.designation(), Some(&designation("load", 2)));
        assert!(!signal.observe(&InterceptionKey::new("db", "save"), 0));
    }

    #[test]
    fn test_reset_clears_fired_flag() {
        let mut signal = CompletionSignal::default();
        signal.designate(designation("save", 0));
        signal.observe(&InterceptionKey::new("db", "save"), 0);
        signal.reset();
        assert!(!signal.fired());
        assert!(signal.designation().is_some());
    }

    #[test]
    fn test_mode_target_description() {
        assert_eq!(
            CompletionMode::Explicit(designation("save", 3)).target(),
            "db.save call 3"
        );
        assert!(!CompletionMode::Implicit.is_explicit());
    }
}
