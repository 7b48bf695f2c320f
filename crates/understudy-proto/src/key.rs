//! Interception keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Group name reserved for the synthesized response object.
///
/// Interceptions in this group are verified after every other group so that
/// response assertions fail last.
pub const RESPONSE_GROUP: &str = "response";

/// Identifies one recorded stand-in: `(group, function)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterceptionKey {
    pub group: String,
    pub name: String,
}

impl InterceptionKey {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }

    /// Returns true if this key belongs to the reserved response group.
    pub fn is_response(&self) -> bool {
        self.group == RESPONSE_GROUP
    }
}

impl fmt::Display for InterceptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        let key = InterceptionKey::new("userService", "getMiddleName");
        assert_eq!(key.to_string(), "userService.getMiddleName");
    }

    #[test]
    fn test_response_group_detection() {
        assert!(InterceptionKey::new(RESPONSE_GROUP, "send").is_response());
        assert!(!InterceptionKey::new("db", "send").is_response());
    }
}
