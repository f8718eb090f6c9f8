//! Context attached to every state write

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Origin of a state write
///
/// Entity platforms stamp each write with a fresh context so listeners can
/// tell writes apart even when the value did not change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// ULID
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            user_id: None,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_are_distinct() {
        let a = Context::new();
        let b = Context::default();

        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 26);
        assert!(a.user_id.is_none());
    }
}
