use serde::{Deserialize, Serialize};
use std::fmt;

/// Mutation broadcast over the shared log. Every cache change, including an
/// instance's own, is expressed as one of these and applied only on replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheAction {
    Add,
    Remove,
    Clear,
}

impl CacheAction {
    /// Wire tag carried as the record value.
    pub fn as_wire(self) -> &'static str {
        match self {
            CacheAction::Add => "add",
            CacheAction::Remove => "remove",
            CacheAction::Clear => "clear",
        }
    }

    /// Decodes a record value back into an action. Unknown tags are a
    /// protocol violation and yield `None`.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "add" => Some(CacheAction::Add),
            "remove" => Some(CacheAction::Remove),
            "clear" => Some(CacheAction::Clear),
            _ => None,
        }
    }

    /// Whether the action must carry an identifier as the record key.
    pub fn requires_key(self) -> bool {
        !matches!(self, CacheAction::Clear)
    }
}

impl fmt::Display for CacheAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}
