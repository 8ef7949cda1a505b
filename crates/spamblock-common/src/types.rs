//! Common types for Spamblock

use serde::{Deserialize, Serialize};
use std::fmt;

/// Host ticket identifier (the audit table's unique key)
pub type TicketId = i64;

/// Raw fields handed over by the host when a message arrives
/// (`mid`, `email`, `subject`, `header`, `message`, optional IP fields).
pub type TicketVars = serde_json::Map<String, serde_json::Value>;

/// What to do with a particular SPF outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpfAction {
    /// Do nothing
    #[default]
    Ignore,
    /// Treat the message as spam
    Spam,
}

impl SpfAction {
    pub fn is_spam(self) -> bool {
        self == SpfAction::Spam
    }
}

/// Log level used when a message is blocked (or would have been)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockedLogLevel {
    Debug,
    #[default]
    Warning,
    Error,
}

impl fmt::Display for BlockedLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockedLogLevel::Debug => "debug",
            BlockedLogLevel::Warning => "warning",
            BlockedLogLevel::Error => "error",
        };
        f.write_str(s)
    }
}
