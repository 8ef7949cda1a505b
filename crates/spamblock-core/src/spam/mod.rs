//! Spam signal providers and the blocking decision
//!
//! Each provider inspects one message and reports a [`ProviderResult`]:
//! - `postmark`: Postmark Spamcheck content score
//! - `sfs`: StopForumSpam reputation confidence
//! - `spf`: locally evaluated SPF outcome
//!
//! Providers never fail the check; transport and decode problems are
//! carried in [`ProviderResult::error`].

pub mod decision;
pub mod postmark;
pub mod spf;
pub mod stopforumspam;

pub use decision::{decide, DecisionFields, Signals, SpamDecision};
pub use postmark::PostmarkProvider;
pub use spf::SpfProvider;
pub use stopforumspam::StopForumSpamProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::EmailContext;
use crate::spf::SpfOutcome;

/// Provider name for Postmark Spamcheck
pub const POSTMARK: &str = "postmark";
/// Provider name for StopForumSpam
pub const STOPFORUMSPAM: &str = "sfs";
/// Provider name for the SPF check
pub const SPF: &str = "spf";

/// Outcome of one provider for one message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResult {
    pub provider: String,
    /// Numeric score, if the provider produced one
    pub score: Option<f64>,
    pub error: Option<String>,
    /// HTTP status of the upstream call
    pub status_code: Option<u16>,
    /// Provider specific diagnostics
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl ProviderResult {
    /// Successful result
    pub fn scored(provider: &str, score: Option<f64>) -> Self {
        Self {
            provider: provider.to_string(),
            score,
            error: None,
            status_code: None,
            data: Map::new(),
        }
    }

    /// Failed result
    pub fn failed(provider: &str, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::scored(provider, None)
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// SPF outcome carried in `data.result`, for SPF results
    pub fn spf_outcome(&self) -> Option<SpfOutcome> {
        self.data
            .get("result")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }
}

/// A source of spam signal
#[async_trait]
pub trait SpamCheckProvider: Send + Sync {
    /// Stable provider name used in tags and results
    fn name(&self) -> &'static str;

    /// Inspect a message. Must not panic on upstream failure.
    async fn check(&self, context: &EmailContext) -> ProviderResult;
}

/// Highest score among the results, ignoring those without one
pub fn max_score(results: &[ProviderResult]) -> Option<f64> {
    results
        .iter()
        .filter_map(|r| r.score)
        .fold(None, |max, score| match max {
            Some(m) if m >= score => Some(m),
            _ => Some(score),
        })
}

/// Read a JSON number, or a string holding one
pub(crate) fn numeric(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}
