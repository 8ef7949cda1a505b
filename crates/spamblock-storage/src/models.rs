//! Database models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spamblock_common::types::TicketId;
use sqlx::FromRow;

/// Spam metadata recorded for a ticket
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct TicketSpamMeta {
    pub ticket_id: TicketId,
    pub email: String,
    /// Would-block outcome, independent of test mode
    pub is_spam: bool,
    pub postmark_score: Option<f64>,
    pub sfs_confidence: Option<f64>,
    /// Coarse SPF result (`pass`, `fail`, `none`, `invalid`)
    pub spf_result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for writing a ticket's spam metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertTicketSpamMeta {
    pub ticket_id: TicketId,
    pub email: String,
    pub is_spam: bool,
    pub postmark_score: Option<f64>,
    pub sfs_confidence: Option<f64>,
    pub spf_result: Option<String>,
}
