//! Message check handlers

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use spamblock_common::types::TicketVars;
use spamblock_core::{CheckOutcome, ProviderResult};
use std::sync::Arc;

use crate::routes::AppState;

/// Response for a checked message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    /// Triggered providers, or all queried ones when nothing fired
    pub provider: String,
    /// Content score, empty when unknown
    pub score: String,
    /// `"1"` when the host should reject the message
    pub should_block: String,
    pub would_block: bool,
    pub triggered: Vec<String>,
    pub ip: String,
    pub results: Vec<ProviderResult>,
}

impl From<CheckOutcome> for CheckResponse {
    fn from(outcome: CheckOutcome) -> Self {
        let fields = outcome.decision.fields();
        Self {
            provider: fields.provider,
            score: fields.score,
            should_block: fields.should_block,
            would_block: outcome.decision.would_block,
            triggered: outcome.decision.triggered,
            ip: outcome.ip,
            results: outcome.results,
        }
    }
}

/// Check a message; 204 when it carries no header block
pub async fn create_check(
    State(state): State<Arc<AppState>>,
    Json(vars): Json<TicketVars>,
) -> Response {
    match state.checker.check_ticket_vars(&vars).await {
        Some(outcome) => Json(CheckResponse::from(outcome)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}
