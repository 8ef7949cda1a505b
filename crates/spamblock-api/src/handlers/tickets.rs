//! Ticket audit handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use spamblock_common::types::TicketId;
use spamblock_storage::TicketSpamMeta;
use std::sync::Arc;
use tracing::{error, info};

use super::status_for;
use crate::routes::AppState;

/// Request body for a created ticket
#[derive(Debug, Clone, Deserialize)]
pub struct TicketCreatedRequest {
    #[serde(default)]
    pub email: String,
    pub mid: String,
}

/// Request body for marking a ticket as spam
#[derive(Debug, Clone, Deserialize)]
pub struct MarkSpamRequest {
    pub email: String,
}

/// Persist the remembered check for a newly created ticket
pub async fn ticket_created(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<TicketId>,
    Json(req): Json<TicketCreatedRequest>,
) -> Result<Json<TicketSpamMeta>, StatusCode> {
    let meta = state
        .checker
        .ticket_created(ticket_id, &req.email, &req.mid)
        .await
        .map_err(|e| {
            error!("Failed to record spam metadata for ticket {}: {}", ticket_id, e);
            status_for(&e)
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(meta))
}

/// Get the audit record for a ticket
pub async fn get_ticket_spam(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<TicketId>,
) -> Result<Json<TicketSpamMeta>, StatusCode> {
    let meta = state
        .checker
        .lookup(ticket_id)
        .await
        .map_err(|e| {
            error!("Database error while looking up ticket {}: {}", ticket_id, e);
            status_for(&e)
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(meta))
}

/// Flag a ticket as spam
pub async fn mark_ticket_spam(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<TicketId>,
    Json(req): Json<MarkSpamRequest>,
) -> Result<Json<TicketSpamMeta>, StatusCode> {
    let meta = state
        .checker
        .mark_spam(ticket_id, &req.email)
        .await
        .map_err(|e| {
            error!("Failed to mark ticket {} as spam: {}", ticket_id, e);
            status_for(&e)
        })?;

    info!("Ticket {} marked as spam via API", ticket_id);
    Ok(Json(meta))
}
