//! API request handlers

pub mod checks;
pub mod health;
pub mod policy;
pub mod tickets;

use axum::http::StatusCode;
use spamblock_common::Error;

/// Map a domain error onto an HTTP status
pub(crate) fn status_for(error: &Error) -> StatusCode {
    StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
