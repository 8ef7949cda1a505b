//! Spamblock API - HTTP surface
//!
//! Lets a mail host submit messages for checking, report created tickets,
//! read the audit trail and manage the blocking policy.

pub mod handlers;
pub mod routes;

pub use routes::{create_router, AppState};
