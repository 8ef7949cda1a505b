//! Spamblock Storage - Audit trail persistence
//!
//! Stores one spam metadata row per ticket in PostgreSQL, with an
//! in-memory backend for development and tests.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
