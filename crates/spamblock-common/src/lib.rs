//! Spamblock Common - Shared types and utilities
//!
//! This crate provides the configuration, error type, and small shared
//! types used by every Spamblock component.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
