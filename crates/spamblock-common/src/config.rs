//! Configuration for Spamblock

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::{BlockedLogLevel, SpfAction};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Postmark Spamcheck (content score) configuration
    #[serde(default)]
    pub postmark: PostmarkConfig,

    /// StopForumSpam (reputation) configuration
    #[serde(default)]
    pub stopforumspam: StopForumSpamConfig,

    /// DNS resolver configuration for SPF
    #[serde(default)]
    pub dns: DnsConfig,

    /// Blocking policy
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP API
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend: "postgres" or "memory"
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL (for postgres)
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_db_backend(),
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_db_backend() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    1
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// Postmark Spamcheck configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostmarkConfig {
    /// Query Postmark at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter endpoint
    #[serde(default = "default_postmark_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,
}

impl Default for PostmarkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_postmark_url(),
            timeout_secs: default_remote_timeout(),
        }
    }
}

fn default_postmark_url() -> String {
    "https://spamcheck.postmarkapp.com/filter".to_string()
}

/// StopForumSpam configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopForumSpamConfig {
    /// Query StopForumSpam at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Lookup endpoint
    #[serde(default = "default_sfs_url")]
    pub url: String,

    /// Request timeout in seconds
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,
}

impl Default for StopForumSpamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_sfs_url(),
            timeout_secs: default_remote_timeout(),
        }
    }
}

fn default_sfs_url() -> String {
    "https://api.stopforumspam.org/api".to_string()
}

fn default_remote_timeout() -> u64 {
    8
}

fn default_true() -> bool {
    true
}

/// DNS resolver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Per-query timeout in seconds
    #[serde(default = "default_dns_timeout")]
    pub timeout_secs: u64,

    /// Attempts per query
    #[serde(default = "default_dns_attempts")]
    pub attempts: usize,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_dns_timeout(),
            attempts: default_dns_attempts(),
        }
    }
}

fn default_dns_timeout() -> u64 {
    5
}

fn default_dns_attempts() -> usize {
    2
}

/// Blocking policy
///
/// Read fresh at the start of every check; never cached across messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Minimum Postmark score that blocks
    #[serde(default = "default_min_block_score")]
    pub min_block_score: f64,

    /// Minimum StopForumSpam confidence (0-100) that blocks
    #[serde(default = "default_sfs_min_confidence")]
    pub sfs_min_confidence: f64,

    /// Score and record, but never enforce
    #[serde(default)]
    pub test_mode: bool,

    /// SPF record exists but the sending IP is not allowed
    #[serde(default)]
    pub spf_fail_action: SpfAction,

    /// No SPF record for the sender domain
    #[serde(default)]
    pub spf_none_action: SpfAction,

    /// SPF record invalid or could not be evaluated
    #[serde(default)]
    pub spf_invalid_action: SpfAction,

    /// Level for "Blocked Email" / "Would have blocked Email" log lines
    #[serde(default)]
    pub blocked_email_log_level: BlockedLogLevel,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_block_score: default_min_block_score(),
            sfs_min_confidence: default_sfs_min_confidence(),
            test_mode: false,
            spf_fail_action: SpfAction::Ignore,
            spf_none_action: SpfAction::Ignore,
            spf_invalid_action: SpfAction::Ignore,
            blocked_email_log_level: BlockedLogLevel::Warning,
        }
    }
}

impl PolicyConfig {
    /// Whether any SPF outcome can influence the decision
    pub fn is_spf_enabled(&self) -> bool {
        self.spf_fail_action.is_spam()
            || self.spf_none_action.is_spam()
            || self.spf_invalid_action.is_spam()
    }
}

fn default_min_block_score() -> f64 {
    5.0
}

fn default_sfs_min_confidence() -> f64 {
    90.0
}

impl Config {
    /// Load configuration from the default locations, with
    /// `SPAMBLOCK__SECTION__KEY` environment overrides layered on top
    pub fn load() -> crate::Result<Self> {
        let paths = [
            PathBuf::from("./spamblock.toml"),
            PathBuf::from("/etc/spamblock/config.toml"),
        ];

        let file = paths.into_iter().find(|p| p.exists());
        Self::load_layered(file.as_deref())
    }

    /// Load from an optional file plus environment overrides
    pub fn load_layered(file: Option<&Path>) -> crate::Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(
                ::config::File::from(path.to_path_buf()).format(::config::FileFormat::Toml),
            );
        }

        builder
            .add_source(
                ::config::Environment::with_prefix("SPAMBLOCK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))
    }
}
