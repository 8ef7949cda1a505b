//! Postmark Spamcheck content scoring
//!
//! POSTs the raw message to the Spamcheck filter endpoint and reads back a
//! SpamAssassin style score.
//! See: https://spamcheck.postmarkapp.com/doc

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use serde_json::{json, Value};
use spamblock_common::config::PostmarkConfig;
use spamblock_common::{Error, Result};
use std::time::Duration;
use tracing::{debug, warn};

use super::{numeric, ProviderResult, SpamCheckProvider, POSTMARK};
use crate::context::EmailContext;

/// Postmark Spamcheck HTTP client
pub struct PostmarkProvider {
    client: Client,
    url: String,
}

impl PostmarkProvider {
    pub fn new(config: &PostmarkConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Provider(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl SpamCheckProvider for PostmarkProvider {
    fn name(&self) -> &'static str {
        POSTMARK
    }

    async fn check(&self, context: &EmailContext) -> ProviderResult {
        let payload = json!({
            "email": context.raw_email(),
            "options": "short",
        });

        let response = match self
            .client
            .post(&self.url)
            .header(USER_AGENT, concat!("spamblock/", env!("CARGO_PKG_VERSION")))
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(mid = %context.mid, "Postmark Spamcheck request failed: {}", e);
                return ProviderResult::failed(POSTMARK, "Network error calling Postmark Spamcheck")
                    .with_data("detail", e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(mid = %context.mid, status = status.as_u16(), "Postmark Spamcheck returned non-2xx");
            return ProviderResult::failed(POSTMARK, "Non-2xx response from Postmark Spamcheck")
                .with_status(status.as_u16());
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(mid = %context.mid, "Failed to read Postmark Spamcheck response: {}", e);
                return ProviderResult::failed(POSTMARK, "Network error calling Postmark Spamcheck")
                    .with_status(status.as_u16())
                    .with_data("detail", e.to_string());
            }
        };

        let decoded: Value = match serde_json::from_str(&body) {
            Ok(v @ (Value::Object(_) | Value::Array(_))) => v,
            _ => {
                return ProviderResult::failed(
                    POSTMARK,
                    "Unable to decode Postmark Spamcheck response JSON",
                )
                .with_status(status.as_u16())
            }
        };

        match numeric(decoded.get("score")) {
            Some(score) => {
                debug!(mid = %context.mid, score, "Postmark Spamcheck scored message");
                ProviderResult::scored(POSTMARK, Some(score)).with_status(status.as_u16())
            }
            None => ProviderResult::failed(
                POSTMARK,
                "Postmark Spamcheck response missing numeric score",
            )
            .with_status(status.as_u16()),
        }
    }
}
