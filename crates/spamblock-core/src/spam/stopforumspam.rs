//! StopForumSpam reputation lookup
//!
//! Queries the sender address and sending IP against the StopForumSpam
//! database. The score is the highest per-field confidence (0-100).
//! See: https://www.stopforumspam.com/usage

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use serde_json::{Map, Value};
use spamblock_common::config::StopForumSpamConfig;
use spamblock_common::{Error, Result};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::{numeric, ProviderResult, SpamCheckProvider, STOPFORUMSPAM};
use crate::context::EmailContext;

/// Fields StopForumSpam reports on
const LOOKUP_FIELDS: [&str; 2] = ["email", "ip"];

/// StopForumSpam HTTP client
pub struct StopForumSpamProvider {
    client: Client,
    url: String,
}

impl StopForumSpamProvider {
    pub fn new(config: &StopForumSpamConfig) -> Result<Self> {
        Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("Invalid StopForumSpam url: {}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Provider(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    /// Lookup URL for the given email and/or IP
    fn lookup_url(&self, email: Option<&str>, ip: Option<&str>) -> Option<Url> {
        let mut url = Url::parse(&self.url).ok()?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("json", "1");
            query.append_pair("confidence", "1");
            if let Some(email) = email {
                query.append_pair("email", email);
            }
            if let Some(ip) = ip {
                query.append_pair("ip", ip);
            }
        }
        Some(url)
    }
}

fn success(decoded: &Value) -> bool {
    match decoded.get("success") {
        Some(Value::Bool(b)) => *b,
        other => numeric(other) == Some(1.0),
    }
}

#[async_trait]
impl SpamCheckProvider for StopForumSpamProvider {
    fn name(&self) -> &'static str {
        STOPFORUMSPAM
    }

    async fn check(&self, context: &EmailContext) -> ProviderResult {
        let email = Some(context.from_email.trim()).filter(|s| !s.is_empty());
        let ip = Some(context.ip.trim()).filter(|s| !s.is_empty());

        if email.is_none() && ip.is_none() {
            return ProviderResult::failed(
                STOPFORUMSPAM,
                "No email or IP available for StopForumSpam lookup",
            );
        }

        let url = match self.lookup_url(email, ip) {
            Some(url) => url,
            None => {
                return ProviderResult::failed(STOPFORUMSPAM, "Invalid StopForumSpam endpoint")
            }
        };

        let response = match self
            .client
            .get(url.clone())
            .header(USER_AGENT, concat!("spamblock/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(mid = %context.mid, "StopForumSpam request failed: {}", e);
                return ProviderResult::failed(STOPFORUMSPAM, "Network error calling StopForumSpam")
                    .with_data("url", url.as_str())
                    .with_data("detail", e.to_string());
            }
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            warn!(mid = %context.mid, status, "StopForumSpam returned non-2xx");
            return ProviderResult::failed(STOPFORUMSPAM, "Non-2xx response from StopForumSpam")
                .with_status(status)
                .with_data("url", url.as_str());
        }

        let decoded: Value = match response.json::<Value>().await {
            Ok(v @ Value::Object(_)) => v,
            _ => {
                return ProviderResult::failed(
                    STOPFORUMSPAM,
                    "Unable to decode StopForumSpam response JSON",
                )
                .with_status(status)
                .with_data("url", url.as_str())
            }
        };

        if !success(&decoded) {
            let error = decoded
                .get("error")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or("StopForumSpam lookup failed")
                .to_string();
            return ProviderResult::failed(STOPFORUMSPAM, error)
                .with_status(status)
                .with_data("url", url.as_str());
        }

        let mut data = Map::new();
        data.insert("url".to_string(), Value::from(url.as_str()));

        let mut score: Option<f64> = None;
        for field in LOOKUP_FIELDS {
            let Some(entry) = decoded.get(field) else {
                continue;
            };

            let confidence = numeric(entry.get("confidence"));
            data.insert(format!("{}_confidence", field), confidence.into());
            data.insert(
                format!("{}_appears", field),
                numeric(entry.get("appears")).into(),
            );
            data.insert(
                format!("{}_frequency", field),
                numeric(entry.get("frequency")).into(),
            );

            if let Some(c) = confidence {
                score = Some(score.map_or(c, |s| s.max(c)));
            }
        }

        debug!(mid = %context.mid, ?score, "StopForumSpam lookup complete");

        ProviderResult {
            data,
            ..ProviderResult::scored(STOPFORUMSPAM, score).with_status(status)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(url: String) -> StopForumSpamProvider {
        StopForumSpamProvider::new(&StopForumSpamConfig {
            enabled: true,
            url,
            timeout_secs: 1,
        })
        .unwrap()
    }

    fn context(email: &str, ip: &str) -> EmailContext {
        EmailContext::new("<m1@example.com>", email, "", "", "").with_ip(ip)
    }

    #[tokio::test]
    async fn test_no_email_or_ip_makes_no_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let result = provider(server.uri()).check(&context("", " ")).await;
        assert_eq!(
            result.error.as_deref(),
            Some("No email or IP available for StopForumSpam lookup")
        );
    }

    #[tokio::test]
    async fn test_max_confidence_is_score() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .and(query_param("json", "1"))
            .and(query_param("confidence", "1"))
            .and(query_param("email", "a@example.com"))
            .and(query_param("ip", "8.8.8.8"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": 1,
                "email": { "confidence": 20, "appears": 1, "frequency": 2 },
                "ip": { "confidence": 80, "appears": 1, "frequency": 2 },
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = provider(format!("{}/api", server.uri()))
            .check(&context("a@example.com", "8.8.8.8"))
            .await;

        assert_eq!(result.error, None);
        assert_eq!(result.score, Some(80.0));
        assert_eq!(result.status_code, Some(200));
        assert_eq!(result.data["email_confidence"], json!(20.0));
        assert_eq!(result.data["ip_confidence"], json!(80.0));
        assert!(result.data["url"]
            .as_str()
            .unwrap()
            .contains("email=a%40example.com"));
    }

    #[tokio::test]
    async fn test_unlisted_has_no_score() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": 1,
                "email": { "appears": 0, "frequency": 0 },
            })))
            .mount(&server)
            .await;

        let result = provider(server.uri())
            .check(&context("a@example.com", ""))
            .await;
        assert_eq!(result.error, None);
        assert_eq!(result.score, None);
    }

    #[tokio::test]
    async fn test_success_false_uses_error_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "success": 0, "error": "nope" })),
            )
            .mount(&server)
            .await;

        let result = provider(server.uri())
            .check(&context("a@example.com", ""))
            .await;
        assert_eq!(result.error.as_deref(), Some("nope"));
        assert_eq!(result.score, None);
    }

    #[tokio::test]
    async fn test_success_false_without_error_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": 0 })))
            .mount(&server)
            .await;

        let result = provider(server.uri())
            .check(&context("a@example.com", ""))
            .await;
        assert_eq!(result.error.as_deref(), Some("StopForumSpam lookup failed"));
    }

    #[tokio::test]
    async fn test_non_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("{}"))
            .mount(&server)
            .await;

        let result = provider(server.uri())
            .check(&context("a@example.com", ""))
            .await;
        assert_eq!(result.status_code, Some(403));
        assert_eq!(
            result.error.as_deref(),
            Some("Non-2xx response from StopForumSpam")
        );
    }

    #[tokio::test]
    async fn test_network_error() {
        let result = provider("http://127.0.0.1:1/api".to_string())
            .check(&context("a@example.com", ""))
            .await;
        assert_eq!(
            result.error.as_deref(),
            Some("Network error calling StopForumSpam")
        );
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(StopForumSpamProvider::new(&StopForumSpamConfig {
            enabled: true,
            url: "not a url".to_string(),
            timeout_secs: 1,
        })
        .is_err());
    }
}
