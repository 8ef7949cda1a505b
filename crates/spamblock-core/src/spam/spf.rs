//! SPF as a spam signal

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

use super::{ProviderResult, SpamCheckProvider, SPF};
use crate::context::EmailContext;
use crate::spf::{DnsLookup, SpfEvaluator, SpfOutcome};

/// Runs the SPF evaluator for the sender domain and sending IP.
///
/// Never produces a score; the coarse outcome is reported in `data.result`.
pub struct SpfProvider {
    evaluator: SpfEvaluator,
}

impl SpfProvider {
    pub fn new(dns: Arc<dyn DnsLookup>) -> Self {
        Self {
            evaluator: SpfEvaluator::new(dns),
        }
    }

    fn invalid(error: &str, domain: &str, ip: &str) -> ProviderResult {
        ProviderResult::failed(SPF, error)
            .with_data("result", SpfOutcome::Invalid.as_str())
            .with_data("domain", domain)
            .with_data("ip", ip)
    }
}

#[async_trait]
impl SpamCheckProvider for SpfProvider {
    fn name(&self) -> &'static str {
        SPF
    }

    async fn check(&self, context: &EmailContext) -> ProviderResult {
        let ip_text = context.ip.trim();

        let domain = match context.sender_domain() {
            Some(domain) => domain,
            None => {
                return Self::invalid(
                    "Unable to determine sender domain for SPF check",
                    "",
                    ip_text,
                )
            }
        };

        let ip: IpAddr = match ip_text.parse() {
            Ok(ip) => ip,
            Err(_) => {
                return Self::invalid(
                    "No valid IP address available for SPF check",
                    &domain,
                    ip_text,
                )
            }
        };

        let eval = self.evaluator.evaluate(&domain, ip).await;
        debug!(
            mid = %context.mid,
            domain = %domain,
            ip = %ip,
            result = %eval.result,
            raw = %eval.raw,
            "SPF evaluated"
        );

        let mut result = ProviderResult::scored(SPF, None)
            .with_data("result", eval.result.as_str())
            .with_data("domain", domain.as_str())
            .with_data("evaluated_domain", eval.domain.as_str())
            .with_data("redirect_chain", eval.redirect_chain.clone())
            .with_data("ip", ip_text)
            .with_data("record", eval.record.clone())
            .with_data("raw", eval.raw.as_str())
            .with_data("trace", eval.trace.clone());
        result.error = eval.error;
        result
    }
}
