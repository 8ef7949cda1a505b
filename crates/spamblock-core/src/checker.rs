//! Spam check pipeline
//!
//! Runs the configured providers for a message, applies the current
//! policy, logs blocked messages and remembers the outcome until the host
//! reports the ticket it created for that message.

use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use spamblock_common::config::PolicyConfig;
use spamblock_common::types::{BlockedLogLevel, TicketId, TicketVars};
use spamblock_common::{Config, Error, Result};
use spamblock_storage::{TicketSpamMeta, TicketSpamMetaRepository, UpsertTicketSpamMeta};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::context::EmailContext;
use crate::spam::{
    decide, PostmarkProvider, ProviderResult, SpamCheckProvider, SpamDecision, SpfProvider,
    StopForumSpamProvider,
};
use crate::spf::{DnsLookup, TrustDnsLookup};

/// How long a check waits for its ticket before being forgotten
pub const RECENT_CHECK_TTL: Duration = Duration::from_secs(15 * 60);

/// Result of checking one message
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub mid: String,
    pub email: String,
    pub ip: String,
    pub decision: SpamDecision,
    pub results: Vec<ProviderResult>,
}

impl CheckOutcome {
    /// Write the decision fields into the host's ticket vars
    pub fn annotate(&self, vars: &mut TicketVars) {
        let fields = self.decision.fields();
        vars.insert("spamblock_provider".to_string(), Value::from(fields.provider));
        vars.insert("spamblock_score".to_string(), Value::from(fields.score));
        vars.insert(
            "spamblock_should_block".to_string(),
            Value::from(fields.should_block),
        );
    }
}

#[derive(Debug, Clone)]
struct RecentCheck {
    email: String,
    decision: SpamDecision,
    recorded_at: Instant,
}

/// Spam check pipeline
pub struct SpamChecker {
    providers: Vec<Arc<dyn SpamCheckProvider>>,
    spf: Option<Arc<dyn SpamCheckProvider>>,
    policy: RwLock<PolicyConfig>,
    repository: Arc<dyn TicketSpamMetaRepository>,
    recent: Mutex<HashMap<String, RecentCheck>>,
    recent_ttl: Duration,
}

impl SpamChecker {
    /// Create a checker with no providers
    pub fn new(policy: PolicyConfig, repository: Arc<dyn TicketSpamMetaRepository>) -> Self {
        Self {
            providers: Vec::new(),
            spf: None,
            policy: RwLock::new(policy),
            repository,
            recent: Mutex::new(HashMap::new()),
            recent_ttl: RECENT_CHECK_TTL,
        }
    }

    /// Override how long unclaimed outcomes are kept
    pub fn with_recent_ttl(mut self, ttl: Duration) -> Self {
        self.recent_ttl = ttl;
        self
    }

    /// Add an always-on provider
    pub fn with_provider(mut self, provider: Arc<dyn SpamCheckProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Set the SPF provider, run only while some SPF action is `spam`
    pub fn with_spf_provider(mut self, provider: Arc<dyn SpamCheckProvider>) -> Self {
        self.spf = Some(provider);
        self
    }

    /// Build the production pipeline from configuration
    pub fn from_config(
        config: &Config,
        repository: Arc<dyn TicketSpamMetaRepository>,
    ) -> Result<Self> {
        let mut checker = Self::new(config.policy.clone(), repository);

        if config.postmark.enabled {
            checker = checker.with_provider(Arc::new(PostmarkProvider::new(&config.postmark)?));
        }

        if config.stopforumspam.enabled {
            checker = checker.with_provider(Arc::new(StopForumSpamProvider::new(
                &config.stopforumspam,
            )?));
        }

        let dns: Arc<dyn DnsLookup> = Arc::new(TrustDnsLookup::new(&config.dns));
        Ok(checker.with_spf_provider(Arc::new(SpfProvider::new(dns))))
    }

    /// Snapshot of the current policy
    pub async fn policy(&self) -> PolicyConfig {
        self.policy.read().await.clone()
    }

    /// Replace the policy; applies from the next check on
    pub async fn set_policy(&self, policy: PolicyConfig) {
        info!(
            min_block_score = policy.min_block_score,
            sfs_min_confidence = policy.sfs_min_confidence,
            test_mode = policy.test_mode,
            "Spam policy updated"
        );
        *self.policy.write().await = policy;
    }

    pub fn repository(&self) -> &Arc<dyn TicketSpamMetaRepository> {
        &self.repository
    }

    /// Check one message under the current policy
    pub async fn check(&self, context: &EmailContext) -> CheckOutcome {
        let policy = self.policy().await;

        let mut active: Vec<&Arc<dyn SpamCheckProvider>> = self.providers.iter().collect();
        if policy.is_spf_enabled() {
            active.extend(self.spf.as_ref());
        }

        let results = join_all(active.iter().map(|p| p.check(context))).await;

        for result in results.iter().filter(|r| !r.is_ok()) {
            warn!(
                mid = %context.mid,
                provider = %result.provider,
                status = ?result.status_code,
                "Spam check provider failed: {}",
                result.error.as_deref().unwrap_or_default()
            );
        }

        let decision = decide(&results, &policy);
        log_decision(policy.blocked_email_log_level, context, &decision);

        CheckOutcome {
            mid: context.mid.clone(),
            email: context.from_email.clone(),
            ip: context.ip.clone(),
            decision,
            results,
        }
    }

    /// Check a message handed over as ticket vars
    ///
    /// Returns `None` when the message has no header block. The outcome is
    /// remembered by message id for [`SpamChecker::ticket_created`].
    pub async fn check_ticket_vars(&self, vars: &TicketVars) -> Option<CheckOutcome> {
        let context = EmailContext::from_ticket_vars(vars);
        if !context.has_header() {
            debug!(mid = %context.mid, "No header block, skipping spam check");
            return None;
        }

        let outcome = self.check(&context).await;

        if !outcome.mid.is_empty() {
            let mut recent = self.recent.lock().await;
            prune_expired(&mut recent, self.recent_ttl);
            recent.insert(
                outcome.mid.clone(),
                RecentCheck {
                    email: outcome.email.clone(),
                    decision: outcome.decision.clone(),
                    recorded_at: Instant::now(),
                },
            );
        }

        Some(outcome)
    }

    /// Persist the remembered outcome for `mid` against the new ticket
    ///
    /// Returns `Ok(None)` when no outcome is remembered for the message.
    pub async fn ticket_created(
        &self,
        ticket_id: TicketId,
        email: &str,
        mid: &str,
    ) -> Result<Option<TicketSpamMeta>> {
        if ticket_id <= 0 {
            return Err(Error::Validation(format!(
                "ticket id must be positive, got {}",
                ticket_id
            )));
        }

        let entry = {
            let mut recent = self.recent.lock().await;
            prune_expired(&mut recent, self.recent_ttl);
            recent.get(mid).cloned()
        };

        let entry = match entry {
            Some(entry) => entry,
            None => {
                debug!(ticket_id, mid, "No recent spam check for ticket");
                return Ok(None);
            }
        };

        let email = if email.trim().is_empty() {
            entry.email.clone()
        } else {
            email.trim().to_string()
        };

        let meta = self
            .repository
            .upsert(UpsertTicketSpamMeta {
                ticket_id,
                email,
                is_spam: entry.decision.would_block,
                postmark_score: entry.decision.postmark_score,
                sfs_confidence: entry.decision.sfs_confidence,
                spf_result: entry.decision.spf_result.map(|r| r.as_str().to_string()),
            })
            .await?;

        self.recent.lock().await.remove(mid);

        info!(ticket_id, mid, is_spam = meta.is_spam, "Recorded spam metadata");
        Ok(Some(meta))
    }

    pub async fn lookup(&self, ticket_id: TicketId) -> Result<Option<TicketSpamMeta>> {
        self.repository.lookup(ticket_id).await
    }

    /// Operator override: flag a ticket as spam
    pub async fn mark_spam(&self, ticket_id: TicketId, email: &str) -> Result<TicketSpamMeta> {
        let meta = self.repository.mark_spam(ticket_id, email).await?;
        info!(ticket_id, "Ticket marked as spam");
        Ok(meta)
    }

    /// Number of outcomes waiting for their ticket
    pub async fn pending_checks(&self) -> usize {
        let mut recent = self.recent.lock().await;
        prune_expired(&mut recent, self.recent_ttl);
        recent.len()
    }
}

fn prune_expired(recent: &mut HashMap<String, RecentCheck>, ttl: Duration) {
    recent.retain(|_, check| check.recorded_at.elapsed() < ttl);
}

fn log_decision(level: BlockedLogLevel, context: &EmailContext, decision: &SpamDecision) {
    let provider = decision.provider_tag();
    let score = decision.score_field();

    if !decision.would_block {
        debug!(mid = %context.mid, provider = %provider, score = %score, "Message passed spam check");
        return;
    }

    let title = if decision.should_block {
        "Spamblock - Blocked Email"
    } else {
        "Spamblock - Would have blocked Email"
    };

    match level {
        BlockedLogLevel::Debug => debug!(
            mid = %context.mid,
            from = %context.from_email,
            ip = %context.ip,
            provider = %provider,
            score = %score,
            "{}", title
        ),
        BlockedLogLevel::Warning => warn!(
            mid = %context.mid,
            from = %context.from_email,
            ip = %context.ip,
            provider = %provider,
            score = %score,
            "{}", title
        ),
        BlockedLogLevel::Error => error!(
            mid = %context.mid,
            from = %context.from_email,
            ip = %context.ip,
            provider = %provider,
            score = %score,
            "{}", title
        ),
    }
}
