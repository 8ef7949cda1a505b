//! Spamblock Core - spam decisions for inbound mail
//!
//! This crate combines three independent signals into a single
//! block/allow decision per message:
//! - Postmark Spamcheck content score
//! - StopForumSpam reputation confidence
//! - a locally evaluated SPF check

pub mod checker;
pub mod context;
pub mod extract;
pub mod spam;
pub mod spf;

pub use checker::{CheckOutcome, SpamChecker};
pub use context::EmailContext;
pub use spam::{
    decide, max_score, DecisionFields, PostmarkProvider, ProviderResult, SpamCheckProvider,
    SpamDecision, SpfProvider, StopForumSpamProvider,
};
pub use spf::{
    cidr_match, AddressFamily, DnsError, DnsLookup, SpfEvaluation, SpfEvaluator, SpfOutcome,
    SpfResult, StaticDnsLookup, TrustDnsLookup,
};
