//! SPF (Sender Policy Framework) evaluation
//!
//! A simplified RFC 7208 evaluator: `ip4`, `ip6`, `a`, `mx`, `include`,
//! `all` and the `redirect` modifier, bounded to a fixed recursion depth.

pub mod cidr;
pub mod dns;
pub mod evaluator;

pub use cidr::{cidr_match, ip_in_cidr};
pub use dns::{AddressFamily, DnsError, DnsLookup, StaticDnsLookup, TrustDnsLookup};
pub use evaluator::{SpfEvaluation, SpfEvaluator, SpfOutcome, SpfResult, MAX_DEPTH};
