//! SPF record evaluation
//!
//! Implements the subset of RFC 7208 needed for a block/allow signal:
//! `ip4`, `ip6`, `a`, `mx`, `include`, `all` and `redirect=`. Anything
//! else is a permanent error once evaluation reaches it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use super::cidr::ip_in_cidr;
use super::dns::{AddressFamily, DnsLookup};

/// Maximum include/redirect nesting
pub const MAX_DEPTH: usize = 8;

const RECURSION_LIMIT: &str = "SPF recursion limit exceeded";

/// RFC 7208 result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpfResult {
    /// The sending IP is authorized
    Pass,
    /// The sending IP is explicitly not authorized
    Fail,
    /// The sending IP is probably not authorized
    SoftFail,
    /// The domain owner has no opinion
    Neutral,
    /// No SPF record found
    None,
    /// Temporary error (DNS failure)
    TempError,
    /// Permanent error (invalid record, unsupported term, loop)
    PermError,
}

impl SpfResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpfResult::Pass => "pass",
            SpfResult::Fail => "fail",
            SpfResult::SoftFail => "softfail",
            SpfResult::Neutral => "neutral",
            SpfResult::None => "none",
            SpfResult::TempError => "temperror",
            SpfResult::PermError => "permerror",
        }
    }

    /// Collapse into the four outcomes the blocking policy acts on
    pub fn outcome(self) -> SpfOutcome {
        match self {
            SpfResult::Pass | SpfResult::Neutral => SpfOutcome::Pass,
            SpfResult::Fail | SpfResult::SoftFail => SpfOutcome::Fail,
            SpfResult::None => SpfOutcome::None,
            SpfResult::TempError | SpfResult::PermError => SpfOutcome::Invalid,
        }
    }
}

impl fmt::Display for SpfResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse SPF outcome used by the blocking policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpfOutcome {
    Pass,
    Fail,
    None,
    Invalid,
}

impl SpfOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpfOutcome::Pass => "pass",
            SpfOutcome::Fail => "fail",
            SpfOutcome::None => "none",
            SpfOutcome::Invalid => "invalid",
        }
    }
}

impl fmt::Display for SpfOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpfOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass" => Ok(SpfOutcome::Pass),
            "fail" => Ok(SpfOutcome::Fail),
            "none" => Ok(SpfOutcome::None),
            "invalid" => Ok(SpfOutcome::Invalid),
            other => Err(format!("unknown SPF outcome: {}", other)),
        }
    }
}

/// Result of evaluating SPF for a domain and IP
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpfEvaluation {
    /// Domain the final verdict came from (differs after `redirect=`)
    pub domain: String,
    pub result: SpfOutcome,
    pub raw: SpfResult,
    /// SPF record that produced the verdict
    pub record: Option<String>,
    /// Domains followed via `redirect=`, in order
    pub redirect_chain: Vec<String>,
    pub error: Option<String>,
    /// Human readable evaluation steps
    pub trace: Vec<String>,
}

/// Qualifier prefix on a mechanism
#[derive(Debug, Clone, Copy, PartialEq)]
enum Qualifier {
    Pass,     // + (default)
    Fail,     // -
    SoftFail, // ~
    Neutral,  // ?
}

impl Qualifier {
    fn to_result(self) -> SpfResult {
        match self {
            Qualifier::Pass => SpfResult::Pass,
            Qualifier::Fail => SpfResult::Fail,
            Qualifier::SoftFail => SpfResult::SoftFail,
            Qualifier::Neutral => SpfResult::Neutral,
        }
    }

    fn symbol(self) -> char {
        match self {
            Qualifier::Pass => '+',
            Qualifier::Fail => '-',
            Qualifier::SoftFail => '~',
            Qualifier::Neutral => '?',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Mechanism {
    All,
    Ip4(String),
    Ip6(String),
    Include(String),
    /// `None` for the bare form, which targets the current domain
    A(Option<String>),
    Mx(Option<String>),
}

/// One whitespace-separated term of a record.
///
/// Parsing is lazy: an unsupported term only becomes an error if
/// evaluation actually reaches it.
#[derive(Debug, Clone, PartialEq)]
enum Term {
    Directive(Qualifier, Mechanism),
    Redirect(String),
    Unsupported(String),
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let n = prefix.len();
    if s.len() >= n && s.is_char_boundary(n) && s[..n].eq_ignore_ascii_case(prefix) {
        Some(&s[n..])
    } else {
        None
    }
}

fn parse_term(token: &str) -> Term {
    if let Some(value) = strip_prefix_ci(token, "redirect=") {
        return Term::Redirect(value.trim().to_lowercase());
    }

    let (qualifier, body) = match token.chars().next() {
        Some('+') => (Qualifier::Pass, &token[1..]),
        Some('-') => (Qualifier::Fail, &token[1..]),
        Some('~') => (Qualifier::SoftFail, &token[1..]),
        Some('?') => (Qualifier::Neutral, &token[1..]),
        _ => (Qualifier::Pass, token),
    };

    let mechanism = if body.eq_ignore_ascii_case("all") {
        Mechanism::All
    } else if let Some(cidr) = strip_prefix_ci(body, "ip4:") {
        Mechanism::Ip4(cidr.to_string())
    } else if let Some(cidr) = strip_prefix_ci(body, "ip6:") {
        Mechanism::Ip6(cidr.to_string())
    } else if let Some(domain) = strip_prefix_ci(body, "include:") {
        Mechanism::Include(domain.trim().to_lowercase())
    } else if body.eq_ignore_ascii_case("a") {
        Mechanism::A(None)
    } else if let Some(domain) = strip_prefix_ci(body, "a:") {
        Mechanism::A(Some(domain.trim().to_lowercase()))
    } else if body.eq_ignore_ascii_case("mx") {
        Mechanism::Mx(None)
    } else if let Some(domain) = strip_prefix_ci(body, "mx:") {
        Mechanism::Mx(Some(domain.trim().to_lowercase()))
    } else {
        return Term::Unsupported(body.to_string());
    };

    Term::Directive(qualifier, mechanism)
}

/// Verdict for one domain, before the trace is attached
#[derive(Debug, Clone)]
struct Verdict {
    domain: String,
    raw: SpfResult,
    record: Option<String>,
    redirect_chain: Vec<String>,
    error: Option<String>,
    /// Set once the depth bound is hit anywhere below; never cleared
    depth_exceeded: bool,
}

impl Verdict {
    fn new(domain: &str, raw: SpfResult, record: Option<&str>) -> Self {
        Self {
            domain: domain.to_string(),
            raw,
            record: record.map(str::to_string),
            redirect_chain: Vec::new(),
            error: None,
            depth_exceeded: false,
        }
    }

    fn depth_exceeded(domain: &str, record: Option<&str>) -> Self {
        Self {
            depth_exceeded: true,
            ..Self::error(domain, SpfResult::PermError, record, RECURSION_LIMIT)
        }
    }

    fn error(domain: &str, raw: SpfResult, record: Option<&str>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(domain, raw, record)
        }
    }

    fn into_evaluation(self, trace: Vec<String>) -> SpfEvaluation {
        SpfEvaluation {
            domain: self.domain,
            result: self.raw.outcome(),
            raw: self.raw,
            record: self.record,
            redirect_chain: self.redirect_chain,
            error: self.error,
            trace,
        }
    }
}

fn note(trace: &mut Vec<String>, line: String) {
    debug!(target: "spamblock::spf", "{}", line);
    trace.push(line);
}

type BoxedVerdict<'a> = Pin<Box<dyn Future<Output = Verdict> + Send + 'a>>;

/// SPF evaluator over a pluggable DNS backend
pub struct SpfEvaluator {
    dns: Arc<dyn DnsLookup>,
}

impl SpfEvaluator {
    pub fn new(dns: Arc<dyn DnsLookup>) -> Self {
        Self { dns }
    }

    /// Evaluate SPF for `domain` and the connecting `ip`
    pub async fn evaluate(&self, domain: &str, ip: IpAddr) -> SpfEvaluation {
        let domain = domain.trim().to_lowercase();
        let mut trace = Vec::new();
        let verdict = self.evaluate_domain(&domain, ip, 0, &mut trace).await;
        verdict.into_evaluation(trace)
    }

    /// Evaluate an already fetched record as if published by `domain`
    pub async fn evaluate_record(&self, domain: &str, ip: IpAddr, record: &str) -> SpfEvaluation {
        let domain = domain.trim().to_lowercase();
        let mut trace = Vec::new();
        let verdict = self.check_record(&domain, ip, record, 0, &mut trace).await;
        verdict.into_evaluation(trace)
    }

    fn evaluate_domain<'a>(
        &'a self,
        domain: &'a str,
        ip: IpAddr,
        depth: usize,
        trace: &'a mut Vec<String>,
    ) -> BoxedVerdict<'a> {
        Box::pin(async move {
            if depth >= MAX_DEPTH {
                note(
                    trace,
                    format!("domain={} depth={} error={}", domain, depth, RECURSION_LIMIT),
                );
                return Verdict::depth_exceeded(domain, None);
            }

            let records = match self.dns.lookup_txt(domain).await {
                Ok(records) => records,
                Err(e) => {
                    let error = format!("DNS TXT lookup failed: {}", e);
                    note(
                        trace,
                        format!(
                            "domain={} spf_record=(none) raw=temperror result=invalid error={}",
                            domain, error
                        ),
                    );
                    return Verdict::error(domain, SpfResult::TempError, None, error);
                }
            };

            let spf: Vec<&str> = records
                .iter()
                .map(|r| r.trim())
                .filter(|r| strip_prefix_ci(r, "v=spf1").is_some())
                .collect();

            let record = match spf.as_slice() {
                [] => {
                    note(
                        trace,
                        format!("domain={} spf_record=(none) raw=none result=none", domain),
                    );
                    return Verdict::new(domain, SpfResult::None, None);
                }
                [record] => *record,
                _ => {
                    let error = "Multiple SPF records found";
                    note(
                        trace,
                        format!(
                            "domain={} spf_record=(multiple) raw=permerror result=invalid error={}",
                            domain, error
                        ),
                    );
                    return Verdict::error(domain, SpfResult::PermError, None, error);
                }
            };

            note(trace, format!("domain={} spf_record={}", domain, record));

            let verdict = self.check_record(domain, ip, record, depth, trace).await;

            let mut line = format!(
                "domain={} raw={} result={}",
                verdict.domain,
                verdict.raw,
                verdict.raw.outcome()
            );
            if !verdict.redirect_chain.is_empty() {
                line.push_str(&format!(
                    " redirect_chain={}",
                    verdict.redirect_chain.join("->")
                ));
            }
            note(trace, line);

            verdict
        })
    }

    fn check_record<'a>(
        &'a self,
        domain: &'a str,
        ip: IpAddr,
        record: &'a str,
        depth: usize,
        trace: &'a mut Vec<String>,
    ) -> BoxedVerdict<'a> {
        Box::pin(async move {
            let record = record.trim();
            if strip_prefix_ci(record, "v=spf1").is_none() {
                return Verdict::error(
                    domain,
                    SpfResult::PermError,
                    Some(record),
                    "Invalid SPF record",
                );
            }

            let mut redirect: Option<String> = None;
            let mut matched: Option<(Qualifier, String)> = None;

            for token in record.split_whitespace() {
                if token.eq_ignore_ascii_case("v=spf1") {
                    continue;
                }

                let (qualifier, mechanism) = match parse_term(token) {
                    Term::Redirect(target) => {
                        redirect = Some(target);
                        continue;
                    }
                    Term::Unsupported(term) => {
                        note(
                            trace,
                            format!("domain={} unsupported_mechanism={}", domain, term),
                        );
                        return Verdict::error(
                            domain,
                            SpfResult::PermError,
                            Some(record),
                            format!("Unsupported SPF mechanism: {}", term),
                        );
                    }
                    Term::Directive(qualifier, mechanism) => (qualifier, mechanism),
                };

                let hit = match &mechanism {
                    Mechanism::All => true,
                    Mechanism::Ip4(cidr) | Mechanism::Ip6(cidr) => ip_in_cidr(ip, cidr),
                    Mechanism::Include(target) => {
                        if target.is_empty() {
                            return Verdict::error(
                                domain,
                                SpfResult::PermError,
                                Some(record),
                                "Invalid include mechanism",
                            );
                        }
                        note(trace, format!("domain={} include={}", domain, target));
                        let included = self.evaluate_domain(target, ip, depth + 1, trace).await;
                        if included.depth_exceeded {
                            return Verdict::depth_exceeded(domain, Some(record));
                        }
                        included.raw == SpfResult::Pass
                    }
                    Mechanism::A(target) => {
                        let target = target.as_deref().unwrap_or(domain);
                        self.address_matches(domain, target, ip, trace).await
                    }
                    Mechanism::Mx(target) => {
                        let target = target.as_deref().unwrap_or(domain);
                        self.mx_matches(domain, target, ip, trace).await
                    }
                };

                if hit {
                    matched = Some((qualifier, token.to_string()));
                    break;
                }
            }

            if matched.is_none() {
                if let Some(target) = redirect {
                    if target.is_empty() {
                        return Verdict::error(
                            domain,
                            SpfResult::PermError,
                            Some(record),
                            "Invalid redirect modifier",
                        );
                    }

                    note(trace, format!("domain={} redirect={}", domain, target));
                    let mut verdict = self.evaluate_domain(&target, ip, depth + 1, trace).await;
                    verdict.redirect_chain.insert(0, target);
                    return verdict;
                }
            }

            let raw = match &matched {
                Some((qualifier, token)) => {
                    let raw = qualifier.to_result();
                    note(
                        trace,
                        format!(
                            "domain={} matched={} qualifier={} raw={}",
                            domain,
                            token,
                            qualifier.symbol(),
                            raw
                        ),
                    );
                    raw
                }
                None => SpfResult::Neutral,
            };

            Verdict::new(domain, raw, Some(record))
        })
    }

    /// `a` mechanism: any A/AAAA of `target` equals the sending IP
    async fn address_matches(
        &self,
        domain: &str,
        target: &str,
        ip: IpAddr,
        trace: &mut Vec<String>,
    ) -> bool {
        if target.is_empty() {
            note(trace, format!("domain={} a=(empty) match=false", domain));
            return false;
        }

        match self.dns.lookup_address(target, AddressFamily::of(&ip)).await {
            Ok(addresses) => {
                let found = addresses.contains(&ip);
                note(
                    trace,
                    format!(
                        "domain={} a={} addresses={} match={}",
                        domain,
                        target,
                        addresses
                            .iter()
                            .map(|a| a.to_string())
                            .collect::<Vec<_>>()
                            .join(","),
                        found
                    ),
                );
                found
            }
            Err(e) => {
                note(trace, format!("domain={} a={} error={}", domain, target, e));
                false
            }
        }
    }

    /// `mx` mechanism: any address of any MX host of `target` equals the sending IP
    async fn mx_matches(
        &self,
        domain: &str,
        target: &str,
        ip: IpAddr,
        trace: &mut Vec<String>,
    ) -> bool {
        if target.is_empty() {
            note(trace, format!("domain={} mx=(empty) match=false", domain));
            return false;
        }

        let hosts = match self.dns.lookup_mx(target).await {
            Ok(hosts) => hosts,
            Err(e) => {
                note(trace, format!("domain={} mx={} error={}", domain, target, e));
                return false;
            }
        };

        note(
            trace,
            format!("domain={} mx={} hosts={}", domain, target, hosts.join(",")),
        );

        for host in hosts {
            let host = host.trim_end_matches('.');
            if host.is_empty() {
                continue;
            }
            if self.address_matches(domain, host, ip, trace).await {
                return true;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spf::dns::StaticDnsLookup;
    use pretty_assertions::assert_eq;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn evaluator(dns: StaticDnsLookup) -> SpfEvaluator {
        SpfEvaluator::new(Arc::new(dns))
    }

    #[tokio::test]
    async fn test_ip4_match_passes() {
        let spf = evaluator(
            StaticDnsLookup::new().with_txt("example.com", "v=spf1 ip4:203.0.113.0/24 -all"),
        );

        let eval = spf.evaluate("example.com", ip("203.0.113.55")).await;
        assert_eq!(eval.result, SpfOutcome::Pass);
        assert_eq!(eval.raw, SpfResult::Pass);
        assert_eq!(eval.record.as_deref(), Some("v=spf1 ip4:203.0.113.0/24 -all"));
        assert_eq!(eval.error, None);
        assert!(eval
            .trace
            .iter()
            .any(|l| l == "domain=example.com matched=ip4:203.0.113.0/24 qualifier=+ raw=pass"));
    }

    #[tokio::test]
    async fn test_all_fallthrough_fails() {
        let spf = evaluator(
            StaticDnsLookup::new().with_txt("example.com", "v=spf1 ip4:203.0.113.0/24 -all"),
        );

        let eval = spf.evaluate("example.com", ip("198.51.100.10")).await;
        assert_eq!(eval.result, SpfOutcome::Fail);
        assert_eq!(eval.raw, SpfResult::Fail);
    }

    #[tokio::test]
    async fn test_softfail_and_neutral_qualifiers() {
        let dns = StaticDnsLookup::new()
            .with_txt("soft.test", "v=spf1 ~all")
            .with_txt("neutral.test", "v=spf1 ?all");
        let spf = evaluator(dns);

        let soft = spf.evaluate("soft.test", ip("192.0.2.1")).await;
        assert_eq!(soft.raw, SpfResult::SoftFail);
        assert_eq!(soft.result, SpfOutcome::Fail);

        let neutral = spf.evaluate("neutral.test", ip("192.0.2.1")).await;
        assert_eq!(neutral.raw, SpfResult::Neutral);
        assert_eq!(neutral.result, SpfOutcome::Pass);
    }

    #[tokio::test]
    async fn test_no_match_is_neutral() {
        let spf = evaluator(
            StaticDnsLookup::new().with_txt("example.com", "v=spf1 ip4:10.0.0.0/8"),
        );

        let eval = spf.evaluate("example.com", ip("8.8.8.8")).await;
        assert_eq!(eval.raw, SpfResult::Neutral);
        assert_eq!(eval.result, SpfOutcome::Pass);
    }

    #[tokio::test]
    async fn test_no_record_is_none() {
        let spf = evaluator(
            StaticDnsLookup::new().with_txt("example.com", "google-site-verification=abc"),
        );

        let eval = spf.evaluate("example.com", ip("8.8.8.8")).await;
        assert_eq!(eval.result, SpfOutcome::None);
        assert_eq!(eval.raw, SpfResult::None);
        assert_eq!(eval.record, None);
        assert_eq!(
            eval.trace,
            vec!["domain=example.com spf_record=(none) raw=none result=none".to_string()]
        );
    }

    #[tokio::test]
    async fn test_multiple_records_is_permerror() {
        let dns = StaticDnsLookup::new()
            .with_txt("example.com", "v=spf1 -all")
            .with_txt("example.com", "V=SPF1 +all");
        let spf = evaluator(dns);

        let eval = spf.evaluate("example.com", ip("8.8.8.8")).await;
        assert_eq!(eval.result, SpfOutcome::Invalid);
        assert_eq!(eval.raw, SpfResult::PermError);
        assert_eq!(eval.error.as_deref(), Some("Multiple SPF records found"));
    }

    #[tokio::test]
    async fn test_dns_failure_is_temperror() {
        let spf = evaluator(StaticDnsLookup::new().with_failure("example.com"));

        let eval = spf.evaluate("example.com", ip("8.8.8.8")).await;
        assert_eq!(eval.result, SpfOutcome::Invalid);
        assert_eq!(eval.raw, SpfResult::TempError);
        assert!(eval
            .error
            .as_deref()
            .unwrap()
            .starts_with("DNS TXT lookup failed"));
    }

    #[tokio::test]
    async fn test_include_pass() {
        let dns = StaticDnsLookup::new()
            .with_txt("example.com", "v=spf1 include:_spf.provider.test -all")
            .with_txt("_spf.provider.test", "v=spf1 ip4:192.0.2.0/24 -all");
        let spf = evaluator(dns);

        let eval = spf.evaluate("example.com", ip("192.0.2.7")).await;
        assert_eq!(eval.raw, SpfResult::Pass);
        assert_eq!(eval.domain, "example.com");
        assert!(eval
            .trace
            .contains(&"domain=example.com include=_spf.provider.test".to_string()));
    }

    #[tokio::test]
    async fn test_include_fail_does_not_abort() {
        let dns = StaticDnsLookup::new()
            .with_txt(
                "example.com",
                "v=spf1 include:_spf.provider.test include:nothing.test ip4:198.51.100.1 -all",
            )
            .with_txt("_spf.provider.test", "v=spf1 -all");
        let spf = evaluator(dns);

        let eval = spf.evaluate("example.com", ip("198.51.100.1")).await;
        assert_eq!(eval.raw, SpfResult::Pass);
    }

    #[tokio::test]
    async fn test_empty_include_is_permerror() {
        let spf = evaluator(StaticDnsLookup::new().with_txt("example.com", "v=spf1 include: -all"));

        let eval = spf.evaluate("example.com", ip("8.8.8.8")).await;
        assert_eq!(eval.raw, SpfResult::PermError);
        assert_eq!(eval.error.as_deref(), Some("Invalid include mechanism"));
    }

    #[tokio::test]
    async fn test_redirect_chain() {
        let dns = StaticDnsLookup::new()
            .with_txt("example.com", "v=spf1 redirect=_spf.example.net")
            .with_txt("_spf.example.net", "v=spf1 redirect=final.example.org")
            .with_txt("final.example.org", "v=spf1 ip4:192.0.2.1 -all");
        let spf = evaluator(dns);

        let eval = spf.evaluate("example.com", ip("192.0.2.1")).await;
        assert_eq!(eval.raw, SpfResult::Pass);
        assert_eq!(eval.domain, "final.example.org");
        assert_eq!(eval.record.as_deref(), Some("v=spf1 ip4:192.0.2.1 -all"));
        assert_eq!(
            eval.redirect_chain,
            vec!["_spf.example.net".to_string(), "final.example.org".to_string()]
        );
        assert_eq!(
            eval.trace.last().unwrap(),
            "domain=final.example.org raw=pass result=pass redirect_chain=_spf.example.net->final.example.org"
        );
    }

    #[tokio::test]
    async fn test_redirect_ignored_after_match() {
        let dns = StaticDnsLookup::new()
            .with_txt("example.com", "v=spf1 redirect=other.test -all")
            .with_txt("other.test", "v=spf1 +all");
        let spf = evaluator(dns);

        let eval = spf.evaluate("example.com", ip("192.0.2.1")).await;
        assert_eq!(eval.raw, SpfResult::Fail);
        assert!(eval.redirect_chain.is_empty());
    }

    #[tokio::test]
    async fn test_empty_redirect_is_permerror() {
        let spf = evaluator(StaticDnsLookup::new().with_txt("example.com", "v=spf1 redirect="));

        let eval = spf.evaluate("example.com", ip("192.0.2.1")).await;
        assert_eq!(eval.raw, SpfResult::PermError);
        assert_eq!(eval.error.as_deref(), Some("Invalid redirect modifier"));
    }

    #[tokio::test]
    async fn test_redirect_loop_hits_depth_limit() {
        let dns = StaticDnsLookup::new().with_txt("loop.test", "v=spf1 redirect=loop.test");
        let dns = Arc::new(dns);
        let spf = SpfEvaluator::new(dns.clone());

        let eval = spf.evaluate("loop.test", ip("192.0.2.1")).await;
        assert_eq!(eval.result, SpfOutcome::Invalid);
        assert_eq!(eval.raw, SpfResult::PermError);
        assert!(eval.error.as_deref().unwrap().contains("recursion limit"));
        assert_eq!(eval.redirect_chain.len(), MAX_DEPTH);
        assert_eq!(dns.query_count(), MAX_DEPTH);
    }

    #[tokio::test]
    async fn test_include_loop_hits_depth_limit() {
        let dns = StaticDnsLookup::new()
            .with_txt("a.test", "v=spf1 include:b.test ~all")
            .with_txt("b.test", "v=spf1 include:a.test ~all");
        let dns = Arc::new(dns);
        let spf = SpfEvaluator::new(dns.clone());

        let eval = spf.evaluate("a.test", ip("192.0.2.1")).await;
        assert_eq!(eval.result, SpfOutcome::Invalid);
        assert_eq!(eval.raw, SpfResult::PermError);
        assert_eq!(eval.domain, "a.test");
        assert_eq!(eval.record.as_deref(), Some("v=spf1 include:b.test ~all"));
        assert_eq!(eval.error.as_deref(), Some("SPF recursion limit exceeded"));
        assert_eq!(dns.query_count(), MAX_DEPTH);
        assert!(eval
            .trace
            .iter()
            .any(|l| l.ends_with("error=SPF recursion limit exceeded")));
    }

    #[tokio::test]
    async fn test_unsupported_mechanism_only_when_reached() {
        let dns = StaticDnsLookup::new()
            .with_txt("early.test", "v=spf1 ip4:192.0.2.1 ptr -all")
            .with_txt("late.test", "v=spf1 ptr -all");
        let spf = evaluator(dns);

        let early = spf.evaluate("early.test", ip("192.0.2.1")).await;
        assert_eq!(early.raw, SpfResult::Pass);

        let late = spf.evaluate("late.test", ip("192.0.2.1")).await;
        assert_eq!(late.raw, SpfResult::PermError);
        assert_eq!(late.error.as_deref(), Some("Unsupported SPF mechanism: ptr"));
        assert!(late
            .trace
            .contains(&"domain=late.test unsupported_mechanism=ptr".to_string()));
    }

    #[tokio::test]
    async fn test_invalid_cidr_does_not_match() {
        let spf = evaluator(
            StaticDnsLookup::new().with_txt("example.com", "v=spf1 ip4:999.1.1.1/24 ~all"),
        );

        let eval = spf.evaluate("example.com", ip("192.0.2.1")).await;
        assert_eq!(eval.raw, SpfResult::SoftFail);
    }

    #[tokio::test]
    async fn test_case_insensitive_terms() {
        let spf = evaluator(
            StaticDnsLookup::new().with_txt("example.com", "V=SPF1 IP4:192.0.2.0/24 -ALL"),
        );

        assert_eq!(
            spf.evaluate("Example.COM", ip("192.0.2.9")).await.raw,
            SpfResult::Pass
        );
        assert_eq!(
            spf.evaluate("example.com", ip("192.0.3.9")).await.raw,
            SpfResult::Fail
        );
    }

    #[tokio::test]
    async fn test_a_mechanism() {
        let dns = StaticDnsLookup::new()
            .with_txt("example.com", "v=spf1 a a:other.test -all")
            .with_address("example.com", ip("192.0.2.10"))
            .with_address("other.test", ip("2001:db8::25"));
        let spf = evaluator(dns);

        assert_eq!(
            spf.evaluate("example.com", ip("192.0.2.10")).await.raw,
            SpfResult::Pass
        );
        assert_eq!(
            spf.evaluate("example.com", ip("2001:db8::25")).await.raw,
            SpfResult::Pass
        );
        assert_eq!(
            spf.evaluate("example.com", ip("192.0.2.11")).await.raw,
            SpfResult::Fail
        );
    }

    #[tokio::test]
    async fn test_empty_a_and_mx_targets_never_match() {
        let dns = StaticDnsLookup::new()
            .with_txt("example.com", "v=spf1 a: -all")
            .with_txt("mx.example.com", "v=spf1 mx: ?all")
            .with_address("example.com", ip("192.0.2.10"))
            .with_address("mx.example.com", ip("192.0.2.10"))
            .with_mx("mx.example.com", "mx.example.com");
        let dns = Arc::new(dns);
        let spf = SpfEvaluator::new(dns.clone());

        let eval = spf.evaluate("example.com", ip("192.0.2.10")).await;
        assert_eq!(eval.raw, SpfResult::Fail);
        assert_eq!(eval.result, SpfOutcome::Fail);
        assert!(eval
            .trace
            .contains(&"domain=example.com a=(empty) match=false".to_string()));

        let eval = spf.evaluate("mx.example.com", ip("192.0.2.10")).await;
        assert_eq!(eval.raw, SpfResult::Neutral);
        assert!(eval
            .trace
            .contains(&"domain=mx.example.com mx=(empty) match=false".to_string()));

        // Only the two TXT lookups; empty targets are never queried
        assert_eq!(dns.query_count(), 2);
    }

    #[tokio::test]
    async fn test_mx_mechanism() {
        let dns = StaticDnsLookup::new()
            .with_txt("example.com", "v=spf1 mx -all")
            .with_mx("example.com", "mx1.example.com.")
            .with_address("mx1.example.com", ip("192.0.2.25"));
        let spf = evaluator(dns);

        assert_eq!(
            spf.evaluate("example.com", ip("192.0.2.25")).await.raw,
            SpfResult::Pass
        );
        assert_eq!(
            spf.evaluate("example.com", ip("192.0.2.26")).await.raw,
            SpfResult::Fail
        );
    }

    #[tokio::test]
    async fn test_evaluate_record_rejects_non_spf() {
        let spf = evaluator(StaticDnsLookup::new());

        let eval = spf
            .evaluate_record("example.com", ip("192.0.2.1"), "hello world")
            .await;
        assert_eq!(eval.raw, SpfResult::PermError);
        assert_eq!(eval.error.as_deref(), Some("Invalid SPF record"));
        assert_eq!(eval.record.as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn test_evaluate_record_ip6() {
        let spf = evaluator(StaticDnsLookup::new());

        let eval = spf
            .evaluate_record("example.com", ip("2001:db8::1"), "v=spf1 ip6:2001:db8::/32 -all")
            .await;
        assert_eq!(eval.raw, SpfResult::Pass);
    }

    #[test]
    fn test_outcome_mapping() {
        assert_eq!(SpfResult::Pass.outcome(), SpfOutcome::Pass);
        assert_eq!(SpfResult::Neutral.outcome(), SpfOutcome::Pass);
        assert_eq!(SpfResult::Fail.outcome(), SpfOutcome::Fail);
        assert_eq!(SpfResult::SoftFail.outcome(), SpfOutcome::Fail);
        assert_eq!(SpfResult::None.outcome(), SpfOutcome::None);
        assert_eq!(SpfResult::TempError.outcome(), SpfOutcome::Invalid);
        assert_eq!(SpfResult::PermError.outcome(), SpfOutcome::Invalid);
    }

    #[test]
    fn test_outcome_from_str() {
        assert_eq!("INVALID".parse::<SpfOutcome>(), Ok(SpfOutcome::Invalid));
        assert!("softfail".parse::<SpfOutcome>().is_err());
    }
}
