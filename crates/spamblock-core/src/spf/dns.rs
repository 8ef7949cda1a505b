//! DNS lookups used by the SPF evaluator
//!
//! The evaluator only needs TXT, A/AAAA and MX answers, so it talks to a
//! small [`DnsLookup`] trait. Production uses [`TrustDnsLookup`]; tests use
//! [`StaticDnsLookup`] with a fixed answer table.

use async_trait::async_trait;
use spamblock_common::config::DnsConfig;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::op::ResponseCode;
use trust_dns_resolver::TokioAsyncResolver;

/// DNS failure other than "no such record"
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    #[error("DNS query timed out")]
    Timeout,

    #[error("DNS server failure")]
    ServFail,

    #[error("DNS error: {0}")]
    Other(String),
}

/// Address record family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// IPv4 (A records)
    A,
    /// IPv6 (AAAA records)
    Aaaa,
}

impl AddressFamily {
    /// Family matching the given address
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => AddressFamily::A,
            IpAddr::V6(_) => AddressFamily::Aaaa,
        }
    }
}

/// DNS lookups needed for SPF
///
/// Non-existent names and empty answers are `Ok(vec![])`, never errors.
#[async_trait]
pub trait DnsLookup: Send + Sync {
    /// TXT strings for `domain`, one entry per record with its
    /// character-strings concatenated
    async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>, DnsError>;

    /// A or AAAA addresses for `domain`
    async fn lookup_address(
        &self,
        domain: &str,
        family: AddressFamily,
    ) -> Result<Vec<IpAddr>, DnsError>;

    /// MX exchange hostnames for `domain`, without the trailing dot
    async fn lookup_mx(&self, domain: &str) -> Result<Vec<String>, DnsError>;
}

/// [`DnsLookup`] backed by trust-dns
pub struct TrustDnsLookup {
    resolver: TokioAsyncResolver,
}

impl TrustDnsLookup {
    /// Create a resolver with the configured timeout and attempts
    pub fn new(config: &DnsConfig) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(config.timeout_secs);
        opts.attempts = config.attempts;

        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);
        Self { resolver }
    }

    /// Wrap an existing resolver
    pub fn with_resolver(resolver: TokioAsyncResolver) -> Self {
        Self { resolver }
    }
}

/// Split "no records" from real failures
fn classify<T>(result: Result<T, ResolveError>) -> Result<Option<T>, DnsError> {
    match result {
        Ok(answer) => Ok(Some(answer)),
        Err(e) => match e.kind() {
            ResolveErrorKind::NoRecordsFound { response_code, .. }
                if *response_code == ResponseCode::ServFail =>
            {
                Err(DnsError::ServFail)
            }
            ResolveErrorKind::NoRecordsFound { .. } => Ok(None),
            ResolveErrorKind::Timeout => Err(DnsError::Timeout),
            _ => Err(DnsError::Other(e.to_string())),
        },
    }
}

#[async_trait]
impl DnsLookup for TrustDnsLookup {
    async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        let lookup = match classify(self.resolver.txt_lookup(domain).await)? {
            Some(lookup) => lookup,
            None => return Ok(Vec::new()),
        };

        Ok(lookup
            .iter()
            .map(|record| {
                record
                    .txt_data()
                    .iter()
                    .map(|d| String::from_utf8_lossy(d))
                    .collect::<String>()
            })
            .collect())
    }

    async fn lookup_address(
        &self,
        domain: &str,
        family: AddressFamily,
    ) -> Result<Vec<IpAddr>, DnsError> {
        match family {
            AddressFamily::A => Ok(classify(self.resolver.ipv4_lookup(domain).await)?
                .map(|lookup| {
                    lookup
                        .iter()
                        .map(|record| {
                            let ip: std::net::Ipv4Addr = (*record).into();
                            IpAddr::V4(ip)
                        })
                        .collect()
                })
                .unwrap_or_default()),
            AddressFamily::Aaaa => Ok(classify(self.resolver.ipv6_lookup(domain).await)?
                .map(|lookup| {
                    lookup
                        .iter()
                        .map(|record| {
                            let ip: std::net::Ipv6Addr = (*record).into();
                            IpAddr::V6(ip)
                        })
                        .collect()
                })
                .unwrap_or_default()),
        }
    }

    async fn lookup_mx(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        Ok(classify(self.resolver.mx_lookup(domain).await)?
            .map(|lookup| {
                lookup
                    .iter()
                    .map(|mx| mx.exchange().to_string().trim_end_matches('.').to_string())
                    .filter(|host| !host.is_empty())
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Fixed answer table, for tests and offline evaluation
#[derive(Debug, Default)]
pub struct StaticDnsLookup {
    txt: HashMap<String, Vec<String>>,
    addresses: HashMap<(String, AddressFamily), Vec<IpAddr>>,
    mx: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    queries: AtomicUsize,
}

impl StaticDnsLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a TXT record
    pub fn with_txt(mut self, domain: &str, record: &str) -> Self {
        self.txt
            .entry(domain.to_lowercase())
            .or_default()
            .push(record.to_string());
        self
    }

    /// Add an A or AAAA record, depending on the address
    pub fn with_address(mut self, domain: &str, ip: IpAddr) -> Self {
        self.addresses
            .entry((domain.to_lowercase(), AddressFamily::of(&ip)))
            .or_default()
            .push(ip);
        self
    }

    /// Add an MX record
    pub fn with_mx(mut self, domain: &str, exchange: &str) -> Self {
        self.mx
            .entry(domain.to_lowercase())
            .or_default()
            .push(exchange.trim_end_matches('.').to_string());
        self
    }

    /// Make every query for `domain` fail with SERVFAIL
    pub fn with_failure(mut self, domain: &str) -> Self {
        self.failing.insert(domain.to_lowercase());
        self
    }

    /// Number of queries answered so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn begin(&self, domain: &str) -> Result<String, DnsError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let key = domain.to_lowercase();
        if self.failing.contains(&key) {
            return Err(DnsError::ServFail);
        }
        Ok(key)
    }
}

#[async_trait]
impl DnsLookup for StaticDnsLookup {
    async fn lookup_txt(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        let key = self.begin(domain)?;
        Ok(self.txt.get(&key).cloned().unwrap_or_default())
    }

    async fn lookup_address(
        &self,
        domain: &str,
        family: AddressFamily,
    ) -> Result<Vec<IpAddr>, DnsError> {
        let key = self.begin(domain)?;
        Ok(self
            .addresses
            .get(&(key, family))
            .cloned()
            .unwrap_or_default())
    }

    async fn lookup_mx(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        let key = self.begin(domain)?;
        Ok(self.mx.get(&key).cloned().unwrap_or_default())
    }
}
