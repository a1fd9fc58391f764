//! Server address resolution.
//!
//! DNS itself is outside this crate: a [`SrvLookup`] implementation returns
//! raw SRV records, and [`SrvResolver`] turns them into an ordered candidate
//! list following RFC2782.
//!
//! # Ordering
//!
//! 1. Ascending priority.
//! 2. Within one priority, weighted random selection: records with weight 0
//!    go first in the pool, a running sum is built, a random number in
//!    `0..=sum` picks the first record whose running sum reaches it, and the
//!    pick is removed. Repeat until the pool is empty.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{TransportProtocol, DEFAULT_PORT};
use crate::error::{Result, XmppError};

/// SRV service label for client-to-server streams.
pub const CLIENT_SERVICE: &str = "_xmpp-client";

/// A host/port candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddr {
    /// Host name or IP literal.
    pub host: String,
    /// TCP/UDP port.
    pub port: u16,
}

impl ServerAddr {
    /// Build an address.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
        }
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One DNS SRV record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvRecord {
    /// Lower is preferred.
    pub priority: u16,
    /// Relative share within one priority.
    pub weight: u16,
    /// Target port.
    pub port: u16,
    /// Target host; `.` means the service is not offered.
    pub target: String,
}

impl SrvRecord {
    /// Build a record.
    pub fn new(priority: u16, weight: u16, port: u16, target: &str) -> Self {
        Self {
            priority,
            weight,
            port,
            target: target.to_string(),
        }
    }
}

/// DNS SRV query backend.
pub trait SrvLookup: Send + Sync {
    /// Records for a fully-formed query name such as
    /// `_xmpp-client._tcp.example.com`. An empty list means no records.
    fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>>;
}

/// Produces ordered connection candidates for a domain.
pub trait Resolver: Send + Sync {
    /// Candidates in the order they should be tried.
    fn resolve(
        &self,
        domain: &str,
        service: &str,
        protocol: TransportProtocol,
    ) -> Result<Vec<ServerAddr>>;
}

/// Order SRV records per RFC2782 using `rng` for the weighted draw.
pub fn order_srv_records<R: Rng>(mut records: Vec<SrvRecord>, rng: &mut R) -> Vec<SrvRecord> {
    // Stable sort keeps zero weights at the front of each priority group
    records.sort_by_key(|r| (r.priority, r.weight != 0));

    let mut ordered = Vec::with_capacity(records.len());
    let mut rest = records.as_slice();
    while let Some(first) = rest.first() {
        let split = rest
            .iter()
            .position(|r| r.priority != first.priority)
            .unwrap_or(rest.len());
        let (group, tail) = rest.split_at(split);
        let mut pool = group.to_vec();

        while !pool.is_empty() {
            let total: u32 = pool.iter().map(|r| u32::from(r.weight)).sum();
            let pick = rng.gen_range(0..=total);
            let mut running = 0u32;
            let index = pool
                .iter()
                .position(|r| {
                    running += u32::from(r.weight);
                    running >= pick
                })
                .unwrap_or(pool.len() - 1);
            ordered.push(pool.remove(index));
        }
        rest = tail;
    }
    ordered
}

/// SRV-based resolver with RFC6120 fallback to `domain:5222`.
pub struct SrvResolver<L> {
    lookup: L,
    rng: Mutex<StdRng>,
}

impl<L: SrvLookup> SrvResolver<L> {
    /// Resolver backed by `lookup`, seeded from the OS.
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Resolver with a fixed seed, for reproducible ordering.
    pub fn with_seed(lookup: L, seed: u64) -> Self {
        Self {
            lookup,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl<L: SrvLookup> Resolver for SrvResolver<L> {
    fn resolve(
        &self,
        domain: &str,
        service: &str,
        protocol: TransportProtocol,
    ) -> Result<Vec<ServerAddr>> {
        let name = format!("{service}.{}.{domain}", protocol.srv_label());
        let records = match self.lookup.lookup_srv(&name) {
            Ok(records) => records,
            Err(e) => {
                tracing::debug!(query = %name, error = %e, "SRV lookup failed, falling back");
                Vec::new()
            },
        };

        if records.is_empty() {
            return Ok(vec![ServerAddr::new(domain, DEFAULT_PORT)]);
        }
        if records.len() == 1 && records[0].target == "." {
            return Err(XmppError::Resolve(format!(
                "{domain} does not offer {service}"
            )));
        }

        let ordered = order_srv_records(records, &mut *self.rng.lock());
        tracing::debug!(query = %name, candidates = ordered.len(), "SRV records ordered");
        Ok(ordered
            .into_iter()
            .filter(|r| r.target != ".")
            .map(|r| ServerAddr::new(r.target.trim_end_matches('.'), r.port))
            .collect())
    }
}

/// Resolver that performs no lookups: every domain maps to `domain:5222`,
/// unless an explicit mapping was added.
#[derive(Debug, Default)]
pub struct StaticResolver {
    entries: Vec<(String, Vec<ServerAddr>)>,
}

impl StaticResolver {
    /// Empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: map `domain` to fixed candidates.
    pub fn with_entry(mut self, domain: &str, addrs: Vec<ServerAddr>) -> Self {
        self.entries.push((domain.to_lowercase(), addrs));
        self
    }
}

impl Resolver for StaticResolver {
    fn resolve(
        &self,
        domain: &str,
        _service: &str,
        _protocol: TransportProtocol,
    ) -> Result<Vec<ServerAddr>> {
        let domain_lc = domain.to_lowercase();
        Ok(self
            .entries
            .iter()
            .find(|(d, _)| *d == domain_lc)
            .map_or_else(
                || vec![ServerAddr::new(domain, DEFAULT_PORT)],
                |(_, addrs)| addrs.clone(),
            ))
    }
}

impl<T: Resolver + ?Sized> Resolver for Arc<T> {
    fn resolve(
        &self,
        domain: &str,
        service: &str,
        protocol: TransportProtocol,
    ) -> Result<Vec<ServerAddr>> {
        (**self).resolve(domain, service, protocol)
    }
}

#[cfg(test)]
mod tests {
    use rand_chacha::ChaCha8Rng;

    use super::*;

    struct FixedLookup(Vec<SrvRecord>);

    impl SrvLookup for FixedLookup {
        fn lookup_srv(&self, name: &str) -> Result<Vec<SrvRecord>> {
            assert_eq!(name, "_xmpp-client._tcp.example.com");
            Ok(self.0.clone())
        }
    }

    struct FailingLookup;

    impl SrvLookup for FailingLookup {
        fn lookup_srv(&self, _name: &str) -> Result<Vec<SrvRecord>> {
            Err(XmppError::Resolve("NXDOMAIN".to_string()))
        }
    }

    #[test]
    fn test_priority_ordering() {
        let records = vec![
            SrvRecord::new(20, 0, 5222, "c.example.com"),
            SrvRecord::new(10, 0, 5222, "a.example.com"),
            SrvRecord::new(15, 0, 5222, "b.example.com"),
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let ordered = order_srv_records(records, &mut rng);
        let targets: Vec<_> = ordered.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(targets, vec!["a.example.com", "b.example.com", "c.example.com"]);
    }

    #[test]
    fn test_weighted_selection_keeps_all_records() {
        let records = vec![
            SrvRecord::new(10, 60, 5222, "heavy"),
            SrvRecord::new(10, 0, 5222, "zero"),
            SrvRecord::new(10, 40, 5222, "light"),
            SrvRecord::new(5, 1, 5222, "first"),
        ];
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let ordered = order_srv_records(records, &mut rng);
        assert_eq!(ordered.len(), 4);
        assert_eq!(ordered[0].target, "first");
        let mut rest: Vec<_> = ordered[1..].iter().map(|r| r.target.clone()).collect();
        rest.sort();
        assert_eq!(rest, vec!["heavy", "light", "zero"]);
    }

    #[test]
    fn test_weight_biases_first_pick() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut heavy_first = 0;
        for _ in 0..1000 {
            let records = vec![
                SrvRecord::new(0, 90, 5222, "heavy"),
                SrvRecord::new(0, 10, 5222, "light"),
            ];
            if order_srv_records(records, &mut rng)[0].target == "heavy" {
                heavy_first += 1;
            }
        }
        assert!(heavy_first > 800, "heavy picked first {heavy_first}/1000 times");
    }

    #[test]
    fn test_resolver_falls_back_without_records() {
        let resolver = SrvResolver::with_seed(FailingLookup, 0);
        let addrs = resolver
            .resolve("example.com", CLIENT_SERVICE, TransportProtocol::Tcp)
            .unwrap();
        assert_eq!(addrs, vec![ServerAddr::new("example.com", 5222)]);
    }

    #[test]
    fn test_resolver_service_not_offered() {
        let resolver = SrvResolver::with_seed(FixedLookup(vec![SrvRecord::new(0, 0, 0, ".")]), 0);
        assert!(matches!(
            resolver.resolve("example.com", CLIENT_SERVICE, TransportProtocol::Tcp),
            Err(XmppError::Resolve(_))
        ));
    }

    #[test]
    fn test_resolver_strips_trailing_dot() {
        let resolver = SrvResolver::with_seed(
            FixedLookup(vec![SrvRecord::new(0, 0, 5269, "xmpp.example.com.")]),
            0,
        );
        let addrs = resolver
            .resolve("example.com", CLIENT_SERVICE, TransportProtocol::Tcp)
            .unwrap();
        assert_eq!(addrs, vec![ServerAddr::new("xmpp.example.com", 5269)]);
    }

    #[test]
    fn test_static_resolver() {
        let resolver = StaticResolver::new()
            .with_entry("Example.com", vec![ServerAddr::new("10.0.0.1", 5222)]);
        assert_eq!(
            resolver
                .resolve("example.com", CLIENT_SERVICE, TransportProtocol::Tcp)
                .unwrap(),
            vec![ServerAddr::new("10.0.0.1", 5222)]
        );
        assert_eq!(
            resolver
                .resolve("other.org", CLIENT_SERVICE, TransportProtocol::Tcp)
                .unwrap(),
            vec![ServerAddr::new("other.org", 5222)]
        );
    }
}
