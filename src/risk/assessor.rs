//! Request-origin risk scoring
//!
//! Combines three independent signals into a 0-100 score:
//! 1. CIDR range membership (VPN / Tor / datacenter)
//! 2. Proxy-revealing and automation-revealing headers
//! 3. Hosting-provider prefix patterns
//!
//! The assessor never fails: any lookup or parse error degrades to the safe
//! default record (all flags false, score 0).

use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{sanitize_for_logging, RiskConfig};
use crate::risk::{MemoryOriginCache, OriginCache, OriginClassifier, StaticRangeClassifier};

/// Score at which an origin is classified as VPN regardless of range match
pub const VPN_SCORE_THRESHOLD: u8 = 50;

const VPN_RANGE_SCORE: u32 = 50;
const TOR_RANGE_SCORE: u32 = 60;
const DATACENTER_SCORE: u32 = 30;
const PROXY_HEADER_SCORE: u32 = 10;
const STRONG_PROXY_HEADER_SCORE: u32 = 20;
const MISSING_USER_AGENT_SCORE: u32 = 15;
const AUTOMATION_USER_AGENT_SCORE: u32 = 25;

/// Trusted edge-proxy header, consulted first
const EDGE_CLIENT_HEADER: &str = "cf-connecting-ip";

/// Classification of a request origin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginRecord {
    pub address: String,
    pub is_vpn: bool,
    pub is_proxy: bool,
    pub is_tor: bool,
    pub is_datacenter: bool,
    pub risk_score: u8,
    pub provider: Option<String>,
    pub cached_at: DateTime<Utc>,
}

impl OriginRecord {
    /// All flags false, score 0
    pub fn safe_default(address: &str) -> Self {
        Self {
            address: address.to_string(),
            is_vpn: false,
            is_proxy: false,
            is_tor: false,
            is_datacenter: false,
            risk_score: 0,
            provider: None,
            cached_at: Utc::now(),
        }
    }

    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_score(self.risk_score)
    }
}

/// Coarse bucket of a risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Safe,
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            75..=u8::MAX => RiskLevel::High,
            50..=74 => RiskLevel::Medium,
            25..=49 => RiskLevel::Low,
            _ => RiskLevel::Safe,
        }
    }
}

/// Header heuristics
#[derive(Debug, Clone)]
pub struct HeaderRules {
    /// Each present header adds a small contribution
    pub proxy_headers: Vec<&'static str>,
    /// Headers that positively identify a proxy hop
    pub strong_proxy_headers: Vec<&'static str>,
    /// Lowercase user-agent fragments of automation tools
    pub automation_agents: Vec<&'static str>,
}

impl Default for HeaderRules {
    fn default() -> Self {
        Self {
            proxy_headers: vec![
                "via",
                "x-forwarded-for",
                "x-forwarded-host",
                "x-forwarded-proto",
                "forwarded",
                "x-real-ip",
                "x-proxy-id",
                "proxy-connection",
            ],
            strong_proxy_headers: vec!["via", "proxy-connection"],
            automation_agents: vec!["bot", "crawler", "spider", "curl", "wget", "python", "java"],
        }
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct HeaderVerdict {
    score: u32,
    is_proxy: bool,
}

impl HeaderRules {
    fn analyze(&self, headers: &HeaderMap) -> HeaderVerdict {
        let mut verdict = HeaderVerdict::default();

        for name in &self.proxy_headers {
            if headers.contains_key(*name) {
                verdict.score += PROXY_HEADER_SCORE;
                if self.strong_proxy_headers.contains(name) {
                    verdict.is_proxy = true;
                    verdict.score += STRONG_PROXY_HEADER_SCORE;
                }
            }
        }

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|ua| !ua.is_empty());

        match user_agent {
            None => verdict.score += MISSING_USER_AGENT_SCORE,
            Some(ua) => {
                let ua = ua.to_lowercase();
                if self.automation_agents.iter().any(|needle| ua.contains(needle)) {
                    verdict.score += AUTOMATION_USER_AGENT_SCORE;
                }
            }
        }

        verdict
    }
}

/// Where the client address came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAddress {
    Parsed(IpAddr),
    /// A header was present but did not hold an address
    Unparseable(String),
    Missing,
}

/// Resolves the client address from the prioritized header chain.
///
/// Order: trusted edge header, first hop of `x-forwarded-for`, `x-real-ip`,
/// then the direct peer address. The first present source wins.
pub fn client_address(headers: &HeaderMap, peer: Option<IpAddr>) -> ClientAddress {
    let chain = [
        headers
            .get(EDGE_CLIENT_HEADER)
            .map(|v| v.to_str().unwrap_or_default().trim().to_string()),
        headers.get("x-forwarded-for").map(|v| {
            v.to_str()
                .unwrap_or_default()
                .split(',')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string()
        }),
        headers
            .get("x-real-ip")
            .map(|v| v.to_str().unwrap_or_default().trim().to_string()),
    ];

    if let Some(raw) = chain.into_iter().flatten().next() {
        return match parse_address(&raw) {
            Some(ip) => ClientAddress::Parsed(ip),
            None => ClientAddress::Unparseable(raw),
        };
    }

    match peer {
        Some(ip) => ClientAddress::Parsed(canonical(ip)),
        None => ClientAddress::Missing,
    }
}

fn parse_address(raw: &str) -> Option<IpAddr> {
    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|s| s.ip()))
        .map(canonical)
}

/// Unwraps IPv4-mapped IPv6 addresses so range tables match them.
fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
        v4 => v4,
    }
}

/// Private, loopback, unspecified and link-local addresses
pub fn is_non_routable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_unspecified() || v4.is_link_local()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00 // unique local
                || (first & 0xffc0) == 0xfe80 // link local
        }
    }
}

/// Scores request origins, caching classifications per address
pub struct RiskAssessor {
    classifier: Arc<dyn OriginClassifier>,
    cache: Arc<dyn OriginCache>,
    rules: HeaderRules,
    ttl: Duration,
}

impl RiskAssessor {
    /// Built-in range table, in-memory cache
    pub fn new(ttl: Duration) -> Self {
        Self {
            classifier: Arc::new(StaticRangeClassifier::builtin()),
            cache: Arc::new(MemoryOriginCache::new()),
            rules: HeaderRules::default(),
            ttl,
        }
    }

    pub fn from_config(config: &RiskConfig) -> Self {
        let classifier =
            StaticRangeClassifier::builtin().with_ranges(config.extra_ranges.iter().cloned());
        Self::new(Duration::seconds(config.cache_ttl_secs as i64))
            .with_classifier(Arc::new(classifier))
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn OriginClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn OriginCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn cached_origins(&self) -> usize {
        self.cache.len()
    }

    /// Forget every cached classification; returns how many were dropped
    pub fn clear_cache(&self) -> usize {
        let cleared = self.cache.len();
        self.cache.clear();
        cleared
    }

    /// Assess the origin of a request now
    pub fn assess(&self, peer: Option<IpAddr>, headers: &HeaderMap) -> OriginRecord {
        self.assess_at(peer, headers, Utc::now())
    }

    /// Assess with an explicit clock, consulting the cache first
    pub fn assess_at(
        &self,
        peer: Option<IpAddr>,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> OriginRecord {
        self.evaluate(peer, headers, now, true)
    }

    /// Assess without reading the cache; the fresh result still replaces it
    pub fn assess_uncached(
        &self,
        peer: Option<IpAddr>,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> OriginRecord {
        self.evaluate(peer, headers, now, false)
    }

    /// Housekeeping: drop stale cache entries
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        self.cache.purge_expired(now, self.ttl)
    }

    fn evaluate(
        &self,
        peer: Option<IpAddr>,
        headers: &HeaderMap,
        now: DateTime<Utc>,
        use_cache: bool,
    ) -> OriginRecord {
        let ip = match client_address(headers, peer) {
            ClientAddress::Parsed(ip) => ip,
            ClientAddress::Unparseable(raw) => {
                debug!(raw = %sanitize_for_logging(&raw), "Unparseable client address, using safe default");
                return stamped(OriginRecord::safe_default(&raw), now);
            }
            ClientAddress::Missing => {
                return stamped(OriginRecord::safe_default("unknown"), now);
            }
        };
        let address = ip.to_string();

        if is_non_routable(ip) {
            return stamped(OriginRecord::safe_default(&address), now);
        }

        if use_cache {
            if let Some(hit) = self.cache.get(&address, now, self.ttl) {
                return hit;
            }
        }

        let record = match self.classifier.classify(ip) {
            Ok(classification) => self.score(&address, classification, headers, now),
            Err(e) => {
                warn!(error = %e, "Origin classification failed, using safe default");
                stamped(OriginRecord::safe_default(&address), now)
            }
        };

        self.cache.insert(record.clone());
        record
    }

    fn score(
        &self,
        address: &str,
        classification: crate::risk::Classification,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> OriginRecord {
        let mut score = 0u32;

        if classification.vpn_range {
            score += VPN_RANGE_SCORE;
        }
        if classification.tor_range {
            score += TOR_RANGE_SCORE;
        }
        if classification.datacenter_range {
            score += DATACENTER_SCORE;
        }

        let verdict = self.rules.analyze(headers);
        score += verdict.score;

        let hosted = classification.provider.is_some();
        if hosted && !classification.datacenter_range {
            score += DATACENTER_SCORE;
        }

        let risk_score = score.min(100) as u8;

        OriginRecord {
            address: address.to_string(),
            is_vpn: classification.vpn_range || risk_score >= VPN_SCORE_THRESHOLD,
            is_proxy: verdict.is_proxy,
            is_tor: classification.tor_range,
            is_datacenter: classification.datacenter_range || hosted,
            risk_score,
            provider: classification.provider.or(classification.range_label),
            cached_at: now,
        }
    }
}

fn stamped(mut record: OriginRecord, now: DateTime<Utc>) -> OriginRecord {
    record.cached_at = now;
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn browser_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "user-agent",
            HeaderValue::from_static("Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0"),
        );
        headers
    }

    fn peer(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    #[test]
    fn test_risk_levels() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_score(24), RiskLevel::Safe);
        assert_eq!(RiskLevel::from_score(25), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(50), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(74), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(75), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::High);
    }

    #[test]
    fn test_header_chain_priority() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("81.2.69.3"));
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("81.2.69.2, 10.0.0.1"),
        );
        assert_eq!(
            client_address(&headers, peer("81.2.69.9")),
            ClientAddress::Parsed("81.2.69.2".parse().unwrap())
        );

        headers.insert("cf-connecting-ip", HeaderValue::from_static("81.2.69.1"));
        assert_eq!(
            client_address(&headers, peer("81.2.69.9")),
            ClientAddress::Parsed("81.2.69.1".parse().unwrap())
        );

        assert_eq!(
            client_address(&HeaderMap::new(), peer("81.2.69.9")),
            ClientAddress::Parsed("81.2.69.9".parse().unwrap())
        );
        assert_eq!(client_address(&HeaderMap::new(), None), ClientAddress::Missing);
    }

    #[test]
    fn test_forwarded_address_with_port_and_mapped_v6() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("81.2.69.4:5123"));
        assert_eq!(
            client_address(&headers, None),
            ClientAddress::Parsed("81.2.69.4".parse().unwrap())
        );

        assert_eq!(
            client_address(&HeaderMap::new(), peer("::ffff:81.2.69.5")),
            ClientAddress::Parsed("81.2.69.5".parse().unwrap())
        );
    }

    #[test]
    fn test_non_routable_ranges() {
        for addr in ["127.0.0.1", "10.1.2.3", "192.168.0.10", "172.16.5.5", "0.0.0.0", "169.254.1.1", "::1", "fd00::1", "fe80::1"] {
            assert!(is_non_routable(addr.parse().unwrap()), "{addr}");
        }
        assert!(!is_non_routable("81.2.69.142".parse().unwrap()));
        assert!(!is_non_routable("2001:db8::1".parse().unwrap()));
    }

    #[test]
    fn test_header_analysis() {
        let rules = HeaderRules::default();

        assert_eq!(rules.analyze(&browser_headers()), HeaderVerdict::default());

        let missing_ua = rules.analyze(&HeaderMap::new());
        assert_eq!(missing_ua.score, 15);

        let mut curl = HeaderMap::new();
        curl.insert("user-agent", HeaderValue::from_static("curl/8.5.0"));
        assert_eq!(rules.analyze(&curl).score, 25);

        let mut via = browser_headers();
        via.insert("via", HeaderValue::from_static("1.1 squid"));
        let verdict = rules.analyze(&via);
        assert!(verdict.is_proxy);
        assert_eq!(verdict.score, 30);
    }

    #[test]
    fn test_clean_residential_address_scores_zero() {
        let assessor = RiskAssessor::new(Duration::hours(24));
        let record = assessor.assess(peer("81.2.69.142"), &browser_headers());
        assert_eq!(record.risk_score, 0);
        assert!(!(record.is_vpn || record.is_proxy || record.is_tor));
        assert_eq!(record.risk_level(), RiskLevel::Safe);
    }

    #[test]
    fn test_datacenter_counted_once() {
        let assessor = RiskAssessor::new(Duration::hours(24));
        let record = assessor.assess(peer("34.120.0.1"), &browser_headers());
        assert!(record.is_datacenter);
        assert_eq!(record.provider.as_deref(), Some("Google Cloud"));
        assert_eq!(record.risk_score, 30);
        assert!(!record.is_vpn);
    }

    #[test]
    fn test_hosting_pattern_without_range_adds_datacenter_score() {
        let assessor = RiskAssessor::new(Duration::hours(24));
        // Inside the NordVPN /17 range and the NordVPN hosting prefix
        let record = assessor.assess(peer("104.200.200.1"), &browser_headers());
        assert!(record.is_vpn);
        assert!(record.is_datacenter);
        assert_eq!(record.risk_score, 80);
        assert_eq!(record.provider.as_deref(), Some("NordVPN"));
    }

    #[test]
    fn test_tor_exit_is_vpn_by_score() {
        let assessor = RiskAssessor::new(Duration::hours(24));
        let record = assessor.assess(peer("185.220.100.40"), &browser_headers());
        assert!(record.is_tor);
        assert!(record.is_vpn);
        assert_eq!(record.risk_score, 60);
    }

    #[test]
    fn test_clear_cache_forces_reclassification() {
        let assessor = RiskAssessor::new(Duration::hours(24));
        assessor.assess(peer("81.2.69.142"), &browser_headers());
        assessor.assess(peer("185.220.100.40"), &browser_headers());
        assert_eq!(assessor.cached_origins(), 2);

        assert_eq!(assessor.clear_cache(), 2);
        assert_eq!(assessor.cached_origins(), 0);
        assert_eq!(assessor.clear_cache(), 0);
    }

    #[test]
    fn test_score_clamped() {
        let assessor = RiskAssessor::new(Duration::hours(24));
        let mut headers = HeaderMap::new();
        for name in HeaderRules::default().proxy_headers {
            headers.insert(name, HeaderValue::from_static("185.220.100.40"));
        }
        headers.remove("cf-connecting-ip");
        let record = assessor.assess(None, &headers);
        assert_eq!(record.risk_score, 100);
        assert_eq!(record.risk_level(), RiskLevel::High);
    }

    #[test]
    fn test_unparseable_address_is_safe_default() {
        let assessor = RiskAssessor::new(Duration::hours(24));
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        let record = assessor.assess(peer("185.220.100.40"), &headers);
        assert_eq!(record.risk_score, 0);
        assert!(!(record.is_vpn || record.is_proxy || record.is_tor));
        assert_eq!(assessor.cached_origins(), 0);
    }
}
