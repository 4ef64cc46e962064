//! Address classification tables.
//!
//! [`OriginClassifier`] is the seam for swapping the static CIDR tables for a
//! live threat-intelligence feed without touching the guard or ledger.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;
use thiserror::Error;

/// Category of a known address range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeCategory {
    Vpn,
    Tor,
    Datacenter,
}

impl FromStr for RangeCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "vpn" => Ok(RangeCategory::Vpn),
            "tor" => Ok(RangeCategory::Tor),
            "datacenter" | "dc" | "hosting" => Ok(RangeCategory::Datacenter),
            other => Err(anyhow::anyhow!("Unknown range category: {}", other)),
        }
    }
}

/// One entry of the range table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeEntry {
    pub network: IpNet,
    pub category: RangeCategory,
    pub label: Option<String>,
}

impl RangeEntry {
    fn new(cidr: &str, category: RangeCategory, label: Option<&str>) -> Option<Self> {
        let network = cidr.parse().ok()?;
        Some(Self {
            network,
            category,
            label: label.map(str::to_string),
        })
    }
}

/// Address prefix owned by a known hosting provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostingPattern {
    pub prefix: IpNet,
    pub provider: String,
}

/// Raw classification of an address, before scoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub vpn_range: bool,
    pub tor_range: bool,
    pub datacenter_range: bool,
    /// Label of the first matching range, if it carried one
    pub range_label: Option<String>,
    /// Hosting provider matched by prefix pattern
    pub provider: Option<String>,
}

#[derive(Debug, Error)]
#[error("origin classification failed: {0}")]
pub struct ClassifyError(pub String);

/// Classifies an address against known anonymizer and hosting ranges
pub trait OriginClassifier: Send + Sync {
    fn classify(&self, address: IpAddr) -> Result<Classification, ClassifyError>;
}

const VPN_RANGES: &[(&str, &str)] = &[
    ("104.200.128.0/17", "NordVPN"),
    ("185.201.8.0/22", "CyberGhost"),
    ("104.254.0.0/16", "ExpressVPN"),
    ("178.236.205.0/24", "ProtonVPN"),
    ("195.202.0.0/16", "Surfshark"),
];

const TOR_RANGES: &[&str] = &["185.220.100.0/24", "185.220.101.0/24"];

const DATACENTER_RANGES: &[(&str, &str)] = &[
    ("13.0.0.0/8", "AWS"),
    ("34.0.0.0/8", "Google Cloud"),
    ("20.0.0.0/11", "Azure"),
    ("104.16.0.0/12", "Cloudflare"),
];

const HOSTING_PREFIXES: &[(&str, &str)] = &[
    ("13.0.0.0/8", "AWS"),
    ("34.0.0.0/8", "Google Cloud"),
    ("20.0.0.0/8", "Azure"),
    ("104.16.0.0/16", "Cloudflare"),
    ("104.200.0.0/16", "NordVPN"),
    ("185.201.0.0/16", "CyberGhost"),
];

/// Static CIDR table classifier
#[derive(Debug, Clone)]
pub struct StaticRangeClassifier {
    ranges: Vec<RangeEntry>,
    hosting: Vec<HostingPattern>,
}

impl Default for StaticRangeClassifier {
    fn default() -> Self {
        Self::builtin()
    }
}

impl StaticRangeClassifier {
    /// Empty table; nothing matches
    pub fn empty() -> Self {
        Self {
            ranges: Vec::new(),
            hosting: Vec::new(),
        }
    }

    /// Built-in table of well-known VPN, Tor and cloud ranges
    pub fn builtin() -> Self {
        let mut ranges = Vec::new();
        ranges.extend(
            VPN_RANGES
                .iter()
                .filter_map(|(cidr, label)| RangeEntry::new(cidr, RangeCategory::Vpn, Some(label))),
        );
        ranges.extend(
            TOR_RANGES
                .iter()
                .filter_map(|cidr| RangeEntry::new(cidr, RangeCategory::Tor, None)),
        );
        ranges.extend(DATACENTER_RANGES.iter().filter_map(|(cidr, label)| {
            RangeEntry::new(cidr, RangeCategory::Datacenter, Some(label))
        }));

        let hosting = HOSTING_PREFIXES
            .iter()
            .filter_map(|(cidr, provider)| {
                Some(HostingPattern {
                    prefix: cidr.parse().ok()?,
                    provider: provider.to_string(),
                })
            })
            .collect();

        Self { ranges, hosting }
    }

    pub fn with_ranges(mut self, extra: impl IntoIterator<Item = RangeEntry>) -> Self {
        self.ranges.extend(extra);
        self
    }

    pub fn ranges(&self) -> &[RangeEntry] {
        &self.ranges
    }

    pub fn hosting_patterns(&self) -> &[HostingPattern] {
        &self.hosting
    }
}

impl OriginClassifier for StaticRangeClassifier {
    fn classify(&self, address: IpAddr) -> Result<Classification, ClassifyError> {
        let mut result = Classification::default();

        for entry in self.ranges.iter().filter(|e| e.network.contains(&address)) {
            match entry.category {
                RangeCategory::Vpn => result.vpn_range = true,
                RangeCategory::Tor => result.tor_range = true,
                RangeCategory::Datacenter => result.datacenter_range = true,
            }
            if result.range_label.is_none() {
                result.range_label = entry.label.clone();
            }
        }

        result.provider = self
            .hosting
            .iter()
            .find(|p| p.prefix.contains(&address))
            .map(|p| p.provider.clone());

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_builtin_table_parses_every_entry() {
        let classifier = StaticRangeClassifier::builtin();
        assert_eq!(
            classifier.ranges().len(),
            VPN_RANGES.len() + TOR_RANGES.len() + DATACENTER_RANGES.len()
        );
        assert_eq!(classifier.hosting_patterns().len(), HOSTING_PREFIXES.len());
    }

    #[test]
    fn test_vpn_range_match() {
        let c = StaticRangeClassifier::builtin()
            .classify(ip("104.254.10.20"))
            .unwrap();
        assert!(c.vpn_range);
        assert!(!c.tor_range);
        assert_eq!(c.range_label.as_deref(), Some("ExpressVPN"));
        assert!(c.provider.is_none());
    }

    #[test]
    fn test_tor_range_match() {
        let c = StaticRangeClassifier::builtin()
            .classify(ip("185.220.101.7"))
            .unwrap();
        assert!(c.tor_range);
        assert!(!c.vpn_range);
    }

    #[test]
    fn test_datacenter_and_hosting_match() {
        let c = StaticRangeClassifier::builtin()
            .classify(ip("13.37.1.1"))
            .unwrap();
        assert!(c.datacenter_range);
        assert_eq!(c.provider.as_deref(), Some("AWS"));
    }

    #[test]
    fn test_unlisted_address() {
        let c = StaticRangeClassifier::builtin()
            .classify(ip("81.2.69.142"))
            .unwrap();
        assert_eq!(c, Classification::default());
    }

    #[test]
    fn test_extra_ranges() {
        let extra = RangeEntry::new("198.51.100.0/24", RangeCategory::Vpn, Some("TestVPN")).unwrap();
        let c = StaticRangeClassifier::empty()
            .with_ranges([extra])
            .classify(ip("198.51.100.9"))
            .unwrap();
        assert!(c.vpn_range);
        assert_eq!(c.range_label.as_deref(), Some("TestVPN"));
    }
}
