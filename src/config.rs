use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::risk::{RangeCategory, RangeEntry};

/// Configuration for the reward gate service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Per-identity activity guard
    pub guard: GuardConfig,
    /// Origin risk assessment
    pub risk: RiskConfig,
    /// Point awards
    pub rewards: RewardsConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host to bind to
    pub host: String,
    /// Server port to bind to
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Key required on admin endpoints; admin routes are disabled when unset
    pub admin_api_key: Option<String>,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
}

/// Thresholds for the per-identity activity guard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Gaps below this raise suspicion
    pub min_action_interval_ms: u64,
    /// Gaps above this let suspicion decay
    pub decay_interval_ms: u64,
    /// Suspicion above this rejects the action
    pub suspicion_threshold: u32,
    /// Accepted actions allowed in the trailing window
    pub max_actions_per_minute: usize,
    /// Length of the trailing window
    pub window_secs: u64,
    /// Identities idle this long are evicted by housekeeping
    pub idle_eviction_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_action_interval_ms: 50,
            decay_interval_ms: 200,
            suspicion_threshold: 15,
            max_actions_per_minute: 600,
            window_secs: 60,
            idle_eviction_secs: 30 * 60,
        }
    }
}

/// What the gateway does with a high-risk origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMode {
    /// Log and let the action continue
    Warn,
    /// Reject with `origin_blocked`
    Block,
}

impl FromStr for RiskMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "warn" | "false" => Ok(RiskMode::Warn),
            "block" | "true" => Ok(RiskMode::Block),
            other => Err(anyhow::anyhow!("Unknown risk mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub mode: RiskMode,
    /// Scores at or above this are high risk (0-100)
    pub high_risk_threshold: u8,
    /// Origin classification cache TTL
    pub cache_ttl_secs: u64,
    /// Ranges appended to the built-in table
    pub extra_ranges: Vec<RangeEntry>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            mode: RiskMode::Warn,
            high_risk_threshold: 50,
            cache_ttl_secs: 24 * 60 * 60,
            extra_ranges: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    pub points_per_click: i64,
    pub points_per_ad_view: i64,
    /// Milestone every N actions of the same kind
    pub milestone_interval: u64,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            points_per_click: 10,
            points_per_ad_view: 25,
            milestone_interval: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,
    /// Enable PostgreSQL (if false, uses in-memory fallback)
    pub postgres_enabled: bool,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: "postgresql://localhost:5432/reward_gate".to_string(),
            postgres_enabled: false,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug)
    pub level: String,
    /// Mask identities and addresses in logs
    pub sanitize_logs: bool,
    /// Enable request/response logging
    pub log_requests: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            security: SecurityConfig {
                admin_api_key: None,
                max_request_size: 64 * 1024,
            },
            guard: GuardConfig::default(),
            risk: RiskConfig::default(),
            rewards: RewardsConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                sanitize_logs: true,
                log_requests: false,
            },
        }
    }
}

/// Parses an optional environment variable into `target`.
fn env_override<T>(name: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Ok(raw) = env::var(name) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("Invalid {} value", name))?;
    }
    Ok(())
}

impl GateConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Server configuration
        if let Ok(host) = env::var("REWARD_HOST") {
            config.server.host = host;
        }
        env_override("REWARD_PORT", &mut config.server.port)?;

        // Security configuration
        config.security.admin_api_key = env::var("REWARD_ADMIN_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());
        env_override("REWARD_MAX_REQUEST_SIZE", &mut config.security.max_request_size)?;

        // Guard configuration
        env_override(
            "REWARD_MIN_ACTION_INTERVAL_MS",
            &mut config.guard.min_action_interval_ms,
        )?;
        env_override("REWARD_DECAY_INTERVAL_MS", &mut config.guard.decay_interval_ms)?;
        env_override(
            "REWARD_SUSPICION_THRESHOLD",
            &mut config.guard.suspicion_threshold,
        )?;
        env_override(
            "REWARD_MAX_ACTIONS_PER_MINUTE",
            &mut config.guard.max_actions_per_minute,
        )?;
        env_override("REWARD_IDLE_EVICTION_SECS", &mut config.guard.idle_eviction_secs)?;

        // Risk configuration
        env_override("REWARD_RISK_MODE", &mut config.risk.mode)?;
        env_override(
            "REWARD_HIGH_RISK_THRESHOLD",
            &mut config.risk.high_risk_threshold,
        )?;
        env_override("REWARD_RISK_CACHE_TTL_SECS", &mut config.risk.cache_ttl_secs)?;
        if let Ok(csv) = env::var("REWARD_RISK_EXTRA_RANGES") {
            config.risk.extra_ranges =
                parse_range_list(&csv).context("Invalid REWARD_RISK_EXTRA_RANGES value")?;
        }

        // Reward configuration
        env_override("REWARD_POINTS_PER_CLICK", &mut config.rewards.points_per_click)?;
        env_override(
            "REWARD_POINTS_PER_AD_VIEW",
            &mut config.rewards.points_per_ad_view,
        )?;
        env_override(
            "REWARD_MILESTONE_INTERVAL",
            &mut config.rewards.milestone_interval,
        )?;

        // Database configuration
        if let Ok(url) = env::var("REWARD_POSTGRES_URL") {
            config.database.postgres_url = url;
        }
        env_override("REWARD_POSTGRES_ENABLED", &mut config.database.postgres_enabled)?;
        env_override(
            "REWARD_POSTGRES_MAX_CONNECTIONS",
            &mut config.database.max_connections,
        )?;

        // Logging configuration
        if let Ok(level) = env::var("REWARD_LOG_LEVEL") {
            config.logging.level = level;
        }
        env_override("REWARD_SANITIZE_LOGS", &mut config.logging.sanitize_logs)?;
        env_override("REWARD_LOG_REQUESTS", &mut config.logging.log_requests)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(anyhow::anyhow!("Server host cannot be empty"));
        }

        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port must be non-zero"));
        }

        if self.guard.min_action_interval_ms == 0 {
            return Err(anyhow::anyhow!("Minimum action interval must be non-zero"));
        }

        if self.guard.decay_interval_ms < self.guard.min_action_interval_ms {
            return Err(anyhow::anyhow!(
                "Decay interval ({}ms) cannot be shorter than the minimum action interval ({}ms)",
                self.guard.decay_interval_ms,
                self.guard.min_action_interval_ms
            ));
        }

        if self.guard.max_actions_per_minute == 0 {
            return Err(anyhow::anyhow!("Per-minute action cap must be non-zero"));
        }

        if self.guard.window_secs == 0 {
            return Err(anyhow::anyhow!("Guard window must be non-zero"));
        }

        if self.risk.high_risk_threshold > 100 {
            return Err(anyhow::anyhow!(
                "High-risk threshold must be within 0-100, got {}",
                self.risk.high_risk_threshold
            ));
        }

        if self.risk.cache_ttl_secs == 0 {
            return Err(anyhow::anyhow!("Origin cache TTL must be non-zero"));
        }

        if self.rewards.points_per_click <= 0 || self.rewards.points_per_ad_view <= 0 {
            return Err(anyhow::anyhow!("Points per action must be positive"));
        }

        if self.rewards.milestone_interval == 0 {
            return Err(anyhow::anyhow!("Milestone interval must be non-zero"));
        }

        if let Some(key) = &self.security.admin_api_key {
            if key.len() < 32 {
                return Err(anyhow::anyhow!(
                    "Admin API key is too short (minimum 32 characters for security)"
                ));
            }
        }

        Ok(())
    }
}

/// Parses `CIDR=category:label` entries separated by commas.
///
/// Example: `"198.51.100.0/24=vpn:ExampleVPN,203.0.113.0/24=datacenter"`
pub fn parse_range_list(csv: &str) -> Result<Vec<RangeEntry>> {
    let mut entries = Vec::new();

    for item in csv.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (cidr, rest) = item
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Missing category in range entry: {}", item))?;

        let (category, label) = match rest.split_once(':') {
            Some((category, label)) => (category, Some(label.trim().to_string())),
            None => (rest, None),
        };

        let network = cidr
            .trim()
            .parse()
            .with_context(|| format!("Invalid CIDR: {}", cidr))?;
        let category: RangeCategory = category.parse()?;

        entries.push(RangeEntry {
            network,
            category,
            label: label.filter(|l| !l.is_empty()),
        });
    }

    Ok(entries)
}

/// Sanitize identities and addresses for logging
pub fn sanitize_for_logging(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
