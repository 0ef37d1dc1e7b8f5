//! Configuration management for Turnstile.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::middleware::DEFAULT_IDENTITY_HEADER;
use crate::ratelimit::{Limit, Rate, TokenBucketBuilder};

/// Main configuration for a Turnstile deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Which limiter to run and how it is configured
    #[serde(default)]
    pub limiter: LimiterConfig,
}

impl Default for TurnstileConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            limiter: LimiterConfig::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Header carrying the caller identity
    #[serde(default = "default_identity_header")]
    pub identity_header: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            identity_header: default_identity_header(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_identity_header() -> String {
    DEFAULT_IDENTITY_HEADER.to_string()
}

/// A rate as written in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateConfig {
    /// Number of units
    pub value: u32,
    /// Interval in milliseconds
    pub interval_ms: u64,
}

impl From<RateConfig> for Rate {
    fn from(config: RateConfig) -> Self {
        Rate::new(config.value, Duration::from_millis(config.interval_ms))
    }
}

/// A token bucket route limit as written in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitConfig {
    /// Maximum outstanding quota
    pub capacity: RateConfig,
    /// Amount restored per refill interval
    pub refill: RateConfig,
}

impl From<LimitConfig> for Limit {
    fn from(config: LimitConfig) -> Self {
        Limit::new(config.capacity.into(), config.refill.into())
    }
}

/// Token bucket configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenBucketConfig {
    /// Registered identities
    #[serde(default)]
    pub users: Vec<String>,

    /// Route key to limit
    #[serde(default)]
    pub routes: HashMap<String, LimitConfig>,
}

impl TokenBucketConfig {
    /// A builder preloaded with these users and routes.
    pub fn into_builder(self) -> TokenBucketBuilder {
        let builder = self
            .routes
            .into_iter()
            .fold(TokenBucketBuilder::new(), |builder, (route, limit)| {
                builder.set_limit(route, limit.into())
            });

        self.users
            .into_iter()
            .fold(builder, |builder, user| builder.register_user(user))
    }
}

/// The limiter to put in front of the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum LimiterConfig {
    /// One global slot pool
    LeakingBucket {
        /// Capacity and refill period of the pool
        rate: RateConfig,
    },
    /// Per-identity, per-route quotas
    TokenBucket(TokenBucketConfig),
}

impl Default for LimiterConfig {
    fn default() -> Self {
        LimiterConfig::LeakingBucket {
            rate: RateConfig {
                value: 2,
                interval_ms: 60_000,
            },
        }
    }
}

impl TurnstileConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse configuration: {}", e)))
    }
}
