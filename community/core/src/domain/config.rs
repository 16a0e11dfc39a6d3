// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Community Service Configuration
//!
//! Tunables for the coordinator, cache, manager locator and membership
//! reconciler. Loaded from YAML; every field has a default so an empty
//! document is a valid configuration.
//!
//! ```yaml
//! cache_expiration_ms: 600000        # -1 disables expiry
//! verify_memberships: true
//! verify_memberships_interval: 1m
//! find_manager_retry_delay: 5s
//! create_retry_delay: 1s
//! naming_wait: 2s
//! request_timeout_ms: -1             # -1 forever, 0 single attempt
//! ```
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Typed, validated tunables with file and environment overrides

use super::request::RequestTimeout;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CACHE_EXPIRATION_MS: &str = "COMMUNITY_CACHE_EXPIRATION_MS";
pub const ENV_VERIFY_INTERVAL_MS: &str = "COMMUNITY_VERIFY_MEMBERSHIPS_INTERVAL_MS";

/// Lifetime of cached community snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheExpiration {
    Never,
    After(Duration),
}

impl CacheExpiration {
    /// Negative values mean the entries never expire.
    pub fn from_millis(millis: i64) -> Self {
        if millis < 0 {
            CacheExpiration::Never
        } else {
            CacheExpiration::After(Duration::from_millis(millis.unsigned_abs()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunityServiceConfig {
    /// Cache entry lifetime in milliseconds, `-1` for never.
    pub cache_expiration_ms: i64,

    /// Run the periodic membership reconciler.
    pub verify_memberships: bool,

    #[serde(with = "humantime_serde")]
    pub verify_memberships_interval: Duration,

    /// Back-off between manager lookups.
    #[serde(with = "humantime_serde")]
    pub find_manager_retry_delay: Duration,

    /// Delay before a losing community creator re-issues its join.
    #[serde(with = "humantime_serde")]
    pub create_retry_delay: Duration,

    /// Bounded wait applied to each naming service lookup.
    #[serde(with = "humantime_serde")]
    pub naming_wait: Duration,

    /// Timeout for descriptor fetches and searches that need the network.
    pub request_timeout_ms: i64,
}

impl Default for CommunityServiceConfig {
    fn default() -> Self {
        Self {
            cache_expiration_ms: 10 * 60 * 1000,
            verify_memberships: true,
            verify_memberships_interval: Duration::from_secs(60),
            find_manager_retry_delay: Duration::from_secs(5),
            create_retry_delay: Duration::from_secs(1),
            naming_wait: Duration::from_secs(2),
            request_timeout_ms: -1,
        }
    }
}

impl CommunityServiceConfig {
    pub fn cache_expiration(&self) -> CacheExpiration {
        CacheExpiration::from_millis(self.cache_expiration_ms)
    }

    pub fn request_timeout(&self) -> RequestTimeout {
        RequestTimeout::from_millis(self.request_timeout_ms)
    }

    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load from an explicit path, or fall back to defaults. Environment
    /// overrides are applied either way and the result is validated.
    pub fn load_or_default(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(path) => {
                tracing::info!("Loading community configuration from {:?}", path);
                Self::from_yaml_file(&path).map_err(|e| {
                    anyhow::anyhow!("Failed to load community config at {:?}: {}", path, e)
                })?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(ENV_CACHE_EXPIRATION_MS) {
            match val.trim().parse::<i64>() {
                Ok(millis) => {
                    tracing::info!("Environment override: {}={}", ENV_CACHE_EXPIRATION_MS, millis);
                    self.cache_expiration_ms = millis;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for {}: '{}'. Expected milliseconds. Ignoring.",
                    ENV_CACHE_EXPIRATION_MS,
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var(ENV_VERIFY_INTERVAL_MS) {
            match val.trim().parse::<u64>() {
                Ok(millis) => {
                    tracing::info!("Environment override: {}={}", ENV_VERIFY_INTERVAL_MS, millis);
                    self.verify_memberships_interval = Duration::from_millis(millis);
                }
                Err(_) => tracing::warn!(
                    "Invalid value for {}: '{}'. Expected milliseconds. Ignoring.",
                    ENV_VERIFY_INTERVAL_MS,
                    val
                ),
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cache_expiration_ms < -1 {
            anyhow::bail!(
                "cache_expiration_ms must be -1 (never) or a non-negative duration, got {}",
                self.cache_expiration_ms
            );
        }
        if self.verify_memberships && self.verify_memberships_interval.is_zero() {
            anyhow::bail!("verify_memberships_interval cannot be zero");
        }
        if self.find_manager_retry_delay.is_zero() {
            anyhow::bail!("find_manager_retry_delay cannot be zero");
        }
        Ok(())
    }
}
