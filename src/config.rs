// Copyright (c) 2026 Lakegate Oy. All rights reserved.
// This software is proprietary and confidential.

/**
 * Lakegate - Configuration
 * Environment-driven settings, read once at startup and passed by reference
 *
 * @copyright 2026 Lakegate Oy
 * @license Proprietary
 */

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::governor::GovernorConfig;
use crate::lifecycle::LifecycleConfig;
use crate::retry::RetryConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// Full URL of the platform's GraphQL endpoint
    #[validate(url)]
    pub api_url: String,

    /// Pre-obtained bearer credential attached to every request
    #[validate(length(min = 1))]
    pub api_token: String,

    #[validate(range(min = 1, max = 256))]
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_queries: usize,

    #[validate(range(min = 1, max = 10000))]
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,

    #[serde(default = "default_poll_initial_ms")]
    pub poll_initial_ms: u64,

    #[serde(default = "default_poll_max_ms")]
    pub poll_max_ms: u64,

    /// Lifecycle deadline applied when the caller supplies none
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    #[serde(default = "default_slot_timeout_secs")]
    pub slot_acquire_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[validate(range(min = 1, max = 10))]
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Relations queries may reference; `None` disables the allowlist check
    #[serde(default)]
    pub table_allowlist: Option<Vec<String>>,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_rps() -> u32 {
    10
}

fn default_poll_initial_ms() -> u64 {
    500
}

fn default_poll_max_ms() -> u64 {
    10_000
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_slot_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

impl AppConfig {
    /// Load from `LAKEGATE_*` environment variables. `LAKEGATE_API_URL` and
    /// `LAKEGATE_API_TOKEN` are required; everything else has defaults.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            api_url: std::env::var("LAKEGATE_API_URL")
                .context("LAKEGATE_API_URL must be set")?,
            api_token: std::env::var("LAKEGATE_API_TOKEN")
                .context("LAKEGATE_API_TOKEN must be set")?,
            max_concurrent_queries: env_parse(
                "LAKEGATE_MAX_CONCURRENT_QUERIES",
                default_max_concurrent(),
            )?,
            requests_per_second: env_parse("LAKEGATE_REQUESTS_PER_SECOND", default_rps())?,
            poll_initial_ms: env_parse("LAKEGATE_POLL_INITIAL_MS", default_poll_initial_ms())?,
            poll_max_ms: env_parse("LAKEGATE_POLL_MAX_MS", default_poll_max_ms())?,
            default_timeout_secs: env_parse(
                "LAKEGATE_DEFAULT_TIMEOUT_SECS",
                default_timeout_secs(),
            )?,
            slot_acquire_timeout_secs: env_parse(
                "LAKEGATE_SLOT_TIMEOUT_SECS",
                default_slot_timeout_secs(),
            )?,
            request_timeout_secs: env_parse(
                "LAKEGATE_REQUEST_TIMEOUT_SECS",
                default_request_timeout_secs(),
            )?,
            max_retries: env_parse("LAKEGATE_MAX_RETRIES", default_max_retries())?,
            table_allowlist: std::env::var("LAKEGATE_TABLE_ALLOWLIST").ok().map(|raw| {
                raw.split(',')
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect()
            }),
        };

        config
            .validate()
            .context("invalid lakegate configuration")?;
        Ok(config)
    }

    pub fn governor_config(&self) -> GovernorConfig {
        GovernorConfig {
            max_concurrent_queries: self.max_concurrent_queries,
            requests_per_second: self.requests_per_second,
        }
    }

    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            poll_initial: Duration::from_millis(self.poll_initial_ms),
            poll_max: Duration::from_millis(self.poll_max_ms),
            default_deadline: Duration::from_secs(self.default_timeout_secs),
            slot_acquire_timeout: Duration::from_secs(self.slot_acquire_timeout_secs),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::default().with_max_attempts(self.max_retries)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{} has an invalid value", name)),
        Err(_) => Ok(default),
    }
}
