//! Pipeline configuration loaded from environment variables.

use std::time::Duration;

use academy_core::delivery::{
    RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BASE_SECS, DEFAULT_RETRY_MAX_SECS,
};
use academy_core::quiet_hours::{timezone_from_offset_minutes, DEFAULT_UTC_OFFSET_MINUTES};
use chrono::{FixedOffset, Offset, TimeDelta, Utc};

/// Default AlimTalk provider endpoint (Aligo).
pub const DEFAULT_ALIMTALK_BASE_URL: &str = "https://kakaoapi.aligo.in/akv10/alimtalk";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Read `key` through `lookup` and parse it, falling back to `default`
/// when unset or blank.
fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        _ => Ok(default),
    }
}

/// A positive number of seconds as a [`TimeDelta`], rejecting values chrono
/// cannot represent.
fn seconds(key: &'static str, secs: i64) -> Result<TimeDelta, ConfigError> {
    TimeDelta::try_seconds(secs.max(1)).ok_or_else(|| ConfigError::Invalid {
        key,
        value: secs.to_string(),
    })
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

// ---------------------------------------------------------------------------
// NotifyConfig
// ---------------------------------------------------------------------------

/// Scheduling, retry and rate-limit settings for the pipeline.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Civil timezone used for quiet hours and rendered dates.
    pub timezone: FixedOffset,
    pub retry: RetryPolicy,
    pub sweep_interval: Duration,
    /// Maximum due entries fetched per sweep.
    pub sweep_batch_size: i64,
    /// Maximum concurrent gateway calls per sweep.
    pub sweep_concurrency: usize,
    /// How long a PROCESSING claim may live before it is reclaimed.
    pub claim_lease: TimeDelta,
    /// Manual sends allowed per user per minute.
    pub manual_send_limit_per_minute: u32,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            timezone: timezone_from_offset_minutes(DEFAULT_UTC_OFFSET_MINUTES)
                .unwrap_or_else(|_| Utc.fix()),
            retry: RetryPolicy::default(),
            sweep_interval: Duration::from_secs(60),
            sweep_batch_size: 100,
            sweep_concurrency: 8,
            claim_lease: TimeDelta::seconds(300),
            manual_send_limit_per_minute: 30,
        }
    }
}

impl NotifyConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default |
    /// |--------------------------------|---------|
    /// | `ACADEMY_UTC_OFFSET_MINUTES`   | `540`   |
    /// | `NOTIFY_MAX_ATTEMPTS`          | `5`     |
    /// | `NOTIFY_RETRY_BASE_SECS`       | `60`    |
    /// | `NOTIFY_RETRY_MAX_SECS`        | `3600`  |
    /// | `NOTIFY_SWEEP_INTERVAL_SECS`   | `60`    |
    /// | `NOTIFY_SWEEP_BATCH_SIZE`      | `100`   |
    /// | `NOTIFY_SWEEP_CONCURRENCY`     | `8`     |
    /// | `NOTIFY_CLAIM_LEASE_SECS`      | `300`   |
    /// | `MANUAL_SEND_LIMIT_PER_MINUTE` | `30`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let offset_minutes: i32 = parse_or(
            &lookup,
            "ACADEMY_UTC_OFFSET_MINUTES",
            DEFAULT_UTC_OFFSET_MINUTES,
        )?;
        let timezone =
            timezone_from_offset_minutes(offset_minutes).map_err(|_| ConfigError::Invalid {
                key: "ACADEMY_UTC_OFFSET_MINUTES",
                value: offset_minutes.to_string(),
            })?;

        let max_attempts: i32 = parse_or(&lookup, "NOTIFY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;
        if max_attempts < 1 {
            return Err(ConfigError::Invalid {
                key: "NOTIFY_MAX_ATTEMPTS",
                value: max_attempts.to_string(),
            });
        }
        let base_secs: i64 = parse_or(&lookup, "NOTIFY_RETRY_BASE_SECS", DEFAULT_RETRY_BASE_SECS)?;
        let max_secs: i64 = parse_or(&lookup, "NOTIFY_RETRY_MAX_SECS", DEFAULT_RETRY_MAX_SECS)?;

        let sweep_interval_secs: u64 = parse_or(&lookup, "NOTIFY_SWEEP_INTERVAL_SECS", 60)?;
        let sweep_batch_size: i64 = parse_or(&lookup, "NOTIFY_SWEEP_BATCH_SIZE", 100)?;
        let sweep_concurrency: usize = parse_or(&lookup, "NOTIFY_SWEEP_CONCURRENCY", 8)?;
        let claim_lease_secs: i64 = parse_or(&lookup, "NOTIFY_CLAIM_LEASE_SECS", 300)?;
        let manual_send_limit_per_minute: u32 =
            parse_or(&lookup, "MANUAL_SEND_LIMIT_PER_MINUTE", 30)?;

        let base_delay = seconds("NOTIFY_RETRY_BASE_SECS", base_secs)?;
        let max_delay = seconds("NOTIFY_RETRY_MAX_SECS", max_secs)?.max(base_delay);

        Ok(Self {
            timezone,
            retry: RetryPolicy {
                max_attempts,
                base_delay,
                max_delay,
            },
            sweep_interval: Duration::from_secs(sweep_interval_secs.max(1)),
            sweep_batch_size: sweep_batch_size.max(1),
            sweep_concurrency: sweep_concurrency.max(1),
            claim_lease: seconds("NOTIFY_CLAIM_LEASE_SECS", claim_lease_secs)?,
            manual_send_limit_per_minute,
        })
    }
}

// ---------------------------------------------------------------------------
// GatewayConfig
// ---------------------------------------------------------------------------

/// AlimTalk provider settings. Credentials are not part of this struct;
/// the client reads them from the environment on every send.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Provider result codes treated as transient.
    pub retryable_codes: Vec<i64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ALIMTALK_BASE_URL.to_string(),
            retryable_codes: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// | Env Var                   | Default                                     |
    /// |---------------------------|---------------------------------------------|
    /// | `ALIMTALK_BASE_URL`       | `https://kakaoapi.aligo.in/akv10/alimtalk`  |
    /// | `ALIMTALK_RETRYABLE_CODES`| empty (comma-separated provider codes)      |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("ALIMTALK_BASE_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_ALIMTALK_BASE_URL.to_string());

        let retryable_codes = lookup("ALIMTALK_RETRYABLE_CODES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<i64>().map_err(|_| ConfigError::Invalid {
                    key: "ALIMTALK_RETRYABLE_CODES",
                    value: s.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            base_url,
            retryable_codes,
        })
    }
}
