//! Scan and delivery settings.

use chrono::TimeDelta;
use core_config::{ConfigError, FromEnv, env_list, env_or_default, env_parse};
use std::time::Duration;

use crate::error::{ExpiryError, ExpiryResult};

pub const DEFAULT_THRESHOLDS: [i32; 5] = [30, 14, 7, 1, 0];

/// Reminder thresholds in days, strictly descending and non-negative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thresholds(Vec<i32>);

impl Thresholds {
    /// Sorts descending and removes duplicates. Empty or negative input is rejected.
    pub fn new(mut days: Vec<i32>) -> ExpiryResult<Self> {
        if days.is_empty() {
            return Err(ExpiryError::Config(
                "at least one expiry threshold is required".to_string(),
            ));
        }
        if let Some(negative) = days.iter().find(|d| **d < 0) {
            return Err(ExpiryError::Config(format!(
                "expiry thresholds must be non-negative, got {}",
                negative
            )));
        }

        days.sort_unstable_by(|a, b| b.cmp(a));
        days.dedup();
        Ok(Self(days))
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.0
    }

    /// Earliest reminder point
    pub fn max(&self) -> i32 {
        self.0[0]
    }

    /// Threshold band for `days_until_expiry`: the largest threshold not above it.
    ///
    /// None when already expired or further away than the largest threshold.
    pub fn select(&self, days_until_expiry: i64) -> Option<i32> {
        if days_until_expiry < 0 || days_until_expiry > i64::from(self.max()) {
            return None;
        }
        self.0
            .iter()
            .copied()
            .find(|t| i64::from(*t) <= days_until_expiry)
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLDS.to_vec())
    }
}

/// Bounded retry for a single dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total transport calls, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: u32,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `next_attempt` (2-based: the first retry)
    pub fn backoff_before(&self, next_attempt: u32) -> Duration {
        let exponent = next_attempt.saturating_sub(2);
        let factor = self.backoff_multiplier.saturating_pow(exponent);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    /// Single attempt, no waiting
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Immediate retries; used by tests and the in-process fake transport
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            backoff_multiplier: 1,
            max_backoff: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            backoff_multiplier: 2,
            max_backoff: Duration::from_millis(5_000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    pub thresholds: Thresholds,
    /// Clients processed in parallel within one run
    pub scan_concurrency: usize,
    /// Stop re-sending a notification's email after this many transport calls
    pub max_delivery_attempts: i32,
    /// A `sending` claim older than this is considered abandoned
    pub delivery_claim_timeout: TimeDelta,
    pub retry: RetryPolicy,
    /// Sender brand shown in reminder emails
    pub company_name: String,
}

impl ExpiryConfig {
    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_scan_concurrency(mut self, scan_concurrency: usize) -> Self {
        self.scan_concurrency = scan_concurrency.max(1);
        self
    }
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            scan_concurrency: 8,
            max_delivery_attempts: 9,
            delivery_claim_timeout: TimeDelta::minutes(10),
            retry: RetryPolicy::default(),
            company_name: "CRM".to_string(),
        }
    }
}

/// Environment variables:
/// - `EXPIRY_THRESHOLDS` (default `30,14,7,1,0`)
/// - `EXPIRY_SCAN_CONCURRENCY` (default 8)
/// - `EXPIRY_MAX_DELIVERY_ATTEMPTS` (default 9)
/// - `EXPIRY_DELIVERY_CLAIM_TIMEOUT_SECS` (default 600)
/// - `MAIL_MAX_ATTEMPTS` (default 3), `MAIL_INITIAL_BACKOFF_MS` (default 250),
///   `MAIL_MAX_BACKOFF_MS` (default 5000)
/// - `COMPANY_NAME` (default `CRM`)
impl FromEnv for ExpiryConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let thresholds = Thresholds::new(env_list("EXPIRY_THRESHOLDS", "30,14,7,1,0")?)
            .map_err(|e| ConfigError::InvalidValue {
                key: "EXPIRY_THRESHOLDS".to_string(),
                details: e.to_string(),
            })?;

        let max_attempts: u32 = env_parse("MAIL_MAX_ATTEMPTS", "3")?;
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAIL_MAX_ATTEMPTS".to_string(),
                details: "must be at least 1".to_string(),
            });
        }

        let scan_concurrency: usize = env_parse("EXPIRY_SCAN_CONCURRENCY", "8")?;

        let claim_timeout_secs: i64 = env_parse("EXPIRY_DELIVERY_CLAIM_TIMEOUT_SECS", "600")?;
        let delivery_claim_timeout = TimeDelta::try_seconds(claim_timeout_secs)
            .filter(|timeout| *timeout > TimeDelta::zero())
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "EXPIRY_DELIVERY_CLAIM_TIMEOUT_SECS".to_string(),
                details: format!("{} is not a positive number of seconds", claim_timeout_secs),
            })?;

        Ok(Self {
            thresholds,
            scan_concurrency: scan_concurrency.max(1),
            max_delivery_attempts: env_parse("EXPIRY_MAX_DELIVERY_ATTEMPTS", "9")?,
            delivery_claim_timeout,
            retry: RetryPolicy {
                max_attempts,
                initial_backoff: Duration::from_millis(env_parse("MAIL_INITIAL_BACKOFF_MS", "250")?),
                backoff_multiplier: 2,
                max_backoff: Duration::from_millis(env_parse("MAIL_MAX_BACKOFF_MS", "5000")?),
            },
            company_name: env_or_default("COMPANY_NAME", "CRM"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_normalised() {
        let thresholds = Thresholds::new(vec![0, 7, 30, 7, 1, 14]).unwrap();
        assert_eq!(thresholds.as_slice(), &[30, 14, 7, 1, 0]);
        assert_eq!(thresholds.max(), 30);
    }

    #[test]
    fn test_thresholds_reject_empty_and_negative() {
        assert!(Thresholds::new(vec![]).is_err());
        assert!(Thresholds::new(vec![7, -1]).is_err());
    }

    #[test]
    fn test_select_band() {
        let thresholds = Thresholds::default();
        assert_eq!(thresholds.select(9), Some(7));
        assert_eq!(thresholds.select(7), Some(7));
        assert_eq!(thresholds.select(0), Some(0));
        assert_eq!(thresholds.select(30), Some(30));
        assert_eq!(thresholds.select(20), Some(14));
        assert_eq!(thresholds.select(2), Some(1));
        assert_eq!(thresholds.select(31), None);
        assert_eq!(thresholds.select(-3), None);
    }

    #[test]
    fn test_select_without_zero_threshold() {
        let thresholds = Thresholds::new(vec![14, 7]).unwrap();
        assert_eq!(thresholds.select(3), None);
        assert_eq!(thresholds.select(10), Some(7));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_before(2), Duration::from_millis(250));
        assert_eq!(policy.backoff_before(3), Duration::from_millis(500));
        assert_eq!(policy.backoff_before(4), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_before(40), Duration::from_millis(5_000));
    }

    #[test]
    fn test_config_from_env_defaults() {
        temp_env::with_vars_unset(
            [
                "EXPIRY_THRESHOLDS",
                "EXPIRY_SCAN_CONCURRENCY",
                "EXPIRY_MAX_DELIVERY_ATTEMPTS",
                "EXPIRY_DELIVERY_CLAIM_TIMEOUT_SECS",
                "MAIL_MAX_ATTEMPTS",
                "MAIL_INITIAL_BACKOFF_MS",
                "MAIL_MAX_BACKOFF_MS",
                "COMPANY_NAME",
            ],
            || {
                let config = ExpiryConfig::from_env().unwrap();
                assert_eq!(config.thresholds, Thresholds::default());
                assert_eq!(config.scan_concurrency, 8);
                assert_eq!(config.max_delivery_attempts, 9);
                assert_eq!(config.delivery_claim_timeout, TimeDelta::minutes(10));
                assert_eq!(config.retry, RetryPolicy::default());
                assert_eq!(config.company_name, "CRM");
            },
        );
    }

    #[test]
    fn test_config_from_env_custom_thresholds() {
        temp_env::with_vars(
            [
                ("EXPIRY_THRESHOLDS", Some("7, 60, 1")),
                ("MAIL_MAX_ATTEMPTS", Some("5")),
                ("COMPANY_NAME", Some("Hostly")),
            ],
            || {
                let config = ExpiryConfig::from_env().unwrap();
                assert_eq!(config.thresholds.as_slice(), &[60, 7, 1]);
                assert_eq!(config.retry.max_attempts, 5);
                assert_eq!(config.company_name, "Hostly");
            },
        );
    }

    #[test]
    fn test_config_from_env_rejects_zero_attempts() {
        temp_env::with_var("MAIL_MAX_ATTEMPTS", Some("0"), || {
            let err = ExpiryConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("MAIL_MAX_ATTEMPTS"));
        });
    }

    #[test]
    fn test_config_from_env_rejects_non_positive_claim_timeout() {
        temp_env::with_var("EXPIRY_DELIVERY_CLAIM_TIMEOUT_SECS", Some("0"), || {
            let err = ExpiryConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("EXPIRY_DELIVERY_CLAIM_TIMEOUT_SECS"));
        });
    }

    #[test]
    fn test_config_from_env_rejects_negative_threshold() {
        temp_env::with_var("EXPIRY_THRESHOLDS", Some("30,-1"), || {
            let err = ExpiryConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("EXPIRY_THRESHOLDS"));
        });
    }
}
