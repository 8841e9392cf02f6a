//! Pool-wide limits and failure thresholds

use serde::{Deserialize, Serialize};

use crate::clock::day_index;
use crate::error::{Error, Result};

/// Longest accepted `min_interval_secs` or `cooldown_secs` (30 days).
pub const MAX_WAIT_SECS: u64 = 30 * 86_400;

/// Reject a wait longer than `MAX_WAIT_SECS`.
pub fn check_wait_secs(field: &str, secs: u64) -> Result<()> {
    if secs > MAX_WAIT_SECS {
        return Err(Error::Validation(format!(
            "{field} must be at most {MAX_WAIT_SECS}, got {secs}"
        )));
    }
    Ok(())
}

/// Pool-wide configuration. Persisted alongside the accounts.
///
/// `default_*` values apply to accounts added without explicit limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub default_min_interval_secs: u64,
    pub default_daily_limit: u32,
    /// Consecutive failures that put an account into cooldown.
    pub cooldown_threshold: u32,
    pub cooldown_secs: u64,
    /// Consecutive failures that disable an account until re-enabled.
    pub disable_threshold: u32,
    /// Offset of the quota-day boundary from UTC midnight, in seconds.
    pub day_start_offset_secs: i64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            default_min_interval_secs: 3,
            default_daily_limit: 100,
            cooldown_threshold: 3,
            cooldown_secs: 900,
            disable_threshold: 10,
            day_start_offset_secs: 0,
        }
    }
}

impl PoolSettings {
    pub fn validate(&self) -> Result<()> {
        if self.default_daily_limit == 0 {
            return Err(Error::Validation(
                "default_daily_limit must be greater than 0".into(),
            ));
        }
        if self.cooldown_threshold == 0 {
            return Err(Error::Validation(
                "cooldown_threshold must be greater than 0".into(),
            ));
        }
        if self.disable_threshold <= self.cooldown_threshold {
            return Err(Error::Validation(format!(
                "disable_threshold ({}) must be greater than cooldown_threshold ({})",
                self.disable_threshold, self.cooldown_threshold
            )));
        }
        check_wait_secs("default_min_interval_secs", self.default_min_interval_secs)?;
        check_wait_secs("cooldown_secs", self.cooldown_secs)?;
        if self.day_start_offset_secs.abs() >= 86_400 {
            return Err(Error::Validation(format!(
                "day_start_offset_secs must be within one day, got {}",
                self.day_start_offset_secs
            )));
        }
        Ok(())
    }

    /// Quota day containing `now_millis` under this pool's day boundary.
    pub fn day_of(&self, now_millis: u64) -> i64 {
        day_index(now_millis, self.day_start_offset_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        PoolSettings::default().validate().unwrap();
    }

    #[test]
    fn zero_daily_limit_rejected() {
        let settings = PoolSettings {
            default_daily_limit: 0,
            ..PoolSettings::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn disable_threshold_must_exceed_cooldown_threshold() {
        let settings = PoolSettings {
            cooldown_threshold: 5,
            disable_threshold: 5,
            ..PoolSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("disable_threshold"), "got: {err}");
    }

    #[test]
    fn day_offset_out_of_range_rejected() {
        let settings = PoolSettings {
            day_start_offset_secs: 86_400,
            ..PoolSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn oversized_waits_rejected() {
        let settings = PoolSettings {
            cooldown_secs: u64::MAX / 100,
            ..PoolSettings::default()
        };
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("cooldown_secs"), "got: {err}");

        let settings = PoolSettings {
            default_min_interval_secs: MAX_WAIT_SECS + 1,
            ..PoolSettings::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Validation(_))));

        check_wait_secs("min_interval_secs", MAX_WAIT_SECS).unwrap();
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let settings: PoolSettings = serde_json::from_str(r#"{"cooldown_secs": 60}"#).unwrap();
        assert_eq!(settings.cooldown_secs, 60);
        assert_eq!(settings.default_daily_limit, 100);
    }
}
