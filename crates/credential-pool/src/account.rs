//! Account record and its pure helpers
//!
//! An `Account` holds one credential's limits and live counters. Nothing here
//! does I/O or locking; the pool mutates records under its own lock and the
//! selection policy only reads them.
//!
//! Status is derived, never stored:
//! - `enabled == false` → Disabled
//! - `now < cooldown_until` → CoolingDown
//! - otherwise → Active

use std::fmt;
use std::str::FromStr;

use common::Secret;
use serde::{Deserialize, Serialize};

use crate::settings::PoolSettings;

/// Stable account identifier. Assigned from a pool-wide counter and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(AccountId)
    }
}

/// Derived account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    CoolingDown,
    Disabled,
}

/// Why an account cannot be selected right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Ineligible {
    Disabled,
    CoolingDown,
    /// `min_interval_secs` has not elapsed since the last selection.
    RateLimited,
    /// `daily_limit` reached for the current quota day.
    QuotaExhausted,
}

/// One credential plus its limits, counters and health state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub secret: Secret<String>,
    pub name: String,
    #[serde(default)]
    pub remark: String,
    pub enabled: bool,
    pub min_interval_secs: u64,
    pub daily_limit: u32,
    #[serde(default)]
    pub usage_count_today: u32,
    /// Quota day `usage_count_today` belongs to.
    #[serde(default)]
    pub day_anchor: i64,
    #[serde(default)]
    pub total_usage_count: u64,
    #[serde(default)]
    pub last_used_at: Option<u64>,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
    #[serde(default)]
    pub cooldown_until: Option<u64>,
    pub created_at: u64,
}

/// What a failure report did to an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureEffect {
    pub entered_cooldown: bool,
    pub auto_disabled: bool,
}

impl FailureEffect {
    /// Whether `enabled` or `cooldown_until` changed and must be persisted.
    pub fn changed_state(&self) -> bool {
        self.entered_cooldown || self.auto_disabled
    }
}

impl Account {
    pub fn is_cooling_down(&self, now: u64) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    /// Whether `min_interval_secs` has not yet elapsed since the last selection.
    pub fn is_rate_limited(&self, now: u64) -> bool {
        self.last_used_at
            .is_some_and(|last| now.saturating_sub(last) < self.min_interval_secs.saturating_mul(1000))
    }

    /// Selections made during quota day `day`. A stale anchor counts as zero.
    pub fn usage_on(&self, day: i64) -> u32 {
        if self.day_anchor == day {
            self.usage_count_today
        } else {
            0
        }
    }

    pub fn is_quota_exhausted(&self, day: i64) -> bool {
        self.usage_on(day) >= self.daily_limit
    }

    pub fn effective_status(&self, now: u64) -> AccountStatus {
        if !self.enabled {
            AccountStatus::Disabled
        } else if self.is_cooling_down(now) {
            AccountStatus::CoolingDown
        } else {
            AccountStatus::Active
        }
    }

    pub fn is_eligible(&self, now: u64, day: i64) -> bool {
        self.ineligible(now, day).is_none()
    }

    /// Why the account cannot be selected right now, if it cannot.
    pub fn ineligible(&self, now: u64, day: i64) -> Option<Ineligible> {
        if !self.enabled {
            Some(Ineligible::Disabled)
        } else if self.is_cooling_down(now) {
            Some(Ineligible::CoolingDown)
        } else if self.is_rate_limited(now) {
            Some(Ineligible::RateLimited)
        } else if self.is_quota_exhausted(day) {
            Some(Ineligible::QuotaExhausted)
        } else {
            None
        }
    }

    /// Count one selection at `now`, rolling the daily counter first if the
    /// quota day changed.
    pub(crate) fn record_selection(&mut self, now: u64, day: i64) {
        if self.day_anchor != day {
            self.usage_count_today = 0;
            self.day_anchor = day;
        }
        self.usage_count_today += 1;
        self.total_usage_count += 1;
        self.last_used_at = Some(now);
    }

    pub(crate) fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.success_count += 1;
    }

    pub(crate) fn record_failure(&mut self, now: u64, settings: &PoolSettings) -> FailureEffect {
        self.failure_count += 1;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        let mut effect = FailureEffect::default();
        if self.consecutive_failures >= settings.cooldown_threshold {
            let cooldown_millis = settings.cooldown_secs.saturating_mul(1000);
            self.cooldown_until = Some(now.saturating_add(cooldown_millis));
            effect.entered_cooldown = true;
        }
        if self.consecutive_failures >= settings.disable_threshold && self.enabled {
            self.enabled = false;
            effect.auto_disabled = true;
        }
        effect
    }

    /// Change the daily limit. Usage already counted is capped at the new
    /// limit so `usage_count_today <= daily_limit` keeps holding.
    pub(crate) fn set_daily_limit(&mut self, limit: u32) {
        self.daily_limit = limit;
        self.usage_count_today = self.usage_count_today.min(limit);
    }

    /// Manual re-enable: clean restart of the failure streak and cooldown.
    pub(crate) fn enable(&mut self) {
        self.enabled = true;
        self.consecutive_failures = 0;
        self.cooldown_until = None;
    }

    /// Manual disable. Counters are kept.
    pub(crate) fn disable(&mut self) {
        self.enabled = false;
    }

    /// Re-enable and also forgive today's usage.
    pub(crate) fn reset(&mut self, day: i64) {
        self.enable();
        self.usage_count_today = 0;
        self.day_anchor = day;
    }

    /// Display row for status output. Never contains the secret.
    pub fn report(&self, now: u64, day: i64) -> AccountReport {
        AccountReport {
            id: self.id,
            name: self.name.clone(),
            remark: self.remark.clone(),
            fingerprint: self.secret.fingerprint(),
            status: self.effective_status(now),
            ineligible: self.ineligible(now, day),
            usage_today: self.usage_on(day),
            daily_limit: self.daily_limit,
            min_interval_secs: self.min_interval_secs,
            total_usage_count: self.total_usage_count,
            success_count: self.success_count,
            failure_count: self.failure_count,
            consecutive_failures: self.consecutive_failures,
            last_used_at: self.last_used_at,
            cooldown_remaining_secs: self
                .cooldown_until
                .filter(|until| now < *until)
                .map(|until| (until - now).div_ceil(1000)),
            created_at: self.created_at,
        }
    }
}

/// Per-account row of a pool summary.
#[derive(Debug, Clone, Serialize)]
pub struct AccountReport {
    pub id: AccountId,
    pub name: String,
    pub remark: String,
    pub fingerprint: String,
    pub status: AccountStatus,
    /// `None` when the account can be selected right now.
    pub ineligible: Option<Ineligible>,
    pub usage_today: u32,
    pub daily_limit: u32,
    pub min_interval_secs: u64,
    pub total_usage_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    pub last_used_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_secs: Option<u64>,
    pub created_at: u64,
}

/// Input for `Pool::add_account`. Omitted limits fall back to pool defaults.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub secret: String,
    pub name: Option<String>,
    pub remark: String,
    pub min_interval_secs: Option<u64>,
    pub daily_limit: Option<u32>,
}

impl NewAccount {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            name: None,
            remark: String::new(),
            min_interval_secs: None,
            daily_limit: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn remark(mut self, remark: impl Into<String>) -> Self {
        self.remark = remark.into();
        self
    }

    pub fn min_interval_secs(mut self, secs: u64) -> Self {
        self.min_interval_secs = Some(secs);
        self
    }

    pub fn daily_limit(mut self, limit: u32) -> Self {
        self.daily_limit = Some(limit);
        self
    }
}

/// Partial edit for `Pool::update_account`. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub remark: Option<String>,
    pub min_interval_secs: Option<u64>,
    pub daily_limit: Option<u32>,
}
