//! Pool manager: account set, state transitions and write-through persistence
//!
//! Every mutating operation runs under one pool-wide write lock, so the
//! eligibility check and the usage increment in `select()` are a single step
//! and two callers can never both pass an account's interval or quota check.
//! `snapshot()` and `summary()` take the read lock. Callers do their network
//! I/O between `select()` and `report_outcome()`, outside the lock.
//!
//! Persistence:
//! - add/remove/enable/disable/update/reset, cooldown entry and auto-disable
//!   save before returning; a failed save is returned to the caller but the
//!   in-memory change is kept
//! - usage counters and success/failure tallies only mark the state dirty;
//!   `flush()` (or the next state-affecting save) writes them

use std::collections::BTreeMap;
use std::sync::Arc;

use common::Secret;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::account::{
    Account, AccountId, AccountReport, AccountStatus, AccountUpdate, Ineligible, NewAccount,
};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::import::{ImportEntry, ImportReport};
use crate::metrics;
use crate::policy;
use crate::settings::{PoolSettings, check_wait_secs};
use crate::store::{PoolState, SNAPSHOT_VERSION, StateStore};

/// An account handed out for one use.
#[derive(Debug, Clone)]
pub struct SelectedAccount {
    pub id: AccountId,
    pub secret: Secret<String>,
}

/// Overall pool health: all active → healthy, some → degraded, none → unhealthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Administration view of the pool. Never contains secrets.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSummary {
    pub status: PoolHealth,
    pub total: usize,
    /// Enabled and not cooling down.
    pub active: usize,
    /// Selectable right now (active and within interval and quota).
    pub eligible: usize,
    pub cooling_down: usize,
    pub disabled: usize,
    pub accounts: Vec<AccountReport>,
}

/// State guarded by the pool lock.
struct Inner {
    next_id: u64,
    settings: PoolSettings,
    accounts: BTreeMap<AccountId, Account>,
    /// Changes since the last successful save.
    dirty: bool,
}

impl Inner {
    fn to_state(&self) -> PoolState {
        PoolState {
            version: SNAPSHOT_VERSION,
            next_id: self.next_id,
            settings: self.settings.clone(),
            accounts: self.accounts.values().cloned().collect(),
        }
    }

    fn get_mut(&mut self, id: AccountId) -> Result<&mut Account> {
        self.accounts.get_mut(&id).ok_or(Error::NotFound(id))
    }

    /// Validate and insert a new account, returning its fresh id.
    fn insert(&mut self, new: NewAccount, now: u64) -> Result<AccountId> {
        let secret = new.secret.trim();
        if secret.is_empty() {
            return Err(Error::Validation("secret must not be empty".into()));
        }
        check_limits(new.min_interval_secs, new.daily_limit)?;
        if self.accounts.values().any(|a| a.secret.expose() == secret) {
            return Err(Error::Validation(format!(
                "an account with this secret already exists (fingerprint {})",
                Secret::new(secret.to_string()).fingerprint()
            )));
        }

        let id = AccountId(self.next_id);
        self.next_id += 1;

        let account = Account {
            id,
            secret: Secret::new(secret.to_string()),
            name: new
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| format!("account-{id}")),
            remark: new.remark,
            enabled: true,
            min_interval_secs: new
                .min_interval_secs
                .unwrap_or(self.settings.default_min_interval_secs),
            daily_limit: new.daily_limit.unwrap_or(self.settings.default_daily_limit),
            usage_count_today: 0,
            day_anchor: self.settings.day_of(now),
            total_usage_count: 0,
            last_used_at: None,
            consecutive_failures: 0,
            success_count: 0,
            failure_count: 0,
            cooldown_until: None,
            created_at: now,
        };
        info!(
            account_id = %id,
            name = %account.name,
            fingerprint = %account.secret.fingerprint(),
            "account added"
        );
        self.accounts.insert(id, account);
        Ok(id)
    }

    fn no_capacity(&self, now: u64, day: i64) -> Error {
        let mut cooling_down = 0;
        let mut disabled = 0;
        let mut exhausted = 0;
        for account in self.accounts.values() {
            match account.ineligible(now, day) {
                Some(Ineligible::Disabled) => disabled += 1,
                Some(Ineligible::CoolingDown) => cooling_down += 1,
                Some(Ineligible::RateLimited | Ineligible::QuotaExhausted) => exhausted += 1,
                None => {}
            }
        }
        Error::NoCapacity {
            total: self.accounts.len(),
            cooling_down,
            disabled,
            exhausted,
        }
    }
}

/// Validate admin-supplied per-account limits.
fn check_limits(min_interval_secs: Option<u64>, daily_limit: Option<u32>) -> Result<()> {
    if daily_limit == Some(0) {
        return Err(Error::Validation("daily_limit must be greater than 0".into()));
    }
    if let Some(secs) = min_interval_secs {
        check_wait_secs("min_interval_secs", secs)?;
    }
    Ok(())
}

/// Credential pool shared by all workers, typically behind an `Arc`.
pub struct Pool {
    inner: RwLock<Inner>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl Pool {
    /// Load the pool from `store`, or start empty if nothing was saved yet.
    ///
    /// `settings` are authoritative: they replace whatever settings the
    /// snapshot carried. A corrupt or unreadable snapshot fails here instead of
    /// starting a pool with no durability.
    pub async fn open(
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        settings: PoolSettings,
    ) -> Result<Self> {
        settings.validate()?;

        let (state, needs_save) = match store.load().await? {
            Some(state) => {
                let changed = state.settings != settings;
                (state, changed)
            }
            None => (PoolState::empty(settings.clone()), true),
        };

        let accounts: BTreeMap<AccountId, Account> =
            state.accounts.into_iter().map(|a| (a.id, a)).collect();
        // Never hand out an id at or below one already on record
        let next_id = accounts
            .keys()
            .next_back()
            .map_or(state.next_id, |max| state.next_id.max(max.0 + 1));

        let pool = Self {
            inner: RwLock::new(Inner {
                next_id,
                settings,
                accounts,
                dirty: false,
            }),
            store,
            clock,
        };

        {
            let mut inner = pool.inner.write().await;
            info!(accounts = inner.accounts.len(), next_id, "pool initialized");
            if needs_save {
                pool.persist(&mut inner).await?;
            }
        }
        Ok(pool)
    }

    /// Hand out the least recently used eligible account and count the use.
    ///
    /// Returns `NoCapacity` immediately when nothing is eligible; waiting and
    /// retrying is up to the caller.
    pub async fn select(&self) -> Result<SelectedAccount> {
        let mut inner = self.inner.write().await;
        let now = self.clock.now_millis();
        let day = inner.settings.day_of(now);

        let Some(id) = policy::select(inner.accounts.values(), now, day) else {
            let err = inner.no_capacity(now, day);
            debug!(error = %err, "no eligible account");
            metrics::record_no_capacity();
            return Err(err);
        };

        let account = inner.get_mut(id)?;
        account.record_selection(now, day);
        let selected = SelectedAccount {
            id,
            secret: account.secret.clone(),
        };
        debug!(
            account_id = %id,
            usage_today = account.usage_count_today,
            daily_limit = account.daily_limit,
            "account selected"
        );
        inner.dirty = true;
        metrics::record_selection();
        Ok(selected)
    }

    /// Apply the result of using an account.
    ///
    /// Reports for accounts removed while the request was in flight are
    /// ignored. Saves only when the report put the account into cooldown or
    /// disabled it.
    pub async fn report_outcome(&self, id: AccountId, success: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        let now = self.clock.now_millis();
        let settings = inner.settings.clone();
        let next_id = inner.next_id;

        let Some(account) = inner.accounts.get_mut(&id) else {
            if id.0 < next_id {
                debug!(account_id = %id, success, "outcome for removed account ignored");
                return Ok(());
            }
            return Err(Error::NotFound(id));
        };

        metrics::record_outcome(success);
        if success {
            account.record_success();
            inner.dirty = true;
            return Ok(());
        }

        let effect = account.record_failure(now, &settings);
        let failures = account.consecutive_failures;
        debug!(account_id = %id, consecutive_failures = failures, "failure reported");
        if effect.entered_cooldown {
            warn!(
                account_id = %id,
                consecutive_failures = failures,
                cooldown_secs = settings.cooldown_secs,
                "account entering cooldown"
            );
            metrics::record_transition("cooldown");
        }
        if effect.auto_disabled {
            warn!(account_id = %id, consecutive_failures = failures, "account disabled after repeated failures");
            metrics::record_transition("auto_disable");
        }
        inner.dirty = true;

        if effect.changed_state() {
            self.persist(&mut inner).await?;
        }
        Ok(())
    }

    /// Add an account, applying pool defaults for omitted limits.
    pub async fn add_account(&self, new: NewAccount) -> Result<AccountId> {
        let mut inner = self.inner.write().await;
        let now = self.clock.now_millis();
        let id = inner.insert(new, now)?;
        self.persist(&mut inner).await?;
        Ok(id)
    }

    /// Add many accounts under one lock and one save.
    ///
    /// Invalid and duplicate entries are skipped with a warning.
    pub async fn import(&self, entries: Vec<ImportEntry>) -> Result<ImportReport> {
        let mut inner = self.inner.write().await;
        let now = self.clock.now_millis();
        let mut report = ImportReport::default();

        for entry in entries {
            match inner.insert(entry.into_new_account(), now) {
                Ok(id) => report.added.push(id),
                Err(e) => {
                    warn!(error = %e, "skipping import entry");
                    report.skipped += 1;
                }
            }
        }

        info!(added = report.added.len(), skipped = report.skipped, "import finished");
        if !report.added.is_empty() {
            self.persist(&mut inner).await?;
        }
        Ok(report)
    }

    /// Hard-delete an account. Its id is never reused.
    pub async fn remove_account(&self, id: AccountId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let removed = inner.accounts.remove(&id).ok_or(Error::NotFound(id))?;
        info!(account_id = %id, name = %removed.name, "account removed");
        self.persist(&mut inner).await
    }

    /// Re-enable an account, clearing its failure streak and any cooldown.
    pub async fn enable(&self, id: AccountId) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.get_mut(id)?.enable();
        info!(account_id = %id, "account enabled");
        self.persist(&mut inner).await
    }

    /// Disable an account until it is explicitly re-enabled.
    pub async fn disable(&self, id: AccountId) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.get_mut(id)?.disable();
        info!(account_id = %id, "account disabled");
        self.persist(&mut inner).await
    }

    /// Edit an account's labels and limits.
    pub async fn update_account(&self, id: AccountId, update: AccountUpdate) -> Result<()> {
        check_limits(update.min_interval_secs, update.daily_limit)?;
        let mut inner = self.inner.write().await;
        let account = inner.get_mut(id)?;
        if let Some(name) = update.name {
            account.name = name;
        }
        if let Some(remark) = update.remark {
            account.remark = remark;
        }
        if let Some(secs) = update.min_interval_secs {
            account.min_interval_secs = secs;
        }
        if let Some(limit) = update.daily_limit {
            account.set_daily_limit(limit);
        }
        info!(
            account_id = %id,
            min_interval_secs = account.min_interval_secs,
            daily_limit = account.daily_limit,
            "account updated"
        );
        self.persist(&mut inner).await
    }

    /// Apply the same limits to every account. Returns how many were touched.
    pub async fn update_all_limits(
        &self,
        min_interval_secs: Option<u64>,
        daily_limit: Option<u32>,
    ) -> Result<usize> {
        check_limits(min_interval_secs, daily_limit)?;
        let mut inner = self.inner.write().await;
        for account in inner.accounts.values_mut() {
            if let Some(secs) = min_interval_secs {
                account.min_interval_secs = secs;
            }
            if let Some(limit) = daily_limit {
                account.set_daily_limit(limit);
            }
        }
        let count = inner.accounts.len();
        info!(accounts = count, ?min_interval_secs, ?daily_limit, "limits updated for all accounts");
        self.persist(&mut inner).await?;
        Ok(count)
    }

    /// Re-enable an account and forgive its failures, cooldown and today's usage.
    pub async fn reset(&self, id: AccountId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let day = inner.settings.day_of(self.clock.now_millis());
        inner.get_mut(id)?.reset(day);
        info!(account_id = %id, "account reset");
        self.persist(&mut inner).await
    }

    /// `reset` for every account. Returns how many were reset.
    pub async fn reset_all(&self) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let day = inner.settings.day_of(self.clock.now_millis());
        for account in inner.accounts.values_mut() {
            account.reset(day);
        }
        let count = inner.accounts.len();
        info!(accounts = count, "all accounts reset");
        self.persist(&mut inner).await?;
        Ok(count)
    }

    /// Copy of the full pool state, including secrets. Never mutates.
    pub async fn snapshot(&self) -> PoolState {
        self.inner.read().await.to_state()
    }

    /// Counts and per-account rows for monitoring.
    pub async fn summary(&self) -> PoolSummary {
        let inner = self.inner.read().await;
        let now = self.clock.now_millis();
        let day = inner.settings.day_of(now);

        let accounts: Vec<AccountReport> = inner
            .accounts
            .values()
            .map(|a| a.report(now, day))
            .collect();

        let total = accounts.len();
        let count = |status: AccountStatus| accounts.iter().filter(|r| r.status == status).count();
        let active = count(AccountStatus::Active);
        let cooling_down = count(AccountStatus::CoolingDown);
        let disabled = count(AccountStatus::Disabled);
        let eligible = accounts.iter().filter(|r| r.ineligible.is_none()).count();

        let status = if total > 0 && active == total {
            PoolHealth::Healthy
        } else if active > 0 {
            PoolHealth::Degraded
        } else {
            PoolHealth::Unhealthy
        };

        PoolSummary {
            status,
            total,
            active,
            eligible,
            cooling_down,
            disabled,
            accounts,
        }
    }

    /// Save usage and health counters if anything changed since the last save.
    ///
    /// Returns whether a save happened.
    pub async fn flush(&self) -> Result<bool> {
        let mut inner = self.inner.write().await;
        if !inner.dirty {
            return Ok(false);
        }
        self.persist(&mut inner).await?;
        Ok(true)
    }

    /// Write the current state through the store. Called with the write lock held.
    async fn persist(&self, inner: &mut Inner) -> Result<()> {
        let state = inner.to_state();
        match self.store.save(&state).await {
            Ok(()) => {
                inner.dirty = false;
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "failed to persist pool state");
                inner.dirty = true;
                Err(e)
            }
        }
    }
}
