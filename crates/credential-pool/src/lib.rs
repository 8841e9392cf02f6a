//! Rotation pool for rate-limited, revocable credentials
//!
//! Many concurrent workers share a small set of accounts against one external
//! service. The pool hands out an eligible account per request, accounts for
//! per-account interval and daily quota limits, and degrades accounts that
//! keep failing. Account secrets are opaque strings; the pool only sees
//! success/failure signals from callers.
//!
//! Account lifecycle:
//! 1. Admin adds an account → assigned a fresh id, status `Active`
//! 2. Worker calls `select()` → least recently used eligible account, usage counted
//! 3. Worker calls `report_outcome()` → health counters updated
//! 4. `cooldown_threshold` consecutive failures → `CoolingDown` for `cooldown_secs`
//! 5. `disable_threshold` consecutive failures → `Disabled` until an admin re-enables
//! 6. Cooldown and quota day rollover are evaluated lazily against the clock

pub mod account;
pub mod clock;
pub mod error;
pub mod flush;
pub mod import;
pub mod metrics;
pub mod policy;
pub mod pool;
pub mod settings;
pub mod store;

pub use account::{
    Account, AccountId, AccountReport, AccountStatus, AccountUpdate, Ineligible, NewAccount,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use flush::spawn_flush_task;
pub use import::{ImportEntry, ImportReport, parse_import, split_env_secrets};
pub use pool::{Pool, PoolHealth, PoolSummary, SelectedAccount};
pub use settings::{MAX_WAIT_SECS, PoolSettings};
pub use store::{JsonFileStore, MemoryStore, PoolState, SNAPSHOT_VERSION, StateStore};
