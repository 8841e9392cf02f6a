//! Periodic background save of usage counters
//!
//! Selections and success reports only mark the pool dirty. Embedders that
//! want those counters to survive a crash spawn this task; at most one
//! interval's worth of counters is lost. Cooldown and quota expiry do not
//! depend on it.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::pool::Pool;

/// Spawn a background task that calls `Pool::flush` every `interval`.
///
/// Save errors are logged and retried on the next tick. Returns a
/// `JoinHandle`; abort it to stop flushing.
pub fn spawn_flush_task(pool: Arc<Pool>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip the immediate first tick; the pool was just loaded
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match pool.flush().await {
                Ok(true) => debug!("flushed pool counters"),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "periodic flush failed, will retry"),
            }
        }
    })
}
