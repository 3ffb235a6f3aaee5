//! Periodic polling of active subscriptions.
//!
//! A single task ticks every [`DEFAULT_TICK_INTERVAL`]. Each tick selects the
//! subscriptions whose own interval has elapsed, runs their checks
//! concurrently (at most [`MAX_CONCURRENT_CHECKS`] at a time) and waits for
//! all of them before the next tick. One failing or panicking check never
//! affects its siblings.
//!
//! The last-check instants live only in memory; after a restart every
//! active subscription is due on the first tick.

use futures::{stream, FutureExt, StreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::relay::{CheckOutcome, Relay};
use crate::storage::{DatabaseError, Subscription, MIN_INTERVAL_MS};

/// How often due subscriptions are looked for
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Checks in flight at once within a tick
pub const MAX_CONCURRENT_CHECKS: usize = 10;

/// Summary of one tick, logged at info level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub delivered: usize,
    /// Checks that completed without delivering (nothing new, no link, race)
    pub suppressed: usize,
    pub failed: usize,
}

/// Interval used for scheduling; non-positive stored values fall back to one minute.
pub fn effective_interval(interval_ms: i64) -> Duration {
    let ms = if interval_ms > 0 {
        interval_ms
    } else {
        MIN_INTERVAL_MS
    };
    Duration::from_millis(ms as u64)
}

/// Due-selection state: when each subscription was last checked.
#[derive(Debug, Default)]
pub struct Scheduler {
    last_checked: HashMap<i64, Instant>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Picks the subscriptions due at `now` and marks them checked.
    ///
    /// Never-checked subscriptions are always due. Entries for ids absent
    /// from `active` are dropped.
    pub fn due(&mut self, active: Vec<Subscription>, now: Instant) -> Vec<Subscription> {
        self.last_checked
            .retain(|id, _| active.iter().any(|sub| sub.id == *id));

        let mut due = Vec::new();
        for sub in active {
            let is_due = match self.last_checked.get(&sub.id) {
                Some(last) => now.saturating_duration_since(*last) >= effective_interval(sub.interval_ms),
                None => true,
            };
            if is_due {
                self.last_checked.insert(sub.id, now);
                due.push(sub);
            }
        }
        due
    }

    /// Number of subscriptions with a recorded check
    pub fn tracked(&self) -> usize {
        self.last_checked.len()
    }

    /// Runs every due check and waits until all of them settled.
    ///
    /// # Errors
    ///
    /// Only loading the active subscriptions can fail; check failures are
    /// logged and counted in the report.
    pub async fn run_tick(&mut self, relay: &Relay) -> Result<TickReport, DatabaseError> {
        let active = relay.db().find_all_active().await?;
        let due = self.due(active, Instant::now());

        let mut report = TickReport {
            due: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            return Ok(report);
        }

        let checks: Vec<_> = due
            .iter()
            .map(|sub| async move {
                let result = catch_check_panic(relay.check_subscription(sub, false)).await;
                (sub, result)
            })
            .collect();
        let results: Vec<_> = stream::iter(checks)
            .buffer_unordered(MAX_CONCURRENT_CHECKS)
            .collect()
            .await;

        for (sub, result) in results {
            match result {
                Ok(Ok(CheckOutcome::Delivered { .. })) => report.delivered += 1,
                Ok(Ok(outcome)) => {
                    tracing::debug!(id = sub.id, feed = %sub.url, outcome = ?outcome, "Nothing delivered");
                    report.suppressed += 1;
                }
                Ok(Err(e)) => {
                    tracing::warn!(
                        id = sub.id,
                        feed = %sub.url,
                        channel = %sub.target,
                        error = %e,
                        "Check failed"
                    );
                    report.failed += 1;
                }
                Err(panic_msg) => {
                    tracing::error!(
                        id = sub.id,
                        feed = %sub.url,
                        channel = %sub.target,
                        error = %panic_msg,
                        "Check panicked"
                    );
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}

/// Runs a check, turning a panic into its message.
async fn catch_check_panic<F, T>(future: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            }
        })
}

/// Running scheduler task.
pub struct SchedulerHandle {
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops ticking. A tick in progress is abandoned at its next await.
    pub async fn stop(self) -> Result<(), tokio::task::JoinError> {
        let _ = self.cancel_tx.send(());
        self.join.await
    }
}

/// Spawns the tick loop; the first tick fires immediately.
pub fn spawn_scheduler(relay: Arc<Relay>, tick_interval: Duration) -> SchedulerHandle {
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);

    let join = tokio::spawn(async move {
        let mut scheduler = Scheduler::new();
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(tick_secs = tick_interval.as_secs(), "Scheduler started");

        loop {
            tokio::select! {
                _ = cancel_rx.recv() => {
                    tracing::info!("Scheduler shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = cancel_rx.recv() => {
                            tracing::info!("Scheduler shutdown requested during tick");
                            break;
                        }
                        result = scheduler.run_tick(&relay) => match result {
                            Ok(report) if report.due > 0 => tracing::info!(
                                due = report.due,
                                delivered = report.delivered,
                                suppressed = report.suppressed,
                                failed = report.failed,
                                "Tick complete"
                            ),
                            Ok(_) => {}
                            Err(e) => tracing::error!(error = %e, "Loading subscriptions failed"),
                        },
                    }
                }
            }
        }
    });

    SchedulerHandle { cancel_tx, join }
}
