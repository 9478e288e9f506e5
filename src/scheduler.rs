//! Keepalive pings and periodic maintenance for one connection.
//!
//! Both timers share a per-connection tick guard. A tick that cannot take the
//! guard within `Timeouts::tick_guard` is skipped rather than queued, so a
//! slow maintenance hook never piles up pings behind it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::connection::Connection;
use crate::protocol::generate_mask_key;

/// Work run periodically while a connection is open.
#[async_trait]
pub trait MaintenanceHook: Send + Sync {
    /// Called once per maintenance interval.
    async fn run(&self, conn: &Connection);
}

/// Hook that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMaintenance;

#[async_trait]
impl MaintenanceHook for NoopMaintenance {
    async fn run(&self, conn: &Connection) {
        debug!(remote = %conn.remote_addr(), "maintenance tick");
    }
}

/// Running timers of one connection.
#[derive(Debug)]
pub struct Scheduler {
    cancel: CancellationToken,
    skipped: Arc<AtomicU64>,
}

impl Scheduler {
    /// Start the timers enabled in the connection's configuration.
    ///
    /// Timers stop on their own when the connection's token is cancelled.
    pub fn start(conn: &Connection, hook: Arc<dyn MaintenanceHook>) -> Self {
        let config = conn.config();
        let cancel = conn.cancellation_token().child_token();
        let skipped = Arc::new(AtomicU64::new(0));
        let guard = Arc::new(Mutex::new(()));
        let guard_wait = config.timeouts.tick_guard;

        if config.keepalive.enabled {
            let ticker = Ticker {
                period: config.keepalive.interval,
                guard_wait,
                guard: guard.clone(),
                skipped: skipped.clone(),
                cancel: cancel.clone(),
            };
            tokio::spawn(keepalive(conn.clone(), ticker));
        }

        if config.maintenance.enabled {
            let ticker = Ticker {
                period: config.maintenance.interval,
                guard_wait,
                guard,
                skipped: skipped.clone(),
                cancel: cancel.clone(),
            };
            tokio::spawn(maintenance(conn.clone(), hook, ticker));
        }

        Self { cancel, skipped }
    }

    /// Stop both timers. Idempotent.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            trace!("stopping scheduler");
            self.cancel.cancel();
        }
    }

    /// Whether the timers have been stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Ticks skipped because the guard was held too long.
    #[must_use]
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Ticker {
    period: Duration,
    guard_wait: Duration,
    guard: Arc<Mutex<()>>,
    skipped: Arc<AtomicU64>,
    cancel: CancellationToken,
}

impl Ticker {
    /// Wait for the next tick and take the guard.
    ///
    /// `None` once cancelled. Skipped ticks loop back to waiting.
    async fn next(
        &self,
        interval: &mut tokio::time::Interval,
        name: &'static str,
    ) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => return None,
                _ = interval.tick() => {}
            }
            match tokio::time::timeout(self.guard_wait, self.guard.lock()).await {
                Ok(held) => return Some(held),
                Err(_) => {
                    self.skipped.fetch_add(1, Ordering::Relaxed);
                    debug!(timer = name, "previous tick still running, skipping");
                }
            }
        }
    }

    fn interval(&self) -> tokio::time::Interval {
        let mut interval = tokio::time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    }
}

fn random_token() -> u64 {
    let hi = u32::from_be_bytes(generate_mask_key());
    let lo = u32::from_be_bytes(generate_mask_key());
    (u64::from(hi) << 32) | u64::from(lo)
}

async fn keepalive(conn: Connection, ticker: Ticker) {
    let mut interval = ticker.interval();
    let mut counter: u64 = 0;

    while let Some(_held) = ticker.next(&mut interval, "keepalive").await {
        if !conn.is_open() {
            break;
        }
        counter += 1;
        let payload = format!("{}:{:016x}", counter, random_token());
        trace!(remote = %conn.remote_addr(), counter, "keepalive ping");
        if conn.send_ping(payload.into_bytes()).await.is_err() {
            break;
        }
    }
    trace!("keepalive stopped");
}

async fn maintenance(conn: Connection, hook: Arc<dyn MaintenanceHook>, ticker: Ticker) {
    let mut interval = ticker.interval();

    while let Some(_held) = ticker.next(&mut interval, "maintenance").await {
        if !conn.is_open() {
            break;
        }
        hook.run(&conn).await;
    }
    trace!("maintenance stopped");
}
