//! Timer loop driving fetch → write cycles.
//!
//! The loop alternates between waiting (for the deadline or for shutdown) and running
//! exactly one cycle. Shutdown is only observed while waiting, so a cycle that has
//! started always runs to completion. The next deadline is measured from the end of
//! the previous cycle.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{provider::ForecastProvider, store::ForecastStore};

/// Delay before the first cycle, so the first row lands right after startup.
pub const FIRST_TICK: Duration = Duration::from_millis(1);

/// Per-cycle outcome counters, safe to read while the loop runs.
#[derive(Debug, Default)]
pub struct PollStats {
    cycles: AtomicU64,
    fetch_errors: AtomicU64,
    write_errors: AtomicU64,
    writes: AtomicU64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSnapshot {
    pub cycles: u64,
    pub fetch_errors: u64,
    pub write_errors: u64,
    pub writes: u64,
}

impl PollStats {
    pub fn snapshot(&self) -> PollSnapshot {
        PollSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Written,
    FetchFailed,
    WriteFailed,
}

/// Owned by the loop and never shared.
#[derive(Debug)]
struct PollState {
    deadline: Instant,
    running: bool,
}

#[derive(Debug)]
pub struct Poller {
    provider: Arc<dyn ForecastProvider>,
    store: Arc<dyn ForecastStore>,
    latitude: f64,
    longitude: f64,
    interval: Duration,
    stats: Arc<PollStats>,
}

impl Poller {
    pub fn new(
        provider: Arc<dyn ForecastProvider>,
        store: Arc<dyn ForecastStore>,
        latitude: f64,
        longitude: f64,
        interval: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            latitude,
            longitude,
            interval,
            stats: Arc::default(),
        }
    }

    pub fn stats(&self) -> Arc<PollStats> {
        Arc::clone(&self.stats)
    }

    /// Poll until `shutdown` is cancelled. Never returns because of a failed cycle.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            lat = self.latitude,
            long = self.longitude,
            interval = ?self.interval,
            "poller started"
        );

        // Cycles get their own token: shutdown must not abort a write half way.
        let cycle = CancellationToken::new();
        let mut state = PollState { deadline: Instant::now() + FIRST_TICK, running: true };

        while state.running {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("shutdown requested");
                    state.running = false;
                }
                _ = sleep_until(state.deadline) => {
                    self.run_cycle(&cycle).await;
                    state.deadline = Instant::now() + self.interval;
                }
            }
        }

        let s = self.stats.snapshot();
        info!(
            cycles = s.cycles,
            writes = s.writes,
            fetch_errors = s.fetch_errors,
            write_errors = s.write_errors,
            "poller stopped"
        );
    }

    /// One fetch followed, on success, by one write.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleOutcome {
        let n = self.stats.cycles.fetch_add(1, Ordering::Relaxed) + 1;

        let forecast = match self.provider.fetch(self.latitude, self.longitude, cancel).await {
            Ok(fc) => fc,
            Err(err) => {
                self.stats.fetch_errors.fetch_add(1, Ordering::Relaxed);
                error!(cycle = n, error = %err, reason = err.reason(), "cannot fetch forecast");
                return CycleOutcome::FetchFailed;
            }
        };

        match self.store.write(&forecast, cancel).await {
            Ok(()) => {
                self.stats.writes.fetch_add(1, Ordering::Relaxed);
                info!(cycle = n, temperature = forecast.temperature, "forecast stored");
                CycleOutcome::Written
            }
            Err(err) => {
                self.stats.write_errors.fetch_add(1, Ordering::Relaxed);
                warn!(cycle = n, error = %err, reason = err.reason(), "cannot write row to database");
                CycleOutcome::WriteFailed
            }
        }
    }
}
