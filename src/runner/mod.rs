//! The scheduling harness.
//!
//! Drives the strategy with strictly sequential ticks at a fixed interval: a
//! tick fully completes, including its blocking exchange calls, before the
//! next one is scheduled. Failures inside a tick are logged and retried on
//! the next interval; the loop itself only ends on the stop signal.

use crate::strategy::FundingArbStrategy;
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

pub struct RunLoop {
    strategy: FundingArbStrategy,
    tick_interval: Duration,
    stop: Arc<AtomicBool>,
    /// Unwind attempts after the stop signal before giving up
    max_shutdown_ticks: u32,
}

impl RunLoop {
    pub fn new(
        strategy: FundingArbStrategy,
        tick_interval: Duration,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            strategy,
            tick_interval,
            stop,
            max_shutdown_ticks: 10,
        }
    }

    /// Tick until the stop flag is raised, then attempt one graceful unwind.
    pub async fn run(&mut self) -> Result<()> {
        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.tick_interval.as_secs(),
            "Run loop started"
        );

        while !self.stop.load(Ordering::SeqCst) {
            ticker.tick().await;
            if self.stop.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.strategy.tick().await {
                error!(error = %e, "Tick failed; retrying next interval");
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Best-effort unwind of any open position, bounded so shutdown can
    /// never hang indefinitely.
    async fn shutdown(&mut self) {
        if self.strategy.is_settled() {
            info!("Shutdown: no open position");
            return;
        }

        info!("Shutdown: unwinding open position");
        for attempt in 1..=self.max_shutdown_ticks {
            if let Err(e) = self.strategy.tick().await {
                error!(error = %e, attempt, "Shutdown tick failed");
            }
            if self.strategy.is_settled() {
                info!("Shutdown: position closed");
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        warn!("Shutdown: position may not be fully closed; check the venue");
    }
}
