//! Backoff scheduler, a repeating timer with a growing interval.
//!
//! Drives handshake retransmission. The first firing happens after the
//! initial delay; every later delay is the previous one multiplied by the
//! growth factor, capped at the maximum. No jitter. Runs until cancelled.
//!
//! ```text
//!   start ──50ms──▶ fire ──100ms──▶ fire ──200ms──▶ fire ── ... ──300s──▶ fire
//!                                                     ▲
//!                                  cancel() ──────────┘ (no further fires)
//! ```

use core::time::Duration;
use std::sync::Arc;

use async_io_mini::Timer;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future;
use log::debug;

use crate::config::BackoffConfig;
use crate::ports::{Spawner, spawn_detached};

// ═══════════════════════════════════════════════════════════════
//  Delay sequence
// ═══════════════════════════════════════════════════════════════

/// Infinite sequence of delays between firings.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    growth_factor: u32,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        let max = Duration::from_millis(config.max_delay_ms);
        Self {
            next: Duration::from_millis(config.initial_delay_ms).min(max),
            max,
            growth_factor: config.growth_factor,
        }
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = current
            .checked_mul(self.growth_factor)
            .map_or(self.max, |grown| grown.min(self.max));
        Some(current)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Timer task
// ═══════════════════════════════════════════════════════════════

/// Stops a running backoff task. Cloning shares the same task.
#[derive(Clone)]
pub struct CancelHandle {
    signal: Arc<Signal<CriticalSectionRawMutex, ()>>,
}

impl CancelHandle {
    /// Cancel the task. Idempotent; a pending firing never runs.
    pub fn cancel(&self) {
        self.signal.signal(());
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.signaled()
    }
}

/// Spawn a task that calls `action` on the backoff schedule until the
/// returned handle is cancelled.
pub fn start<F>(spawner: &dyn Spawner, config: &BackoffConfig, action: F) -> CancelHandle
where
    F: Fn() + Send + 'static,
{
    let handle = CancelHandle {
        signal: Arc::new(Signal::new()),
    };
    let cancel = handle.clone();
    let delays = Backoff::new(config);

    spawn_detached(spawner, async move {
        for delay in delays {
            let cancelled = future::or(
                async {
                    Timer::after(delay).await;
                    false
                },
                async {
                    cancel.signal.wait().await;
                    // Leave the flag set for is_cancelled().
                    cancel.signal.signal(());
                    true
                },
            )
            .await;

            if cancelled || cancel.is_cancelled() {
                break;
            }
            action();
        }
        debug!("backoff: stopped");
    });

    handle
}
