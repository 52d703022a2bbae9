//! Keep-alive probes and the time-based rekey check.
//!
//! A probe is a `keepalive@openssh.com` global request with want_reply,
//! sent when nothing has been read for one interval. Any received packet
//! resets the miss counter. More than `keepalive_count_max` consecutive
//! misses is fatal.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fynx_platform::FynxError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::Shared;

/// Request name used for probes.
pub const KEEPALIVE_REQUEST: &str = "keepalive@openssh.com";

/// How often the rekey deadline is checked when keep-alive is off.
const REKEY_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Read activity, updated by the reader task.
#[derive(Debug)]
pub(crate) struct KeepaliveState {
    missed: AtomicU32,
    last_read: Mutex<Instant>,
}

impl Default for KeepaliveState {
    fn default() -> Self {
        Self {
            missed: AtomicU32::new(0),
            last_read: Mutex::new(Instant::now()),
        }
    }
}

impl KeepaliveState {
    pub(crate) fn packet_received(&self) {
        self.missed.store(0, Ordering::Relaxed);
        *self.last_read.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    pub(crate) fn idle_for(&self) -> Duration {
        self.last_read
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }

    /// Counts one unanswered probe and returns the new total.
    pub(crate) fn record_probe(&self) -> u32 {
        self.missed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn missed(&self) -> u32 {
        self.missed.load(Ordering::Relaxed)
    }
}

/// Starts the session timer.
pub(crate) fn spawn(shared: Arc<Shared>) -> JoinHandle<()> {
    let keepalive = shared.config.keepalive_interval;
    let count_max = shared.config.keepalive_count_max;
    let period = keepalive.unwrap_or(REKEY_CHECK_INTERVAL);

    tokio::spawn(async move {
        debug!(?keepalive, "Session timer started");
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if shared.is_closed() {
                break;
            }

            if shared.rekey_due(0) {
                if let Err(e) = shared.start_kex().await {
                    shared.fail(e).await;
                    break;
                }
            }

            let Some(interval) = keepalive else {
                continue;
            };
            if shared.keepalive.idle_for() < interval {
                continue;
            }
            let missed = shared.keepalive.record_probe();
            if missed > count_max {
                warn!(missed = count_max, "Server not responding to keep-alive");
                shared
                    .fail(FynxError::FlowControlTimeout(format!(
                        "no response to {} keep-alive probes",
                        count_max
                    )))
                    .await;
                break;
            }
            debug!(missed, "Sending keep-alive probe");
            if let Err(e) = shared.send_keepalive().await {
                debug!(error = %e, "Keep-alive probe not sent");
                break;
            }
        }
        debug!("Session timer stopped");
    })
}
