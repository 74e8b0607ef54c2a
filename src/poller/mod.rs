//! Scheduled auto-reply cycles.
//!
//! Background loop that runs one engine cycle per interval until shutdown.
//! Overlap is handled by the engine's single-flight guard: a tick that
//! lands while the previous cycle is still running is skipped, not queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::autoreply::{AutoReplyEngine, EngineError};

/// Default seconds between cycles
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Run auto-reply cycles until the shutdown channel flips.
pub async fn poll_loop(
    engine: Arc<AutoReplyEngine>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        match engine.run_cycle().await {
            Ok(summary) if summary.replies_sent > 0 => {
                info!(
                    connector = %engine.connector_id(),
                    cycle = %summary.cycle_id,
                    unread_chats = summary.unread_chats,
                    replies = summary.replies_sent,
                    "auto-reply cycle complete"
                );
            }
            Ok(summary) => {
                debug!(
                    connector = %engine.connector_id(),
                    cycle = %summary.cycle_id,
                    unread_chats = summary.unread_chats,
                    "auto-reply cycle complete, nothing to send"
                );
            }
            Err(EngineError::CycleInProgress) => {
                warn!(
                    connector = %engine.connector_id(),
                    "previous auto-reply cycle still running, skipping tick"
                );
            }
            Err(e) => {
                warn!(connector = %engine.connector_id(), error = %e, "auto-reply cycle failed");
            }
        }
    }
    debug!(connector = %engine.connector_id(), "auto-reply poller stopped");
}
