//! Periodic inactivity sweep.
//!
//! Runs [`RefreshTokenLedger::sweep_inactive`] on an interval. This is
//! maintenance work outside the request path; a failed pass is logged and
//! retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::ledger::RefreshTokenLedger;

/// Handle to control a running sweep task.
pub struct SweepHandle {
    shutdown: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Request graceful shutdown and wait for the task to finish.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

/// Background inactivity sweep over a shared ledger.
pub struct InactivitySweep {
    ledger: Arc<RefreshTokenLedger>,
    interval: Duration,
}

impl InactivitySweep {
    pub fn new(ledger: Arc<RefreshTokenLedger>, interval: Duration) -> Self {
        Self { ledger, interval }
    }

    /// Spawn the sweep loop on the current runtime.
    pub fn spawn(self) -> SweepHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The immediate first tick would sweep at startup before any
            // traffic; skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match self.ledger.sweep_inactive().await {
                            Ok(revoked) if revoked > 0 => {
                                info!(revoked, "inactivity sweep pass complete");
                            }
                            Ok(_) => {}
                            Err(e) => {
                                error!(error = %e, "inactivity sweep pass failed");
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("inactivity sweep shutting down");
                        break;
                    }
                }
            }
        });

        SweepHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        }
    }
}
