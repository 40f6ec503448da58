/// Expiry sweeper: a single async task that deletes messages whose
/// countdown has run out.
///
/// The store does the deleting; the sweeper only drives it on a timer and
/// reports what was removed so the application can drop it from view.
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::clock::NetworkClock;
use crate::store::ExpirySweep;
use crate::types::MessageKey;

/// Buffered batches of removed keys.
pub const REMOVED_CHANNEL_CAPACITY: usize = 64;

/// Handle to a running sweeper.
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.task.await {
            tracing::warn!("sweeper task failed: {e}");
        }
    }
}

/// Spawn the sweeper on the current tokio runtime.
///
/// Returns the handle and a receiver of removed-key batches. Dropping the
/// receiver does not stop sweeping; dropping the handle does.
///
/// Every removed key is reported exactly once while the receiver is alive.
/// When the channel is full, keys are held back and merged into the next
/// batch instead of being dropped.
pub fn spawn_sweeper<S, C>(
    store: Arc<S>,
    clock: Arc<C>,
    interval: Duration,
) -> (SweeperHandle, mpsc::Receiver<Vec<MessageKey>>)
where
    S: ExpirySweep + ?Sized + 'static,
    C: NetworkClock + ?Sized + 'static,
{
    let (removed_tx, removed_rx) = mpsc::channel(REMOVED_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(sweep_loop(store, clock, interval, removed_tx, shutdown_rx));
    (
        SweeperHandle {
            shutdown_tx: Some(shutdown_tx),
            task,
        },
        removed_rx,
    )
}

async fn sweep_loop<S, C>(
    store: Arc<S>,
    clock: Arc<C>,
    interval: Duration,
    removed_tx: mpsc::Sender<Vec<MessageKey>>,
    mut shutdown_rx: oneshot::Receiver<()>,
) where
    S: ExpirySweep + ?Sized,
    C: NetworkClock + ?Sized,
{
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tracing::info!("expiry sweeper started ({interval:?})");

    // Removed but not yet delivered.
    let mut pending: Vec<MessageKey> = Vec::new();

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => break,
            _ = tick.tick() => {
                match store.remove_expired(clock.now_ms()) {
                    Ok(removed) if removed.is_empty() => {}
                    Ok(removed) => {
                        tracing::debug!("sweeper removed {} expired messages", removed.len());
                        pending.extend(removed);
                    }
                    Err(e) => tracing::warn!("sweeper: remove_expired failed: {e}"),
                }
                if !pending.is_empty() {
                    match removed_tx.try_send(std::mem::take(&mut pending)) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(batch)) => {
                            tracing::debug!("sweeper: channel full, holding {} keys", batch.len());
                            pending = batch;
                        }
                        Err(mpsc::error::TrySendError::Closed(batch)) => {
                            tracing::debug!("sweeper: no receiver for {} removed keys", batch.len());
                        }
                    }
                }
            }
        }
    }

    if !pending.is_empty() {
        tracing::warn!("sweeper stopped with {} unreported removals", pending.len());
    }
    tracing::info!("expiry sweeper stopped");
}
