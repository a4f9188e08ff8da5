//! Sync session lifecycle.
//!
//! One session per tracked dat, running on its own task: join the swarm with
//! exponential backoff, forward peer and transfer events to the registry,
//! leave on stop. Join failures never escape the task; from the outside a
//! struggling session just stays in `Starting`.

use crate::network::retry::RetryConfig;
use crate::network::{NetworkEvent, SyncNetwork};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle of a sync session. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    /// Joining the swarm, or waiting out a backoff delay between attempts.
    Starting,
    /// Joined; events are flowing.
    Active,
    /// Leaving the swarm after a stop request.
    Stopping,
    Stopped,
}

/// One stats observation forwarded to the registry.
#[derive(Debug, Clone)]
pub(crate) struct StatsUpdate {
    pub id: String,
    pub event: NetworkEvent,
}

/// Handle to a running sync session.
pub(crate) struct SyncSession {
    id: String,
    stop_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<SessionState>,
    task: JoinHandle<()>,
}

impl SyncSession {
    /// Spawn a session syncing `link` on behalf of dat `id`.
    pub(crate) fn spawn(
        id: String,
        link: String,
        network: Arc<dyn SyncNetwork>,
        retry: RetryConfig,
        updates_tx: mpsc::Sender<StatsUpdate>,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SessionState::Starting);
        let task = tokio::spawn(run_session(
            id.clone(),
            link,
            network,
            retry,
            updates_tx,
            stop_rx,
            state_tx,
        ));
        Self {
            id,
            stop_tx,
            state_rx,
            task,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    #[cfg(test)]
    pub(crate) fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// Signal stop and wait for the task to finish, bounded by `timeout`.
    ///
    /// Returns `true` on a clean stop. On timeout the task is aborted and
    /// the session force-discarded; whatever swarm cleanup the provider owes
    /// happens on its side when the event channel closes.
    pub(crate) async fn stop(mut self, timeout: Duration) -> bool {
        let _ = self.stop_tx.send(true);
        match tokio::time::timeout(timeout, &mut self.task).await {
            Ok(_) => {
                debug!("Session {} stopped cleanly", self.id);
                true
            }
            Err(_) => {
                warn!(
                    "Session {} did not stop within {:?}, discarding",
                    self.id, timeout
                );
                self.task.abort();
                false
            }
        }
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        // Dropping the handle without a stop() is registry teardown; don't
        // leave the task running detached
        self.task.abort();
    }
}

/// Why the active event loop ended.
enum ActiveExit {
    StopRequested,
    ConnectionLost,
}

async fn run_session(
    id: String,
    link: String,
    network: Arc<dyn SyncNetwork>,
    retry: RetryConfig,
    updates_tx: mpsc::Sender<StatsUpdate>,
    mut stop_rx: watch::Receiver<bool>,
    state_tx: watch::Sender<SessionState>,
) {
    'outer: loop {
        // Join with backoff. Each failed attempt pushes the next delay out
        // exponentially; the stop signal interrupts both the join call and
        // the sleep.
        let mut attempt: u32 = 0;
        let mut session = loop {
            if *stop_rx.borrow() {
                break 'outer;
            }

            let joined = tokio::select! {
                joined = network.join(&link) => joined,
                _ = stop_rx.changed() => break 'outer,
            };

            match joined {
                Ok(session) => break session,
                Err(e) => {
                    let delay = retry.calculate_delay(attempt);
                    attempt = attempt.saturating_add(1);
                    debug!(
                        "Session {} join attempt {} failed ({}), retrying in {:?}",
                        id, attempt, e, delay
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = stop_rx.changed() => break 'outer,
                    }
                }
            }
        };

        let _ = state_tx.send(SessionState::Active);
        info!("Session {} joined the swarm", id);

        // Forward events until stop or connection loss.
        let exit = loop {
            tokio::select! {
                event = session.recv() => match event {
                    Some(event) => {
                        let update = StatsUpdate { id: id.clone(), event };
                        if updates_tx.send(update).await.is_err() {
                            // Registry apply loop is gone; nothing left to
                            // report to.
                            break ActiveExit::StopRequested;
                        }
                    }
                    None => break ActiveExit::ConnectionLost,
                },
                _ = stop_rx.changed() => break ActiveExit::StopRequested,
            }
        };

        match exit {
            ActiveExit::StopRequested => {
                let _ = state_tx.send(SessionState::Stopping);
                session.leave();
                break 'outer;
            }
            ActiveExit::ConnectionLost => {
                warn!("Session {} lost its swarm connection, rejoining", id);
                let _ = state_tx.send(SessionState::Starting);
            }
        }
    }

    let _ = state_tx.send(SessionState::Stopped);
    debug!("Session {} finished", id);
}
