//! Change notifications bridged to a long-pollable sequence number.
//!
//! The Electron renderer cannot hold a Rust callback, so the registry's
//! subscriber hook is folded into a monotonic counter here. The frontend
//! long-polls `wait_for_change` with the last sequence it saw and refreshes
//! whenever a newer one comes back.

use dat_desk::DatRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Longest a `wait_for_change` call may park before answering anyway.
/// Keeps proxies and the renderer's fetch timeout out of the picture.
pub const MAX_WAIT: Duration = Duration::from_secs(30);

/// Monotonic change counter fed by the registry's subscriber hook.
pub struct ChangeFeed {
    seq: watch::Receiver<u64>,
}

impl ChangeFeed {
    /// Subscribe to the registry. Coalescing happens upstream, so one
    /// sequence step may cover a whole burst of mutations.
    pub fn attach(registry: &Arc<DatRegistry>) -> Self {
        let (tx, rx) = watch::channel(0u64);
        registry.subscribe(Box::new(move || {
            tx.send_modify(|seq| *seq += 1);
        }));
        Self { seq: rx }
    }

    /// Latest sequence number.
    pub fn current(&self) -> u64 {
        *self.seq.borrow()
    }

    /// Wait until the sequence passes `since`, or until `wait` elapses.
    /// Returns the sequence current at that moment either way; the caller
    /// compares it against `since` to decide whether anything changed.
    pub async fn wait_beyond(&self, since: u64, wait: Duration) -> u64 {
        let mut rx = self.seq.clone();
        let wait = wait.min(MAX_WAIT);
        let _ = tokio::time::timeout(wait, async {
            loop {
                if *rx.borrow() > since {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        })
        .await;
        let current = *rx.borrow();
        current
    }
}
