//! Swarm networking seam.
//!
//! The engine never speaks the wire protocol itself; a [`SyncNetwork`]
//! implementation provides it. Joining a link yields a [`NetworkSession`]
//! delivering peer and transfer events until the session leaves or the
//! provider drops the connection.

pub mod retry;

use crate::error::{DeskError, Result};
use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{mpsc, oneshot};

/// Link prefix for dat content addresses.
pub const LINK_PREFIX: &str = "dat://";
/// Hex characters in a link's key part.
const LINK_KEY_LEN: usize = 64;

/// One peer or transfer observation for a joined session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    PeerConnected,
    PeerDisconnected,
    Downloaded { bytes: u64 },
    Uploaded { bytes: u64 },
}

/// A live swarm membership for one dat.
///
/// Events arrive in order on the session's channel. The provider closing the
/// channel means the connection dropped; callers treat that as loss and
/// rejoin. `leave` tells the provider to drop the membership; provider-side
/// cleanup is fire-and-forget.
#[derive(Debug)]
pub struct NetworkSession {
    events: mpsc::Receiver<NetworkEvent>,
    leave_tx: oneshot::Sender<()>,
}

impl NetworkSession {
    /// Build a session plus the provider-side endpoint that feeds it.
    pub fn pair(capacity: usize) -> (NetworkSessionHandle, NetworkSession) {
        let (events_tx, events) = mpsc::channel(capacity);
        let (leave_tx, leave_rx) = oneshot::channel();
        (
            NetworkSessionHandle {
                events: events_tx,
                leave_rx,
            },
            NetworkSession { events, leave_tx },
        )
    }

    /// Receive the next event; `None` when the provider dropped the
    /// connection.
    pub async fn recv(&mut self) -> Option<NetworkEvent> {
        self.events.recv().await
    }

    /// Leave the swarm.
    pub fn leave(self) {
        let _ = self.leave_tx.send(());
    }
}

/// Provider side of a [`NetworkSession`]: push events into `events`, watch
/// `leave_rx` for the consumer leaving.
pub struct NetworkSessionHandle {
    pub events: mpsc::Sender<NetworkEvent>,
    pub leave_rx: oneshot::Receiver<()>,
}

/// Swarm capability consumed by sync sessions.
#[async_trait]
pub trait SyncNetwork: Send + Sync + 'static {
    /// Join the swarm for a link.
    ///
    /// Fails with [`DeskError::NetworkUnavailable`] when the swarm cannot be
    /// reached; that error is retryable.
    async fn join(&self, link: &str) -> Result<NetworkSession>;
}

/// Provider for running with no network at all: every join fails as
/// unavailable, so sessions sit in their rejoin loop until stopped.
pub struct DisconnectedNetwork;

#[async_trait]
impl SyncNetwork for DisconnectedNetwork {
    async fn join(&self, _link: &str) -> Result<NetworkSession> {
        Err(DeskError::NetworkUnavailable {
            message: "running offline".to_string(),
        })
    }
}

/// Mint a fresh share link: 32 random bytes, hex encoded.
pub fn new_link() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes[..]);
    format!("{}{}", LINK_PREFIX, hex::encode(bytes))
}

/// Check the `dat://<64 hex>` link shape.
pub fn is_valid_link(link: &str) -> bool {
    match link.strip_prefix(LINK_PREFIX) {
        Some(key) => key.len() == LINK_KEY_LEN && key.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
