//! Dat Desk - registry and sync engine for Dat Desktop.
//!
//! This crate is the core of the desktop app: it tracks shared folders
//! ("dats"), persists the registry across restarts, runs one sync session
//! per dat against a pluggable swarm network, and derives the top-level
//! view the shell should show. It can be used programmatically without any
//! HTTP/RPC layer.
//!
//! # Example
//!
//! ```rust,ignore
//! use dat_desk::{Desk, DisconnectedNetwork};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> dat_desk::Result<()> {
//!     let desk = Desk::open("/path/to/data", Arc::new(DisconnectedNetwork)).await?;
//!
//!     let dat = desk.registry().create("/home/me/photos", "karissa").await?;
//!     println!("Sharing {} at {}", dat.title, dat.link);
//!
//!     for dat in desk.registry().list().await {
//!         println!("{}: {} peers", dat.title, dat.stats.peers);
//!     }
//!
//!     desk.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dat;
pub mod error;
pub mod metadata;
pub mod network;
pub mod registry;
pub mod state;
pub mod store;

mod session;

// Re-export commonly used types
pub use config::{default_data_dir, AppConfig, NotifyConfig, StoreConfig, SyncConfig};
pub use dat::{format_size, Dat, DatOrigin, DatStatus, NetworkStats};
pub use error::{DeskError, Result};
pub use metadata::{DatManifest, FolderMetadata};
pub use network::retry::RetryConfig;
pub use network::{
    is_valid_link, new_link, DisconnectedNetwork, NetworkEvent, NetworkSession,
    NetworkSessionHandle, SyncNetwork,
};
pub use registry::{ChangeCallback, DatRegistry, RegistryOptions};
pub use state::{AppState, ViewState};
pub use store::{DatRecord, RegistryStore};

use std::path::PathBuf;
use std::sync::Arc;

/// Everything the desktop shell needs, wired together.
pub struct Desk {
    registry: Arc<DatRegistry>,
    state: AppState,
}

impl Desk {
    /// Open the registry at `data_dir` and attach view-state tracking.
    pub async fn open(
        data_dir: impl Into<PathBuf>,
        network: Arc<dyn SyncNetwork>,
    ) -> Result<Self> {
        Self::open_with(data_dir, network, RegistryOptions::default()).await
    }

    /// Open with explicit registry tuning.
    pub async fn open_with(
        data_dir: impl Into<PathBuf>,
        network: Arc<dyn SyncNetwork>,
        options: RegistryOptions,
    ) -> Result<Self> {
        let registry = DatRegistry::open_with(data_dir, network, options).await?;
        let state = AppState::attach(&registry);
        Ok(Self { registry, state })
    }

    pub fn registry(&self) -> &Arc<DatRegistry> {
        &self.registry
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Stop all sync sessions, bounded per session. Call before exit.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}
