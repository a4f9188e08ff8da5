//! Top-level view derivation.
//!
//! The shell shows the welcome screen exactly while the registry is empty.
//! There is no "dismissed" flag anywhere: adding the first dat leaves
//! onboarding, deleting the last one brings it back.

use crate::registry::DatRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Which top-level view the shell shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewState {
    /// Welcome screen for an empty registry.
    Onboarding,
    /// The main collection screen.
    Library,
}

impl ViewState {
    fn for_registry(registry: &DatRegistry) -> Self {
        if registry.is_empty() {
            ViewState::Onboarding
        } else {
            ViewState::Library
        }
    }
}

/// Publishes the current view, recomputed on every registry change.
pub struct AppState {
    rx: watch::Receiver<ViewState>,
}

impl AppState {
    /// Attach to a registry: seed from its current emptiness, then track
    /// every change notification.
    ///
    /// Holds only a weak reference, so an attached controller never keeps a
    /// dropped registry alive.
    pub fn attach(registry: &Arc<DatRegistry>) -> Self {
        let (tx, rx) = watch::channel(ViewState::for_registry(registry));
        let weak = Arc::downgrade(registry);
        registry.subscribe(Box::new(move || {
            if let Some(registry) = weak.upgrade() {
                let next = ViewState::for_registry(&registry);
                tx.send_if_modified(|current| {
                    if *current != next {
                        *current = next;
                        true
                    } else {
                        false
                    }
                });
            }
        }));
        Self { rx }
    }

    /// Current view.
    pub fn current(&self) -> ViewState {
        *self.rx.borrow()
    }

    /// Watch view transitions.
    pub fn watch(&self) -> watch::Receiver<ViewState> {
        self.rx.clone()
    }
}
