//! HTTP server implementation using Axum.

use crate::changes::ChangeFeed;
use crate::handler::{handle_health, handle_rpc};
use axum::{
    routing::{get, post},
    Router,
};
use dat_desk::Desk;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Application state shared across handlers.
pub struct AppState {
    /// Core registry and view state
    pub desk: Desk,
    /// Change sequence bridged from the registry's subscriber hook
    pub changes: ChangeFeed,
    /// Author recorded when a create/import call carries none
    pub default_author: String,
    /// Raised by the `shutdown` RPC method; main waits on it
    pub shutdown_tx: watch::Sender<bool>,
}

/// Start the JSON-RPC HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0)
/// along with the shared state, which the caller keeps for shutdown.
pub async fn start_server(
    desk: Desk,
    default_author: String,
    host: &str,
    port: u16,
) -> anyhow::Result<(SocketAddr, Arc<AppState>)> {
    let changes = ChangeFeed::attach(desk.registry());
    let (shutdown_tx, _) = watch::channel(false);

    let state = Arc::new(AppState {
        desk,
        changes,
        default_author,
        shutdown_tx,
    });

    // Configure CORS for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/rpc", post(handle_rpc))
        .layer(cors)
        .with_state(state.clone());

    // Parse the address
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    // Bind to the address
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    // Spawn the server in the background
    tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("Server error");
    });

    Ok((actual_addr, state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dat_desk::DisconnectedNetwork;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_server_starts() {
        let temp_dir = TempDir::new().unwrap();
        let desk = Desk::open(
            temp_dir.path().join("data"),
            Arc::new(DisconnectedNetwork),
        )
        .await
        .unwrap();

        let (addr, state) = start_server(desk, "tester".into(), "127.0.0.1", 0)
            .await
            .unwrap();
        assert!(addr.port() > 0);
        assert!(!*state.shutdown_tx.subscribe().borrow());
        state.desk.shutdown().await;
    }
}
