//! Development server with live reload
//!
//! Provides the HTTP side of livedir:
//! - Serves files from the served root, injecting the reload script into HTML
//! - Upgrades `/ws` requests to duplex channels held in the [`ConnectionRegistry`]
//! - Shuts down on a [`CancellationToken`], giving in-flight requests a bounded grace period

use crate::{
    error::LivedirError, registry::ConnectionRegistry, serve::serve_static, ws::ws_upgrade,
};
use axum::{routing::get, Router};
use std::{
    net::{Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio::{net::TcpListener, sync::watch};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// How long in-flight requests get to finish once shutdown starts.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Route of the duplex reload channel.
pub const WS_ROUTE: &str = "/ws";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Running,
    ShuttingDown,
}

/// Shared state for the route handlers
#[derive(Clone)]
pub struct AppState {
    /// Root directory being served
    pub root: Arc<PathBuf>,
    /// Open browser channels
    pub registry: ConnectionRegistry,
}

/// Development server for a directory with live reload
pub struct DevServer {
    root: PathBuf,
    port: u16,
    registry: ConnectionRegistry,
    state_tx: watch::Sender<ServerState>,
}

impl DevServer {
    /// Create a new dev server
    ///
    /// # Arguments
    /// * `root` - Directory to serve
    /// * `port` - Port to bind on all interfaces
    /// * `registry` - Registry shared with the filesystem watcher
    pub fn new(root: PathBuf, port: u16, registry: ConnectionRegistry) -> Self {
        let (state_tx, _) = watch::channel(ServerState::Stopped);
        Self {
            root,
            port,
            registry,
            state_tx,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ServerState> {
        self.state_tx.subscribe()
    }

    pub fn router(&self) -> Router {
        router(self.root.clone(), self.registry.clone())
    }

    /// Bind the configured port and serve until `cancel` fires.
    pub async fn serve(self, cancel: CancellationToken) -> Result<(), LivedirError> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| LivedirError::Server(format!("could not bind {addr}: {e}")))?;
        self.serve_with_listener(listener, cancel).await
    }

    /// Serve on an already bound `listener` until `cancel` fires.
    ///
    /// Returns an error if the server stops on its own before cancellation. After
    /// cancellation, connections still open once [`SHUTDOWN_GRACE`] has elapsed are abandoned:
    /// only the accept loop is aborted. axum runs each connection on its own task, so those
    /// requests (and upgraded channels) keep running until the tokio runtime is dropped.
    pub async fn serve_with_listener(
        self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), LivedirError> {
        let local_addr = listener.local_addr()?;
        let app = self.router();

        let shutdown = cancel.clone();
        let mut server_task = tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        });

        self.state_tx.send_replace(ServerState::Running);
        tracing::info!("Serving on: http://localhost:{}", local_addr.port());
        tracing::info!("Serving directory: {}", self.root.display());

        tokio::select! {
            result = &mut server_task => {
                self.state_tx.send_replace(ServerState::Stopped);
                return match result {
                    Ok(Ok(())) => Err(LivedirError::Server(
                        "server stopped before shutdown was requested".to_string(),
                    )),
                    Ok(Err(e)) => Err(LivedirError::Server(format!("Server error: {e}"))),
                    Err(e) => Err(LivedirError::Server(format!("server task failed: {e}"))),
                };
            }
            _ = cancel.cancelled() => {}
        }

        self.state_tx.send_replace(ServerState::ShuttingDown);
        tracing::info!("Shutting down server, waiting up to {:?}", SHUTDOWN_GRACE);

        match tokio::time::timeout(SHUTDOWN_GRACE, &mut server_task).await {
            Ok(Ok(Ok(()))) => tracing::info!("Dev server shut down"),
            Ok(Ok(Err(e))) => tracing::warn!("Server error during shutdown: {}", e),
            Ok(Err(e)) => tracing::warn!("Server task failed during shutdown: {}", e),
            Err(_) => {
                tracing::warn!(
                    "Dev server shutdown timed out after {:?}, dropping open connections",
                    SHUTDOWN_GRACE
                );
                server_task.abort();
            }
        }

        self.state_tx.send_replace(ServerState::Stopped);
        Ok(())
    }
}

/// Build the router: `/ws` upgrades to a reload channel, everything else is a static file.
pub fn router(root: PathBuf, registry: ConnectionRegistry) -> Router {
    let state = AppState {
        root: Arc::new(root),
        registry,
    };
    Router::new()
        .route(WS_ROUTE, get(ws_upgrade))
        .fallback(serve_static)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
