// SPDX-License-Identifier: MIT
//! Local content server — serves the built bundle over loopback so the
//! render driver can navigate to it.
//!
//! Static file resolution only (directory requests fall through to
//! `index.html`); no dynamic routing. The socket is bound and listening
//! before `start` returns, and stays bound until `stop` — every route render
//! is an HTTP request against it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::services::ServeDir;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("bundle directory not found: {0}")]
    MissingRoot(PathBuf),
    #[error("failed to bind 127.0.0.1:{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

/// Handle to the running server. Owned by the run orchestrator for the run's
/// lifetime; dropping it also shuts the server down.
pub struct ContentServer {
    port: u16,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ContentServer {
    /// Bind the port and start serving `root`. Fatal if the port is already
    /// bound or the bundle directory does not exist.
    pub async fn start(port: u16, root: &Path) -> Result<Self, ServerError> {
        if !root.is_dir() {
            return Err(ServerError::MissingRoot(root.to_path_buf()));
        }

        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { port, source })?;

        let router = Router::new().fallback_service(ServeDir::new(root));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async {
                // Resolves on stop() or when the handle is dropped.
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                error!(err = %e, "content server exited with an error");
            }
        });

        info!(port, root = %root.display(), "content server listening");
        Ok(Self {
            port,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Base URL the render driver navigates against.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Release the socket. Idempotent — double-stop and stop-after-crash are
    /// no-ops, so every teardown path may call this unconditionally.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}
