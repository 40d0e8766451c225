use std::future::Future;

use tokio::net::TcpListener;
use turtle_engine::{CancelHandle, CredentialService};

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::AppState;
use crate::router::build_router;

/// Turtle HTTP server.
pub struct TurtleServer {
    config: ServerConfig,
    service: CredentialService,
    shutdown: CancelHandle,
}

impl TurtleServer {
    /// Open the configured event log and build the service over it.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let log = config.open_log()?;
        let service = CredentialService::new(log, config.engine.clone())?;
        Ok(Self {
            config,
            service,
            shutdown: CancelHandle::new(),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(AppState {
            service: self.service.clone(),
            cancel: self.shutdown.token(),
        })
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
            }
        })
        .await
    }

    /// Serve until `signal` resolves, then cancel in-flight engine calls
    /// and drain.
    pub async fn serve_until<F>(self, signal: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        tracing::info!(
            addr = %self.config.bind_addr,
            wal = ?self.config.wal_path,
            "Turtle server listening"
        );

        let shutdown = self.shutdown;
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                signal.await;
                tracing::info!("shutdown requested; cancelling in-flight requests");
                shutdown.cancel();
            })
            .await?;

        tracing::info!("Turtle server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_memory() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            wal_path: None,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn server_construction() {
        let server = TurtleServer::new(in_memory()).unwrap();
        assert!(server.config().wal_path.is_none());
        let _router = server.router();
    }

    #[test]
    fn opens_a_wal_backed_log() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            wal_path: Some(dir.path().join("data/turtle.wal")),
            ..in_memory()
        };
        TurtleServer::new(config).unwrap();
        assert!(dir.path().join("data/turtle.wal").exists());
    }

    #[tokio::test]
    async fn stops_when_signalled() {
        let server = TurtleServer::new(in_memory()).unwrap();
        server.serve_until(async {}).await.unwrap();
    }
}
