//! posterd - isometric miniature poster generation daemon
//!
//! Turns free-form user input (text and/or a reference image) into a
//! stylized 3D isometric miniature poster via two sequential Gemini calls:
//! prompt engineering, then image generation.

pub mod api;
pub mod config;
pub mod error;
pub mod gemini;
pub mod keys;
pub mod media;
pub mod pipeline;
pub mod policy;
pub mod retry;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

pub use config::Config;
use gemini::GeminiClient;
use keys::{EnvKeyProvider, KeyProvider};
use pipeline::Pipeline;
use policy::PolicyRegistry;

/// The posterd server instance
pub struct Server {
    config: Config,
    pipeline: Arc<Pipeline>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        let gemini = Arc::new(GeminiClient::new(&config.gemini));
        let keys: Arc<dyn KeyProvider> = Arc::new(EnvKeyProvider::default());
        let policy = PolicyRegistry::new().get(&config.policy);
        let pipeline = Arc::new(Pipeline::new(&config, gemini, keys, policy));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            pipeline,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Build the router
    fn router(&self) -> Router {
        api::router(self.pipeline.clone())
    }

    /// Run the server until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.server.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("posterd listening on {}", local_addr);

        let router = self.router();
        let mut shutdown_rx = self.shutdown_rx.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_rx.changed().await.ok();
            })
            .await?;

        info!("posterd shutdown complete");
        Ok(())
    }

    /// Signal the server to shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.server.bind_addr
    }
}
