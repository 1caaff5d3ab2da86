//! Server bootstrap — the composition root.
//!
//! This is the only place where the registry, the dispatcher, the engine,
//! and the router are wired together. Configuration is validated before the
//! listener exists: an unusable document root must stop the process before
//! it accepts a single connection.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use tokio::net::{TcpListener, TcpSocket};
use tracing::info;

use hark_core::SttEngine;

use crate::dispatch::Dispatcher;
use crate::registry::Registry;
use crate::routes;
use crate::state::{AppState, ServerContext};

/// Immutable server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP listen port.
    pub port: u16,
    /// Static file root; must contain `index.html`.
    pub doc_root: PathBuf,
    /// Silence appended when a client signals end of stream, so the engine
    /// can flush its right context.
    pub tail_padding: Duration,
    /// Ready-queue high-water mark for the decode dispatcher.
    pub queue_high_water: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 6006,
            doc_root: PathBuf::from("./web"),
            tail_padding: Duration::from_millis(300),
            queue_high_water: 1024,
        }
    }
}

impl ServerConfig {
    /// Check the parts of the configuration that must hold before the
    /// listener is opened.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.doc_root.as_os_str().is_empty() {
            bail!("document root is not set");
        }
        let index = self.doc_root.join("index.html");
        if !index.is_file() {
            bail!(
                "document root {} is missing index.html (looked for {})",
                self.doc_root.display(),
                index.display()
            );
        }
        Ok(())
    }

    /// Tail padding expressed in samples at `sample_rate`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    #[must_use]
    pub fn tail_padding_samples(&self, sample_rate: u32) -> usize {
        (f64::from(sample_rate) * self.tail_padding.as_secs_f64()) as usize
    }
}

/// Assemble the shared context from a configuration and an engine.
#[must_use]
pub fn build_context(config: ServerConfig, engine: Arc<dyn SttEngine>) -> AppState {
    let registry = Arc::new(Registry::new());
    let dispatcher = Dispatcher::new(Arc::clone(&registry), config.queue_high_water);
    Arc::new(ServerContext {
        engine,
        registry,
        dispatcher,
        config,
    })
}

/// Validate, bind, and serve until the process is stopped.
pub async fn start_server(config: ServerConfig, engine: Arc<dyn SttEngine>) -> anyhow::Result<()> {
    config.validate()?;

    let port = config.port;
    let state = build_context(config, engine);
    let app = routes::create_router(Arc::clone(&state));
    let listener = bind_reuseaddr(port)?;

    info!(
        port,
        sample_rate = state.engine.sample_rate(),
        doc_root = %state.config.doc_root.display(),
        "streaming recognition server listening"
    );

    axum::serve(listener, app)
        .await
        .context("server terminated unexpectedly")?;
    Ok(())
}

/// Bind the listen socket with `SO_REUSEADDR`, so restarts do not trip over
/// sockets lingering in TIME_WAIT.
fn bind_reuseaddr(port: u16) -> anyhow::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let socket = TcpSocket::new_v4().context("failed to create listen socket")?;
    socket
        .set_reuseaddr(true)
        .context("failed to set SO_REUSEADDR")?;
    socket
        .bind(addr)
        .with_context(|| format!("failed to bind {addr}"))?;
    socket.listen(1024).context("failed to listen")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_doc_root() {
        let config = ServerConfig {
            doc_root: PathBuf::new(),
            ..ServerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not set"));
    }

    #[test]
    fn validate_names_the_missing_index_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            doc_root: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("index.html"));
    }

    #[test]
    fn validate_accepts_a_doc_root_with_index() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        let config = ServerConfig {
            doc_root: dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tail_padding_defaults_to_300ms_of_samples() {
        let config = ServerConfig::default();
        assert_eq!(config.tail_padding_samples(16_000), 4_800);
    }
}
