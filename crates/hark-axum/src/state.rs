//! Shared application state type.

use std::sync::Arc;

use hark_core::SttEngine;

use crate::bootstrap::ServerConfig;
use crate::dispatch::Dispatcher;
use crate::registry::Registry;

/// Everything a handler needs: the engine, the session index, the decode
/// dispatcher, and the immutable server configuration.
pub struct ServerContext {
    pub engine: Arc<dyn SttEngine>,
    pub registry: Arc<Registry>,
    pub dispatcher: Arc<Dispatcher>,
    pub config: ServerConfig,
}

/// Application state shared across all handlers.
pub type AppState = Arc<ServerContext>;
