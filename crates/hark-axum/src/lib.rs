//! Axum web adapter for the hark streaming recognition server.
//!
//! One TCP listener carries two kinds of traffic:
//!
//! - **WebSocket sessions** — a client upgrades on `GET /`, streams binary
//!   f32 PCM frames, and receives a JSON hypothesis text frame after every
//!   decode step, terminated by the text frame `"Done"`.
//! - **Plain HTTP GETs** — served from the configured document root
//!   (the streaming recorder UI), with two legacy pages shadowed by an
//!   inline redirect stub.
//!
//! Internally the crate is organized around two executors:
//!
//! - the **connection side** (the tokio runtime): frame parsing, registry
//!   mutation, and outbound sends, with all frames for one connection
//!   funneled through a single egress task;
//! - the **compute side** (the blocking thread pool): decode steps, fed by
//!   the [`dispatch::Dispatcher`]'s FIFO ready queue.

#![deny(unused_crate_dependencies)]

// Used by the integration tests under tests/ only.
#[cfg(test)]
use http_body_util as _;
#[cfg(test)]
use tokio_tungstenite as _;
#[cfg(test)]
use tower as _;

pub mod bootstrap;
pub mod dispatch;
pub mod handlers;
pub mod registry;
pub mod routes;
pub mod state;

// Re-export primary types
pub use bootstrap::{ServerConfig, build_context, start_server};
pub use dispatch::{Dispatcher, PushOutcome};
pub use registry::{ConnId, Registry};
pub use routes::create_router;
pub use state::{AppState, ServerContext};
