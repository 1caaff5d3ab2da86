//! Domain core for the hark streaming recognition server.
//!
//! This crate holds the engine port — the trait boundary behind which a
//! speech recognizer lives — together with the wire-facing hypothesis type
//! and the in-tree loopback engine. It knows nothing about sockets,
//! WebSockets, or HTTP; transport adapters depend on this crate, never the
//! other way around.

#![deny(unused_crate_dependencies)]

pub mod engine;

// Re-export key types for convenience
pub use engine::loopback::{LoopbackConfig, LoopbackEngine};
pub use engine::{EngineError, Hypothesis, SttEngine, SttStream};
