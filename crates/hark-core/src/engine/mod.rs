//! Engine port — trait abstraction over the speech recognizer.
//!
//! The recognizer is an external capability: it owns the models, the feature
//! pipeline, and the per-session decoding state. The server reaches it only
//! through [`SttEngine`] (session factory) and [`SttStream`] (one session's
//! decoding state). Decode steps are deliberately *blocking* calls — the
//! dispatcher runs them on the blocking thread pool, so the port stays free
//! of async plumbing and a backend can wrap any FFI recognizer directly.
//!
//! ## Threading contract
//!
//! - A stream is shared via `Arc` between the connection that feeds it and
//!   the dispatcher that decodes it, so every method takes `&self`;
//!   implementations use interior mutability.
//! - Backends must tolerate concurrent [`SttStream::decode`] calls on
//!   *distinct* streams. Callers never invoke `decode` on the same stream
//!   concurrently — the dispatcher's active set guarantees that.

pub mod loopback;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by an engine backend.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The backend could not create a new decoding stream.
    #[error("Failed to create decoding stream: {0}")]
    StreamCreation(String),

    /// A decode step failed inside the backend.
    #[error("Decode step failed: {0}")]
    Decode(String),

    /// The backend is not in a state to serve requests.
    #[error("Engine unavailable: {0}")]
    Unavailable(String),
}

/// Current best hypothesis for one stream.
///
/// Serialized as-is into the JSON text frame sent after every decode step.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Hypothesis {
    /// Best transcription of the audio decoded so far.
    pub text: String,
    /// Feature frames consumed by decode steps so far.
    pub decoded_frames: usize,
}

/// One session's decoding state, owned by the engine.
///
/// Streams accumulate waveform, expose readiness, and advance one decode
/// step at a time. Once [`input_finished`](SttStream::input_finished) has
/// been signalled and the final frame decoded, the stream is terminal.
pub trait SttStream: Send + Sync {
    /// Append waveform samples to the stream.
    ///
    /// The slice is borrowed; implementations must copy whatever they keep.
    /// The caller's backing memory is gone as soon as this returns.
    fn accept_waveform(&self, sample_rate: u32, samples: &[f32]);

    /// Signal that no more audio will arrive for this stream.
    fn input_finished(&self);

    /// Whether enough new frames are buffered to perform a decode step.
    fn is_ready(&self) -> bool;

    /// Run one decode step, consuming the frames available at this instant.
    ///
    /// Blocking. Must only be called from a blocking-capable thread.
    fn decode(&self) -> Result<(), EngineError>;

    /// The current best hypothesis.
    fn hypothesis(&self) -> Hypothesis;

    /// Number of feature frames computable from the audio received so far.
    fn num_frames_ready(&self) -> usize;

    /// Whether `index` is the stream's final frame.
    ///
    /// Can only be true after [`input_finished`](SttStream::input_finished).
    fn is_last_frame(&self, index: usize) -> bool;
}

/// Factory and shared configuration for decoding streams.
pub trait SttEngine: Send + Sync {
    /// Create a fresh decoding stream for one session.
    fn create_stream(&self) -> Result<Arc<dyn SttStream>, EngineError>;

    /// Sample rate the engine's feature pipeline expects, in Hz.
    ///
    /// A fixed property of the loaded model.
    fn sample_rate(&self) -> u32;
}
