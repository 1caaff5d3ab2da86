//! Loopback engine — a model-free implementation of the engine port.
//!
//! The loopback engine performs no acoustic inference. It keeps the same
//! frame bookkeeping a real recognizer would (fixed frame shift, chunked
//! decode steps, end-of-input handling) and reports the decoded duration as
//! its hypothesis. That makes it three things at once:
//!
//! - the backend the shipped binary serves with, so the wire protocol can be
//!   exercised end to end without model files,
//! - the fixture the integration tests drive,
//! - executable documentation of the [`SttStream`] contract for real
//!   backends (a sherpa-onnx or whisper binding slots in behind the same
//!   traits).

use std::sync::{Arc, Mutex};

use tracing::warn;

use crate::engine::{EngineError, Hypothesis, SttEngine, SttStream};

/// Configuration for the loopback engine.
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Sample rate of the expected input audio, in Hz.
    pub sample_rate: u32,

    /// Feature frame shift, in milliseconds.
    pub frame_shift_ms: u32,

    /// Frames consumed per decode step.
    ///
    /// Until `input_finished`, a stream only becomes ready once a full chunk
    /// of undecoded frames is buffered; afterwards any remainder is enough.
    pub chunk_frames: usize,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_shift_ms: 10,
            chunk_frames: 32,
        }
    }
}

/// Model-free engine reporting decoded duration instead of words.
#[derive(Debug)]
pub struct LoopbackEngine {
    config: LoopbackConfig,
}

impl LoopbackEngine {
    #[must_use]
    pub const fn new(config: LoopbackConfig) -> Self {
        Self { config }
    }

    fn shift_samples(&self) -> usize {
        self.config.sample_rate as usize * self.config.frame_shift_ms as usize / 1000
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new(LoopbackConfig::default())
    }
}

impl SttEngine for LoopbackEngine {
    fn create_stream(&self) -> Result<Arc<dyn SttStream>, EngineError> {
        let shift_samples = self.shift_samples();
        if shift_samples == 0 || self.config.chunk_frames == 0 {
            return Err(EngineError::StreamCreation(format!(
                "degenerate frame geometry: {} Hz at {} ms shift, chunk {}",
                self.config.sample_rate, self.config.frame_shift_ms, self.config.chunk_frames
            )));
        }
        Ok(Arc::new(LoopbackStream {
            sample_rate: self.config.sample_rate,
            frame_shift_ms: self.config.frame_shift_ms,
            shift_samples,
            chunk_frames: self.config.chunk_frames,
            inner: Mutex::new(StreamInner::default()),
        }))
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }
}

#[derive(Debug, Default)]
struct StreamInner {
    /// Total samples accepted so far.
    samples_received: usize,
    /// Feature frames consumed by decode steps so far.
    decoded_frames: usize,
    /// Set once `input_finished` has been signalled.
    finished: bool,
}

/// Per-session state of the loopback engine.
#[derive(Debug)]
pub struct LoopbackStream {
    sample_rate: u32,
    frame_shift_ms: u32,
    shift_samples: usize,
    chunk_frames: usize,
    inner: Mutex<StreamInner>,
}

impl LoopbackStream {
    fn frames_available(&self, inner: &StreamInner) -> usize {
        inner.samples_received / self.shift_samples
    }
}

impl SttStream for LoopbackStream {
    fn accept_waveform(&self, sample_rate: u32, samples: &[f32]) {
        if sample_rate != self.sample_rate {
            warn!(
                got = sample_rate,
                expected = self.sample_rate,
                "waveform sample rate differs from engine sample rate"
            );
        }
        // Only the sample count matters here; a real backend would copy the
        // samples into its feature pipeline at this point.
        self.inner.lock().unwrap().samples_received += samples.len();
    }

    fn input_finished(&self) {
        self.inner.lock().unwrap().finished = true;
    }

    fn is_ready(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        let pending = self.frames_available(&inner) - inner.decoded_frames;
        pending >= self.chunk_frames || (inner.finished && pending > 0)
    }

    fn decode(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        let pending = self.frames_available(&inner) - inner.decoded_frames;
        inner.decoded_frames += pending.min(self.chunk_frames);
        Ok(())
    }

    fn hypothesis(&self) -> Hypothesis {
        let inner = self.inner.lock().unwrap();
        #[allow(clippy::cast_precision_loss)]
        let seconds =
            inner.decoded_frames as f64 * f64::from(self.frame_shift_ms) / 1000.0;
        Hypothesis {
            text: format!("{seconds:.2}s decoded"),
            decoded_frames: inner.decoded_frames,
        }
    }

    fn num_frames_ready(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        self.frames_available(&inner)
    }

    fn is_last_frame(&self, index: usize) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.finished && index + 1 >= self.frames_available(&inner)
    }
}
