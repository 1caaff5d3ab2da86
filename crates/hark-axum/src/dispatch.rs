//! Decode dispatcher — fair multiplexing of streams onto the compute side.
//!
//! The dispatcher owns a FIFO **ready queue** of `(ConnId, stream)` pairs
//! awaiting a decode step and an **active set** of stream identities that are
//! either queued or mid-decode. Both live under one mutex, distinct from the
//! registry lock; neither lock is ever held while the other is taken, across
//! an await point, or across a decode step.
//!
//! ## Guarantees
//!
//! - **At most one decode in flight per stream** — a stream identity stays in
//!   the active set from enqueue until its decode step's continuation
//!   decision, and [`Dispatcher::push`] rejects duplicates.
//! - **No duplicate queue entries** — implied by the above.
//! - **Round-robin fairness** — a stream with more frames ready is re-appended
//!   to the *tail* after its step, so no stream holds a compute worker for
//!   more than one step at a time.
//!
//! Decode steps are posted to the tokio blocking pool with
//! [`tokio::task::spawn_blocking`]; results are sent back to the connection
//! through the registry, which suppresses frames for closed connections.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, warn};

use hark_core::SttStream;

use crate::registry::{ConnId, Registry};

/// Final text frame of a successfully completed session.
pub const DONE_TEXT: &str = "Done";

/// Result of a [`Dispatcher::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The stream was appended to the ready queue.
    Queued,
    /// The stream is already queued or mid-decode; nothing changed.
    AlreadyActive,
    /// The ready queue is at its high-water mark; enqueue was refused.
    Refused,
}

#[derive(Default)]
struct ReadyState {
    queue: VecDeque<(ConnId, Arc<dyn SttStream>)>,
    active: HashSet<ConnId>,
}

/// Ready queue + active set behind a single mutex.
pub struct Dispatcher {
    registry: Arc<Registry>,
    ready: Mutex<ReadyState>,
    high_water: usize,
    /// Back-reference for posting decode tasks from continuations.
    this: Weak<Dispatcher>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registry: Arc<Registry>, high_water: usize) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            registry,
            ready: Mutex::new(ReadyState::default()),
            high_water,
            this: this.clone(),
        })
    }

    /// Idempotently enqueue a stream for a decode step.
    ///
    /// Refused (not queued) when the ready queue sits at the high-water
    /// mark; the stream keeps accumulating audio and a later push retries.
    pub fn push(&self, id: ConnId, stream: Arc<dyn SttStream>) -> PushOutcome {
        self.push_inner(id, stream, true)
    }

    /// Enqueue a draining stream, exempt from the high-water mark.
    ///
    /// Used once input is finished: a finishing stream gets no further
    /// pushes, so refusing this one could strand it before its final frame.
    pub fn push_draining(&self, id: ConnId, stream: Arc<dyn SttStream>) -> PushOutcome {
        self.push_inner(id, stream, false)
    }

    fn push_inner(&self, id: ConnId, stream: Arc<dyn SttStream>, bounded: bool) -> PushOutcome {
        let mut ready = self.ready.lock().unwrap();
        if ready.active.contains(&id) {
            return PushOutcome::AlreadyActive;
        }
        if bounded && ready.queue.len() >= self.high_water {
            return PushOutcome::Refused;
        }
        ready.queue.push_back((id, stream));
        ready.active.insert(id);
        PushOutcome::Queued
    }

    /// Post one decode task to the compute side.
    pub fn spawn_decode(&self) {
        // Upgrading can only fail during teardown, when nothing should be
        // decoded anymore anyway.
        if let Some(dispatcher) = self.this.upgrade() {
            tokio::spawn(dispatcher.decode_step());
        }
    }

    /// Run one work unit: pop the queue head, decode it, deliver the
    /// hypothesis, and decide the continuation.
    pub async fn decode_step(self: Arc<Self>) {
        let popped = self.ready.lock().unwrap().queue.pop_front();
        let Some((id, stream)) = popped else {
            return;
        };
        // The stream stays in the active set for the whole step; pushes that
        // race with the decode are rejected until the continuation decision.
        let decode_stream = Arc::clone(&stream);
        let outcome = tokio::task::spawn_blocking(move || decode_stream.decode()).await;

        match outcome {
            Ok(Ok(())) => {
                match serde_json::to_string(&stream.hypothesis()) {
                    Ok(json) => self.registry.send(id, json),
                    Err(e) => warn!(conn = %id, error = %e, "hypothesis serialization failed"),
                }
                self.continue_or_finish(id, &stream);
            }
            Ok(Err(e)) => {
                warn!(conn = %id, error = %e, "decode step failed");
                self.finish_with_error(id, &e.to_string());
            }
            Err(e) => {
                warn!(conn = %id, error = %e, "decode task panicked or was cancelled");
                self.finish_with_error(id, "decode step aborted");
            }
        }
    }

    /// Continuation decision after a successful decode step.
    fn continue_or_finish(&self, id: ConnId, stream: &Arc<dyn SttStream>) {
        if self.registry.contains(id) && stream.is_ready() {
            let mut ready = self.ready.lock().unwrap();
            ready.queue.push_back((id, Arc::clone(stream)));
            drop(ready);
            self.spawn_decode();
            return;
        }

        self.ready.lock().unwrap().active.remove(&id);

        // Input may have arrived between the readiness check and the removal
        // above; that push was rejected while we still held the active slot,
        // so replay it here.
        if self.registry.contains(id) && stream.is_ready() {
            if self.push_draining(id, Arc::clone(stream)) == PushOutcome::Queued {
                self.spawn_decode();
            }
            return;
        }

        let frames = stream.num_frames_ready();
        if stream.is_last_frame(frames.saturating_sub(1)) {
            self.registry.send(id, DONE_TEXT.to_owned());
            debug!(conn = %id, frames, "stream fully decoded");
        }
    }

    /// Terminal error path: report to the client and release the stream.
    fn finish_with_error(&self, id: ConnId, message: &str) {
        self.registry
            .send(id, serde_json::json!({ "error": message }).to_string());
        self.ready.lock().unwrap().active.remove(&id);
    }

    /// Streams currently queued or mid-decode.
    pub fn active_streams(&self) -> usize {
        self.ready.lock().unwrap().active.len()
    }

    /// Entries currently in the ready queue.
    pub fn queued(&self) -> usize {
        self.ready.lock().unwrap().queue.len()
    }
}
