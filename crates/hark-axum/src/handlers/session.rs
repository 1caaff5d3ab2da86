//! WebSocket streaming session: one connection, one decoding stream.
//!
//! ## Protocol
//!
//! | Direction | Type | Content |
//! |---|---|---|
//! | Client → Server | Binary | Packed little-endian f32 PCM, mono, at the engine sample rate |
//! | Client → Server | Text | `"Done"` — end of stream |
//! | Server → Client | Text | JSON hypothesis after every decode step |
//! | Server → Client | Text | `"Done"` — final frame decoded |
//!
//! ## Lifecycle
//!
//! 1. On upgrade, a decoding stream is created and registered; the handle
//!    is invalid again once the registry entry is removed.
//! 2. Two tasks share the socket:
//!    * **Ingest** — parses client frames, appends waveform to the stream,
//!      and pushes the stream to the dispatcher whenever it becomes ready.
//!    * **Egress** — drains the connection's outbound channel and writes
//!      each entry as a text frame. All sends for the connection funnel
//!      through here, so frames are never interleaved.
//! 3. `tokio::select!` waits for either task to finish (graceful close or
//!    network drop), aborts the other, and removes the registry entry.
//!
//! On `"Done"` the ingest side appends a short tail of silence before
//! `input_finished` so the engine can flush its right context.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dispatch::{DONE_TEXT, PushOutcome};
use crate::registry::ConnId;
use crate::state::AppState;

pub(crate) async fn run(socket: WebSocket, state: AppState) {
    let stream = match state.engine.create_stream() {
        Ok(stream) => stream,
        Err(e) => {
            warn!(error = %e, "refusing session: engine could not create a stream");
            return;
        }
    };

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let id = state.registry.open(stream, outbound_tx);

    // Split the socket so ingest and egress can run concurrently.
    let (ws_sender, ws_receiver) = socket.split();

    let mut egress = tokio::spawn(egress_loop(id, ws_sender, outbound_rx));
    let mut ingest = tokio::spawn(ingest_loop(id, ws_receiver, Arc::clone(&state)));

    // Whichever side finishes first (graceful close or abrupt drop) tears
    // down the other.
    tokio::select! {
        _ = &mut ingest => egress.abort(),
        _ = &mut egress => ingest.abort(),
    }

    state.registry.close(id);
}

/// Ingest: client frames → waveform → dispatcher pushes.
async fn ingest_loop(id: ConnId, mut receiver: SplitStream<WebSocket>, state: AppState) {
    let sample_rate = state.engine.sample_rate();

    while let Some(msg) = receiver.next().await {
        // Resolve the stream on every frame; a handle that has raced with
        // close simply ends the loop.
        let Some(stream) = state.registry.stream(id) else {
            break;
        };

        match msg {
            Ok(Message::Binary(data)) => {
                if data.len() % 4 != 0 {
                    warn!(
                        conn = %id,
                        bytes = data.len(),
                        "dropping binary frame: length is not a whole number of f32 samples"
                    );
                    continue;
                }
                // Decode packed f32 LE. The frame's backing memory is gone
                // after this iteration; accept_waveform copies what it keeps.
                let samples: Vec<f32> = data
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect();
                stream.accept_waveform(sample_rate, &samples);
                maybe_dispatch(&state, id, false);
            }
            Ok(Message::Text(text)) => {
                if text.as_str() == DONE_TEXT {
                    // Tail padding flushes the engine's right context, and
                    // guarantees at least one decodable frame even when no
                    // audio was ever sent.
                    let padding =
                        vec![0.0_f32; state.config.tail_padding_samples(sample_rate)];
                    stream.accept_waveform(sample_rate, &padding);
                    stream.input_finished();
                    maybe_dispatch(&state, id, true);
                } else {
                    debug!(conn = %id, "ignoring unexpected text frame");
                }
            }
            // Graceful close or transport error: stop ingesting.
            Ok(Message::Close(_)) | Err(_) => break,
            // Ping/pong are answered by the transport; nothing to do.
            Ok(_) => {}
        }
    }
}

/// Push the connection's stream to the dispatcher if it has work.
fn maybe_dispatch(state: &AppState, id: ConnId, draining: bool) {
    let Some(stream) = state.registry.stream(id) else {
        return;
    };
    if !stream.is_ready() {
        return;
    }
    let outcome = if draining {
        state.dispatcher.push_draining(id, stream)
    } else {
        state.dispatcher.push(id, stream)
    };
    match outcome {
        PushOutcome::Queued => state.dispatcher.spawn_decode(),
        PushOutcome::AlreadyActive => {}
        PushOutcome::Refused => {
            warn!(conn = %id, "ready queue at high-water mark; decode deferred");
        }
    }
}

/// Egress: outbound channel → text frames on the socket.
async fn egress_loop(
    id: ConnId,
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    while let Some(text) = outbound.recv().await {
        if let Err(e) = sender.send(Message::Text(text.into())).await {
            // Peer is gone; the connection teardown follows via select.
            debug!(conn = %id, error = %e, "send failed");
            break;
        }
    }
}
