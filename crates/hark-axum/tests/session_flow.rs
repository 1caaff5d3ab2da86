//! End-to-end WebSocket session tests over a real listener.
//!
//! Each test binds an ephemeral port, serves the real router, and drives it
//! with a tokio-tungstenite client speaking the production protocol: binary
//! f32 LE PCM frames in, JSON hypothesis text frames out, `"Done"` in both
//! directions as the termination sentinel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use hark_axum::{AppState, ServerConfig, build_context, create_router};
use hark_core::{LoopbackConfig, LoopbackEngine, SttEngine};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SAMPLE_RATE: u32 = 16_000;

/// Bind an ephemeral port and serve the full router on it.
///
/// Returns the bound address, the shared state (for inspecting registry and
/// dispatcher from the outside), and the doc-root guard.
async fn spawn_server() -> (SocketAddr, AppState, TempDir) {
    let docs = TempDir::new().unwrap();
    std::fs::write(docs.path().join("index.html"), "<html>hark</html>").unwrap();

    let config = ServerConfig {
        doc_root: docs.path().to_path_buf(),
        ..ServerConfig::default()
    };
    let engine: Arc<dyn SttEngine> = Arc::new(LoopbackEngine::new(LoopbackConfig {
        sample_rate: SAMPLE_RATE,
        ..LoopbackConfig::default()
    }));
    let state = build_context(config, engine);
    let app = create_router(Arc::clone(&state));

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state, docs)
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _response) = connect_async(format!("ws://{addr}/")).await.unwrap();
    ws
}

/// A binary frame of `samples` zero-valued f32 LE samples.
fn pcm_frame(samples: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples * 4);
    for _ in 0..samples {
        bytes.extend_from_slice(&0.0_f32.to_le_bytes());
    }
    bytes
}

/// Read text frames until the terminal `"Done"`, returning everything seen.
async fn collect_until_done(ws: &mut WsClient) -> Vec<String> {
    let mut frames = Vec::new();
    loop {
        let msg = timeout(Duration::from_secs(10), ws.next())
            .await
            .expect("timed out waiting for a server frame")
            .expect("connection closed before Done")
            .expect("websocket error before Done");
        if let Message::Text(text) = msg {
            let done = text.as_str() == "Done";
            frames.push(text.as_str().to_owned());
            if done {
                break;
            }
        }
    }
    frames
}

fn assert_hypotheses_then_done(frames: &[String]) {
    assert!(
        frames.len() >= 2,
        "expected at least one hypothesis before Done, got {frames:?}"
    );
    assert_eq!(frames.last().unwrap(), "Done");
    for frame in &frames[..frames.len() - 1] {
        let json: serde_json::Value =
            serde_json::from_str(frame).unwrap_or_else(|e| panic!("bad frame {frame}: {e}"));
        assert!(json.get("text").is_some(), "hypothesis missing text: {json}");
    }
}

/// Stream a fixed utterance and return all server frames up to `"Done"`.
async fn run_utterance(addr: SocketAddr, frames: &[Vec<u8>]) -> Vec<String> {
    let mut ws = connect(addr).await;
    for frame in frames {
        ws.send(Message::binary(frame.clone())).await.unwrap();
    }
    ws.send(Message::text("Done")).await.unwrap();
    let received = collect_until_done(&mut ws).await;
    ws.close(None).await.ok();
    received
}

/// Poll until the server has forgotten every session.
async fn wait_until_idle(state: &AppState) {
    timeout(Duration::from_secs(5), async {
        loop {
            if state.registry.active_connections() == 0 && state.dispatcher.active_streams() == 0 {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("registry or dispatcher did not drain");
}

#[tokio::test]
async fn single_utterance_yields_hypotheses_then_done() {
    let (addr, state, _docs) = spawn_server().await;

    let frames = run_utterance(addr, &vec![pcm_frame(16_000); 3]).await;
    assert_hypotheses_then_done(&frames);

    wait_until_idle(&state).await;
}

#[tokio::test]
async fn two_concurrent_clients_both_complete() {
    let (addr, state, _docs) = spawn_server().await;

    let audio = vec![pcm_frame(16_000); 3];
    let (frames_a, frames_b) =
        tokio::join!(run_utterance(addr, &audio), run_utterance(addr, &audio));

    assert_hypotheses_then_done(&frames_a);
    assert_hypotheses_then_done(&frames_b);

    wait_until_idle(&state).await;
}

#[tokio::test]
async fn early_disconnect_leaves_no_orphan_state() {
    let (addr, state, _docs) = spawn_server().await;

    let mut ws = connect(addr).await;
    ws.send(Message::binary(pcm_frame(16_000))).await.unwrap();
    // Drop the TCP connection without ever sending "Done".
    drop(ws);

    // The registry shrinks and the active set empties in bounded time;
    // nothing is left behind for the dead handle.
    wait_until_idle(&state).await;
}

#[tokio::test]
async fn done_before_any_audio_still_terminates() {
    let (addr, state, _docs) = spawn_server().await;

    let mut ws = connect(addr).await;
    ws.send(Message::text("Done")).await.unwrap();
    let frames = collect_until_done(&mut ws).await;
    ws.close(None).await.ok();

    // The tail padding alone is decodable, so a hypothesis precedes Done.
    assert_hypotheses_then_done(&frames);

    wait_until_idle(&state).await;
}

#[tokio::test]
async fn malformed_and_empty_frames_are_tolerated() {
    let (addr, state, _docs) = spawn_server().await;

    let mut ws = connect(addr).await;
    // An empty frame is a no-op, a 3-byte frame is dropped outright.
    ws.send(Message::binary(Vec::new())).await.unwrap();
    ws.send(Message::binary(vec![1_u8, 2, 3])).await.unwrap();
    ws.send(Message::binary(pcm_frame(16_000))).await.unwrap();
    ws.send(Message::text("Done")).await.unwrap();

    let frames = collect_until_done(&mut ws).await;
    ws.close(None).await.ok();
    assert_hypotheses_then_done(&frames);

    // 1 s of audio plus 0.3 s of tail padding at a 10 ms frame shift: the
    // dropped junk frames must not have contributed any samples.
    let last_hypothesis: serde_json::Value =
        serde_json::from_str(&frames[frames.len() - 2]).unwrap();
    assert_eq!(last_hypothesis["decodedFrames"], 130);

    wait_until_idle(&state).await;
}

#[tokio::test]
async fn plain_http_get_on_root_still_works_alongside_ws() {
    let (addr, _state, _docs) = spawn_server().await;

    // The same listener answers a non-upgrade GET with the index page.
    let body = reqwest_free_get(addr, "/").await;
    assert!(body.contains("hark"));
}

/// Minimal HTTP/1.1 GET over a raw socket, to avoid pulling an HTTP client
/// into the dev-dependencies just for this one assertion.
async fn reqwest_free_get(addr: SocketAddr, path: &str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n").as_bytes())
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 200"), "got: {response}");
    response
}
