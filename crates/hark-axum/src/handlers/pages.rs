//! Root route and the shadowed legacy pages.
//!
//! `GET /` is double-duty: a WebSocket upgrade starts a streaming session,
//! a plain GET receives `doc_root/index.html`. The two legacy recorder pages
//! are shadowed with an inline stub pointing at the streaming UI, whatever
//! the document root contains.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use tracing::error;

use crate::handlers::session;
use crate::state::AppState;

/// Upload/offline pages are not part of this server; point visitors at the
/// streaming recorder instead.
const STREAMING_ONLY_STUB: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta http-equiv="refresh" content="0; url=/streaming_record.html" />
  <title>Streaming only</title>
</head>
<body>
  <p>This server only provides streaming recognition.
  Continue to <a href="/streaming_record.html">streaming_record.html</a>.</p>
</body>
</html>
"#;

/// `GET /` — WebSocket upgrade or the index page.
///
/// The upgrade extractor is run by hand so the same route can serve plain
/// HTTP: requests without an `Upgrade` header skip the handshake entirely.
pub async fn root(State(state): State<AppState>, req: Request) -> Response {
    let (mut parts, _body) = req.into_parts();

    if parts.headers.contains_key(header::UPGRADE) {
        return match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
            Ok(ws) => ws
                .on_upgrade(move |socket| session::run(socket, state))
                .into_response(),
            Err(rejection) => rejection.into_response(),
        };
    }

    index(&state).await
}

/// Serve `doc_root/index.html` (validated to exist at startup).
async fn index(state: &AppState) -> Response {
    let path = state.config.doc_root.join("index.html");
    match tokio::fs::read(&path).await {
        Ok(body) => Html(body).into_response(),
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to read index page");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `GET /upload.html` and `GET /offline_record.html`.
pub async fn streaming_only() -> Html<&'static str> {
    Html(STREAMING_ONLY_STUB)
}
