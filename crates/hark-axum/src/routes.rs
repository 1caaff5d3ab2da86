//! Route definitions and router construction.

use axum::Router;
use axum::routing::get;
use tower_http::services::ServeDir;

use crate::handlers;
use crate::state::AppState;

/// Build the full router: streaming root, shadowed legacy pages, and the
/// document root as static fallback.
///
/// Explicit routes win over the fallback, so `/upload.html` and
/// `/offline_record.html` are shadowed even when the document root contains
/// files of the same name. Everything else is served from disk; a miss is a
/// plain 404.
pub fn create_router(state: AppState) -> Router {
    let serve_dir = ServeDir::new(&state.config.doc_root);

    Router::new()
        .route("/", get(handlers::pages::root))
        .route("/upload.html", get(handlers::pages::streaming_only))
        .route("/offline_record.html", get(handlers::pages::streaming_only))
        .with_state(state)
        .fallback_service(serve_dir)
}
