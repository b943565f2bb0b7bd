//! HTTP host binding: mounts a [`Server`] under a path prefix on an axum
//! router. Every POST below the prefix is fed to `process_request` with the
//! request path as the endpoint path.

use axum::extract::{OriginalUri, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use duplex_rpc::{Server, TransportContext};
use std::sync::Arc;

/// Returns an axum router serving `server` at `prefix` and everything
/// below it. Notifications answer `204 No Content`.
pub fn mount(server: Arc<Server>, prefix: &str) -> axum::Router {
  let prefix = prefix.trim_end_matches('/');
  if prefix.is_empty() {
    axum::Router::new()
      .route("/", post(handle))
      .route("/*rest", post(handle))
      .with_state(server)
  } else {
    axum::Router::new()
      .route(prefix, post(handle))
      .route(&format!("{}/*rest", prefix), post(handle))
      .with_state(server)
  }
}

async fn handle(
  State(server): State<Arc<Server>>,
  OriginalUri(uri): OriginalUri,
  body: String,
) -> Response {
  let transport = TransportContext::default();
  match server.process_request(&body, uri.path(), transport).await {
    Some(blob) => (
      [(header::CONTENT_TYPE, "application/json")],
      blob,
    )
      .into_response(),
    None => StatusCode::NO_CONTENT.into_response(),
  }
}
