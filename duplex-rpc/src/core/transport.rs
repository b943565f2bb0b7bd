use crate::core::plugin::ClientPlugin;
use crate::core::request::OutgoingRequest;
use crate::error::RpcError;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::trace;

/// The write half of a duplex text-message connection.
///
/// This is the crate's normalization of a "WebSocket-like object": anything
/// that can carry one UTF-8 text frame per envelope qualifies. Inbound
/// events (message, close, error) are delivered by the adapter that owns the
/// read half — to [`Client::on_response`] for a plain client connection, or
/// to the router for a bidirectional one.
///
/// [`Client::on_response`]: crate::core::client::Client::on_response
pub trait SocketHandle: Send + Sync {
  fn send_text(&self, text: String) -> Result<(), RpcError>;
  fn close(&self);
}

/// HTTP client transport: one POST per call, the response body is the
/// response blob.
pub struct HttpTransport {
  http: reqwest::Client,
  url: String,
}

impl HttpTransport {
  pub fn new(url: impl Into<String>) -> Self {
    HttpTransport {
      http: reqwest::Client::new(),
      url: url.into(),
    }
  }

  pub fn url(&self) -> &str {
    &self.url
  }
}

#[async_trait]
impl ClientPlugin for HttpTransport {
  async fn make_request(&self, request: &mut OutgoingRequest) -> Result<(), RpcError> {
    trace!("[RPC] POST {} method:{}", self.url, request.envelope.method);
    let response = self
      .http
      .post(&self.url)
      .header("content-type", "application/json")
      .body(request.body.clone())
      .send()
      .await
      .map_err(|err| RpcError::Transport(err.to_string()))?;
    request.sent = true;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|err| RpcError::Transport(err.to_string()))?;

    if !status.is_success() {
      // A failed status is a transport error unless the body is itself a
      // JSON-RPC response (some servers answer errors with non-2xx).
      let is_rpc_body = serde_json::from_str::<JsonValue>(&body)
        .map(|value| value.get("jsonrpc").is_some())
        .unwrap_or(false);
      if !is_rpc_body {
        return Err(RpcError::Transport(format!(
          "http status {} from {}",
          status, self.url
        )));
      }
    }
    if !request.is_notification() {
      request.response_body = Some(body);
    }
    Ok(())
  }
}

/// WebSocket client transport: sends the encoded request as one text frame
/// and returns; the response arrives later through the read side.
pub struct WebSocketTransport {
  socket: Arc<dyn SocketHandle>,
}

impl WebSocketTransport {
  pub fn new(socket: Arc<dyn SocketHandle>) -> Self {
    WebSocketTransport { socket }
  }
}

#[async_trait]
impl ClientPlugin for WebSocketTransport {
  async fn make_request(&self, request: &mut OutgoingRequest) -> Result<(), RpcError> {
    self.socket.send_text(request.body.clone())?;
    request.sent = true;
    Ok(())
  }
}
