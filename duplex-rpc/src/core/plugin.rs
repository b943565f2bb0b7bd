use crate::core::codec::{RequestEnvelope, ResponseEnvelope};
use crate::core::request::{IncomingRequest, OutgoingRequest};
use crate::error::{codes, RemoteError, RpcError};
use async_trait::async_trait;
use serde_json::json;

/// Lifecycle hooks around the server side of a call.
///
/// A plugin is a capability record: implement the hooks you care about, the
/// rest are no-ops. Plugins run in registration order at every hook.
///
/// Hook order per request: `before_json_decode`, `after_json_decode`,
/// `authenticate`, `authorize`, handler, then `call_result` on success or
/// `exception_catch` on failure, then `response`, then `after_json_encode`.
#[async_trait]
pub trait ServerPlugin: Send + Sync {
  /// Runs on the raw inbound blob before parsing. May rewrite it.
  async fn before_json_decode(&self, _raw: &mut String) -> Result<(), RemoteError> {
    Ok(())
  }

  /// Runs on the parsed request envelope. May rewrite it.
  async fn after_json_decode(&self, _envelope: &mut RequestEnvelope) -> Result<(), RemoteError> {
    Ok(())
  }

  /// Binds a caller identity via [`IncomingRequest::set_caller`]. A request
  /// that finishes this phase unauthenticated is rejected; with no
  /// authentication plugin registered the server therefore denies all
  /// traffic.
  async fn authenticate(&self, _request: &mut IncomingRequest) -> Result<(), RemoteError> {
    Ok(())
  }

  /// Grants access via [`IncomingRequest::mark_authorized`], or denies by
  /// returning an authorization error.
  async fn authorize(&self, _request: &mut IncomingRequest) -> Result<(), RemoteError> {
    Ok(())
  }

  /// Runs after the handler returned normally. May reshape the outcome; an
  /// error return switches the call onto the failure path.
  async fn call_result(&self, _request: &mut IncomingRequest) -> Result<(), RemoteError> {
    Ok(())
  }

  /// Runs after the handler (or an auth phase) failed. The error is in
  /// [`IncomingRequest::outcome`]; a plugin may translate it or replace it
  /// with a success outcome to suppress it.
  async fn exception_catch(&self, _request: &mut IncomingRequest) {}

  /// Last chance to shape the outbound envelope.
  async fn response(&self, _request: &mut IncomingRequest, _envelope: &mut ResponseEnvelope) {}

  /// Runs on the encoded outbound blob.
  async fn after_json_encode(&self, _raw: &mut String) {}
}

/// Lifecycle hooks around the client side of a call.
///
/// Exactly one registered plugin is expected to act as the transport by
/// implementing `make_request`; a plugin that fills
/// [`OutgoingRequest::response_body`] earlier in the chain short-circuits
/// every later `make_request` (first writer wins, which is how caching
/// plugins compose with a network transport).
#[async_trait]
pub trait ClientPlugin: Send + Sync {
  /// Runs on the request envelope before encoding.
  async fn before_json_encode(&self, _request: &mut OutgoingRequest) -> Result<(), RpcError> {
    Ok(())
  }

  /// Runs on the encoded request blob.
  async fn after_json_encode(&self, _request: &mut OutgoingRequest) -> Result<(), RpcError> {
    Ok(())
  }

  /// Delivers the request. HTTP-style transports assign
  /// [`OutgoingRequest::response_body`] before returning; message-oriented
  /// transports mark [`OutgoingRequest::sent`] and return, the response
  /// arriving later through [`Client::on_response`].
  ///
  /// [`Client::on_response`]: crate::core::client::Client::on_response
  async fn make_request(&self, _request: &mut OutgoingRequest) -> Result<(), RpcError> {
    Ok(())
  }

  /// Runs on the parsed response envelope, in the calling task, for both
  /// transport styles.
  async fn after_json_decode(&self, _request: &mut OutgoingRequest) -> Result<(), RpcError> {
    Ok(())
  }

  /// Translates a failed call before it reaches the caller.
  async fn exception_catch(&self, _request: &mut OutgoingRequest, error: RpcError) -> RpcError {
    error
  }
}

/// Authentication stand-in that admits every caller as anonymous. Without
/// this (or a real authentication plugin) the server answers everything
/// with an authentication error.
pub struct AuthenticationSkipPlugin;

#[async_trait]
impl ServerPlugin for AuthenticationSkipPlugin {
  async fn authenticate(&self, request: &mut IncomingRequest) -> Result<(), RemoteError> {
    request.set_caller(json!({ "anonymous": true }));
    Ok(())
  }
}

/// Authorization stand-in that allows every authenticated call.
pub struct AuthorizeAllPlugin;

#[async_trait]
impl ServerPlugin for AuthorizeAllPlugin {
  async fn authorize(&self, request: &mut IncomingRequest) -> Result<(), RemoteError> {
    request.mark_authorized();
    Ok(())
  }
}

/// Debug-mode plugin: attaches endpoint and method diagnostics to internal
/// error envelopes. Production servers leave internal errors opaque.
pub struct DebugDataPlugin;

#[async_trait]
impl ServerPlugin for DebugDataPlugin {
  async fn exception_catch(&self, request: &mut IncomingRequest) {
    let current = request.outcome().cloned();
    if let Some(Err(err)) = current {
      if err.code == codes::INTERNAL_ERROR && err.data.is_none() {
        let diagnostics = json!({
          "endpoint": request.endpoint().name(),
          "method": request.method(),
        });
        request.set_outcome(Err(err.with_data(diagnostics)));
      }
    }
  }
}
