use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// JSON-RPC 2.0 error codes.
///
/// The protocol reserves `-32768..=-32000`; the authentication and
/// authorization codes below sit in the implementation-defined server band
/// of that range. Application errors must use codes outside the reserved
/// range entirely.
pub mod codes {
  /// Invalid JSON was received.
  pub const PARSE_ERROR: i64 = -32700;
  /// The JSON sent is not a valid request object.
  pub const INVALID_REQUEST: i64 = -32600;
  /// The method does not exist on the endpoint.
  pub const METHOD_NOT_FOUND: i64 = -32601;
  /// Invalid method parameters.
  pub const INVALID_PARAMS: i64 = -32602;
  /// Internal JSON-RPC error.
  pub const INTERNAL_ERROR: i64 = -32603;
  /// The caller could not be authenticated.
  pub const AUTHENTICATION_ERROR: i64 = -32000;
  /// The caller is authenticated but not allowed to make this call.
  pub const AUTHORIZATION_ERROR: i64 = -32001;
}

/// Coarse classification of a [`RemoteError`], derived from its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Parse,
  InvalidRequest,
  MethodNotFound,
  InvalidParams,
  Internal,
  Authentication,
  Authorization,
  Application,
}

/// The JSON-RPC error object carried inside a response envelope.
///
/// This is the only error type that crosses the wire. Everything the server
/// captures during dispatch is converted into one of these; local failures
/// on the client side are [`RpcError`] instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Error)]
#[error("({code}) {message}")]
pub struct RemoteError {
  pub code: i64,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data: Option<Value>,
}

impl RemoteError {
  pub fn new(code: i64, message: impl Into<String>) -> Self {
    RemoteError {
      code,
      message: message.into(),
      data: None,
    }
  }

  pub fn with_data(mut self, data: Value) -> Self {
    self.data = Some(data);
    self
  }

  pub fn parse_error(message: impl Into<String>) -> Self {
    Self::new(codes::PARSE_ERROR, message)
  }

  pub fn invalid_request(message: impl Into<String>) -> Self {
    Self::new(codes::INVALID_REQUEST, message)
  }

  pub fn method_not_found(method: &str) -> Self {
    Self::new(
      codes::METHOD_NOT_FOUND,
      format!("method not found: {}", method),
    )
  }

  pub fn invalid_params(message: impl Into<String>) -> Self {
    Self::new(codes::INVALID_PARAMS, message)
  }

  pub fn internal(message: impl Into<String>) -> Self {
    Self::new(codes::INTERNAL_ERROR, message)
  }

  pub fn authentication(message: impl Into<String>) -> Self {
    Self::new(codes::AUTHENTICATION_ERROR, message)
  }

  pub fn authorization(message: impl Into<String>) -> Self {
    Self::new(codes::AUTHORIZATION_ERROR, message)
  }

  /// An application-defined error. The code must lie outside the reserved
  /// `-32768..=-32000` range; reserved codes are coerced to an internal
  /// error so handlers cannot impersonate protocol failures.
  pub fn application(code: i64, message: impl Into<String>) -> Self {
    if (-32768..=-32000).contains(&code) {
      return Self::internal(message);
    }
    Self::new(code, message)
  }

  pub fn kind(&self) -> ErrorKind {
    match self.code {
      codes::PARSE_ERROR => ErrorKind::Parse,
      codes::INVALID_REQUEST => ErrorKind::InvalidRequest,
      codes::METHOD_NOT_FOUND => ErrorKind::MethodNotFound,
      codes::INVALID_PARAMS => ErrorKind::InvalidParams,
      codes::INTERNAL_ERROR => ErrorKind::Internal,
      codes::AUTHENTICATION_ERROR => ErrorKind::Authentication,
      codes::AUTHORIZATION_ERROR => ErrorKind::Authorization,
      _ => ErrorKind::Application,
    }
  }
}

/// Local failures: everything a caller of [`Client::rpc`] or the framework
/// itself can hit without the peer ever answering.
///
/// [`Client::rpc`]: crate::core::client::Client::rpc
#[derive(Debug, Error)]
pub enum RpcError {
  #[error("transport error: {0}")]
  Transport(String),

  #[error("connection closed")]
  ConnectionClosed,

  #[error("call timed out after {0:?}")]
  Timeout(Duration),

  #[error("call cancelled")]
  Cancelled,

  #[error("no transport plugin installed")]
  NoTransport,

  #[error("protocol error: {0}")]
  Protocol(String),

  #[error("endpoint path already in use: {0}")]
  PathInUse(String),

  #[error(transparent)]
  Remote(#[from] RemoteError),

  #[error(transparent)]
  Json(#[from] serde_json::Error),

  #[error(transparent)]
  Internal(#[from] anyhow::Error),
}

impl RpcError {
  /// The remote error object, when the failure came from the peer.
  pub fn remote(&self) -> Option<&RemoteError> {
    match self {
      RpcError::Remote(err) => Some(err),
      _ => None,
    }
  }
}
