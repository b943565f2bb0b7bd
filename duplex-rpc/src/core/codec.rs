use crate::error::RemoteError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt::{self, Display};

/// The only protocol version this crate speaks.
pub const JSONRPC_VERSION: &str = "2.0";

/// A request or response id: integer, string, or explicit null.
///
/// Ids generated by this crate are always numeric (a monotonic per-client
/// counter); string and null ids are accepted from peers for interop. The
/// null variant is what error envelopes carry when the offending frame never
/// yielded an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
  Number(i64),
  String(String),
  Null,
}

impl RequestId {
  pub fn as_number(&self) -> Option<i64> {
    match self {
      RequestId::Number(n) => Some(*n),
      _ => None,
    }
  }
}

impl Display for RequestId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RequestId::Number(n) => write!(f, "{}", n),
      RequestId::String(s) => write!(f, "{}", s),
      RequestId::Null => write!(f, "null"),
    }
  }
}

fn default_params() -> JsonValue {
  JsonValue::Array(Vec::new())
}

/// A JSON-RPC 2.0 request object. Absent `id` marks a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
  pub jsonrpc: String,
  pub method: String,
  /// Positional (array) or named (object) arguments; absent means `[]`.
  #[serde(default = "default_params")]
  pub params: JsonValue,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<RequestId>,
}

impl RequestEnvelope {
  pub fn new(method: impl Into<String>, params: JsonValue, id: Option<RequestId>) -> Self {
    RequestEnvelope {
      jsonrpc: JSONRPC_VERSION.to_string(),
      method: method.into(),
      params,
      id,
    }
  }

  pub fn is_notification(&self) -> bool {
    self.id.is_none()
  }

  pub fn encode(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(self)
  }
}

/// A JSON-RPC 2.0 response object. Exactly one of `result` / `error` is set;
/// the constructors keep that invariant and decoding enforces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
  pub jsonrpc: String,
  pub id: RequestId,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub result: Option<JsonValue>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<RemoteError>,
}

impl ResponseEnvelope {
  pub fn success(id: RequestId, result: JsonValue) -> Self {
    ResponseEnvelope {
      jsonrpc: JSONRPC_VERSION.to_string(),
      id,
      result: Some(result),
      error: None,
    }
  }

  pub fn failure(id: RequestId, error: RemoteError) -> Self {
    ResponseEnvelope {
      jsonrpc: JSONRPC_VERSION.to_string(),
      id,
      result: None,
      error: Some(error),
    }
  }

  pub fn into_result(self) -> Result<JsonValue, RemoteError> {
    match (self.result, self.error) {
      (Some(value), None) => Ok(value),
      (None, Some(err)) => Err(err),
      // Unreachable for envelopes built by this crate or accepted by decode.
      _ => Err(RemoteError::internal("response carries no result and no error")),
    }
  }

  pub fn encode(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(self)
  }
}

/// A raw inbound frame: parsed JSON that has not yet been classified.
///
/// The router demultiplexes on this; `is_request` / `is_response` decide
/// whether a frame goes to the local server or to a pending client call.
#[derive(Debug, Clone)]
pub struct Frame(pub JsonValue);

impl Frame {
  /// Parses a text frame. Anything that is not a JSON object is a parse
  /// error; the connection stays open and the caller answers with `-32700`.
  pub fn parse(text: &str) -> Result<Frame, RemoteError> {
    match serde_json::from_str::<JsonValue>(text) {
      Ok(value) if value.is_object() => Ok(Frame(value)),
      Ok(value) => Err(RemoteError::parse_error(format!(
        "expected a JSON object, got {}",
        value
      ))),
      Err(err) => Err(RemoteError::parse_error(err.to_string())),
    }
  }

  pub fn is_request(&self) -> bool {
    self.0.get("method").is_some()
  }

  pub fn is_response(&self) -> bool {
    !self.is_request()
      && self.0.get("id").is_some()
      && (self.0.get("result").is_some() || self.0.get("error").is_some())
  }

  /// Best-effort id extraction, used to echo the id on malformed requests.
  pub fn request_id(&self) -> Option<RequestId> {
    self
      .0
      .get("id")
      .and_then(|id| serde_json::from_value(id.clone()).ok())
  }

  pub fn into_request(self) -> Result<RequestEnvelope, RemoteError> {
    let version_ok = self.0.get("jsonrpc").and_then(JsonValue::as_str) == Some(JSONRPC_VERSION);
    if !version_ok {
      return Err(RemoteError::invalid_request(
        "jsonrpc field must be exactly \"2.0\"",
      ));
    }
    if !self.0.get("method").map(JsonValue::is_string).unwrap_or(false) {
      return Err(RemoteError::invalid_request("method must be a string"));
    }
    if let Some(params) = self.0.get("params") {
      if !params.is_array() && !params.is_object() {
        return Err(RemoteError::invalid_request(
          "params must be an array or an object",
        ));
      }
    }
    serde_json::from_value(self.0).map_err(|err| RemoteError::invalid_request(err.to_string()))
  }

  pub fn into_response(self) -> Result<ResponseEnvelope, RemoteError> {
    let version_ok = self.0.get("jsonrpc").and_then(JsonValue::as_str) == Some(JSONRPC_VERSION);
    if !version_ok {
      return Err(RemoteError::invalid_request(
        "jsonrpc field must be exactly \"2.0\"",
      ));
    }
    let has_result = self.0.get("result").is_some();
    let has_error = self.0.get("error").is_some();
    if has_result == has_error {
      return Err(RemoteError::invalid_request(
        "response must carry exactly one of result and error",
      ));
    }
    serde_json::from_value(self.0).map_err(|err| RemoteError::invalid_request(err.to_string()))
  }
}

/// Encodes the error envelope sent when a frame could not even be attributed
/// to a request, e.g. `{"jsonrpc":"2.0","id":null,"error":{...}}`.
pub fn error_blob(id: RequestId, error: RemoteError) -> String {
  ResponseEnvelope::failure(id, error)
    .encode()
    .unwrap_or_else(|_| {
      json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": null,
        "error": { "code": crate::error::codes::INTERNAL_ERROR, "message": "encode failure" },
      })
      .to_string()
    })
}
