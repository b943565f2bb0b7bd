use crate::core::client::Client;
use crate::core::codec::{RequestEnvelope, ResponseEnvelope};
use crate::core::endpoint::Endpoint;
use crate::error::RemoteError;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Connection-level facts the transport layer knows about a request before
/// the server has looked at it.
#[derive(Clone, Default)]
pub struct TransportContext {
  /// Set when the request arrived over a routed duplex connection.
  pub connection_id: Option<u64>,
  /// Peer address, when the transport has one.
  pub remote_addr: Option<String>,
  /// The per-connection reverse client, attached by the router when the
  /// resolved endpoint declares a reverse-client factory.
  pub reverse_client: Option<Arc<Client>>,
}

/// Per-call server context: created for one inbound request, dropped once
/// its response envelope is out. Handlers receive a clone; the server keeps
/// the authoritative copy that plugins mutate.
#[derive(Clone)]
pub struct IncomingRequest {
  envelope: RequestEnvelope,
  endpoint: Arc<Endpoint>,
  caller: Option<JsonValue>,
  authorized: bool,
  reverse_client: Option<Arc<Client>>,
  connection_id: Option<u64>,
  remote_addr: Option<String>,
  context: HashMap<String, JsonValue>,
  outcome: Option<Result<JsonValue, RemoteError>>,
}

impl IncomingRequest {
  pub(crate) fn new(
    envelope: RequestEnvelope,
    endpoint: Arc<Endpoint>,
    transport: &TransportContext,
  ) -> Self {
    IncomingRequest {
      envelope,
      endpoint,
      caller: None,
      authorized: false,
      reverse_client: transport.reverse_client.clone(),
      connection_id: transport.connection_id,
      remote_addr: transport.remote_addr.clone(),
      context: HashMap::new(),
      outcome: None,
    }
  }

  pub fn envelope(&self) -> &RequestEnvelope {
    &self.envelope
  }

  pub fn envelope_mut(&mut self) -> &mut RequestEnvelope {
    &mut self.envelope
  }

  pub fn method(&self) -> &str {
    &self.envelope.method
  }

  pub fn endpoint(&self) -> &Arc<Endpoint> {
    &self.endpoint
  }

  pub fn connection_id(&self) -> Option<u64> {
    self.connection_id
  }

  pub fn remote_addr(&self) -> Option<&str> {
    self.remote_addr.as_deref()
  }

  /// The identity an authentication plugin bound to this call.
  pub fn caller(&self) -> Option<&JsonValue> {
    self.caller.as_ref()
  }

  /// Marks the call authenticated. Called by `authenticate` hooks; a request
  /// that reaches dispatch without an identity is rejected.
  pub fn set_caller(&mut self, identity: JsonValue) {
    self.caller = Some(identity);
  }

  pub fn is_authenticated(&self) -> bool {
    self.caller.is_some()
  }

  /// Marks the call authorized. Called by `authorize` hooks.
  pub fn mark_authorized(&mut self) {
    self.authorized = true;
  }

  pub fn is_authorized(&self) -> bool {
    self.authorized
  }

  /// The client for calling back toward the peer on the same connection.
  /// Present only on routed duplex connections whose endpoint declares a
  /// reverse-client factory.
  pub fn reverse_calls_client(&self) -> Option<&Arc<Client>> {
    self.reverse_client.as_ref()
  }

  /// Free-form per-call state for plugins.
  pub fn context(&self) -> &HashMap<String, JsonValue> {
    &self.context
  }

  pub fn context_mut(&mut self) -> &mut HashMap<String, JsonValue> {
    &mut self.context
  }

  /// The call outcome, once the handler (or an auth denial) produced one.
  /// `call_result` / `exception_catch` hooks reshape the response here.
  pub fn outcome(&self) -> Option<&Result<JsonValue, RemoteError>> {
    self.outcome.as_ref()
  }

  pub fn set_outcome(&mut self, outcome: Result<JsonValue, RemoteError>) {
    self.outcome = Some(outcome);
  }
}

/// Client-side call context threaded through the outbound plugin hooks.
///
/// Transports mark `sent` when the request left the process and fill
/// `response_body` when they already hold the reply (HTTP). A plugin that
/// fills `response_body` before the transport runs short-circuits every
/// later `make_request` hook.
pub struct OutgoingRequest {
  pub envelope: RequestEnvelope,
  /// The encoded request, valid after the encode hooks ran.
  pub body: String,
  pub sent: bool,
  pub response_body: Option<String>,
  pub response: Option<ResponseEnvelope>,
}

impl OutgoingRequest {
  pub(crate) fn new(envelope: RequestEnvelope) -> Self {
    OutgoingRequest {
      envelope,
      body: String::new(),
      sent: false,
      response_body: None,
      response: None,
    }
  }

  pub fn is_notification(&self) -> bool {
    self.envelope.is_notification()
  }
}
