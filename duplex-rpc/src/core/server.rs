use crate::core::codec::{error_blob, Frame, RequestId, ResponseEnvelope};
use crate::core::endpoint::{Endpoint, EndpointRegistry};
use crate::core::plugin::ServerPlugin;
use crate::core::request::{IncomingRequest, TransportContext};
use crate::error::{RemoteError, RpcError};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, trace};

/// Options recognized by a [`Server`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
  /// When false, id-less envelopes are answered with an invalid-request
  /// error instead of being processed silently.
  pub allow_notifications: bool,
}

impl Default for ServerConfig {
  fn default() -> Self {
    ServerConfig {
      allow_notifications: true,
    }
  }
}

/// The serving side of a peer: turns a request blob into a response blob.
///
/// A server is re-entrant; any number of connections may feed it
/// concurrently. All per-request state lives in the [`IncomingRequest`]
/// threaded through the plugin hooks.
///
/// With no authentication plugin registered every request is denied — the
/// operator opts into traffic by adding explicit plugins, e.g.
/// [`AuthenticationSkipPlugin`] plus [`AuthorizeAllPlugin`].
///
/// [`AuthenticationSkipPlugin`]: crate::core::plugin::AuthenticationSkipPlugin
/// [`AuthorizeAllPlugin`]: crate::core::plugin::AuthorizeAllPlugin
#[derive(Default)]
pub struct Server {
  registry: EndpointRegistry,
  plugins: RwLock<Vec<Arc<dyn ServerPlugin>>>,
  config: ServerConfig,
}

impl Server {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_config(config: ServerConfig) -> Self {
    Server {
      registry: EndpointRegistry::default(),
      plugins: RwLock::new(Vec::new()),
      config,
    }
  }

  /// Mounts an endpoint at its path. Fails if the normalized path is
  /// already taken.
  pub fn register_endpoint(&self, endpoint: Endpoint) -> Result<Arc<Endpoint>, RpcError> {
    let endpoint = self.registry.register(endpoint)?;
    debug!("[RPC] registered endpoint {} at {}", endpoint.name(), endpoint.path());
    Ok(endpoint)
  }

  pub fn endpoint_for_path(&self, path: &str) -> Option<Arc<Endpoint>> {
    self.registry.endpoint_for_path(path)
  }

  /// Appends a plugin. Hooks run in registration order.
  pub fn add_plugin(&self, plugin: Arc<dyn ServerPlugin>) {
    self.plugins.write().push(plugin);
  }

  /// Removes the most recently added plugin.
  pub fn remove_plugin(&self) -> Option<Arc<dyn ServerPlugin>> {
    self.plugins.write().pop()
  }

  fn plugin_snapshot(&self) -> Vec<Arc<dyn ServerPlugin>> {
    self.plugins.read().clone()
  }

  /// Processes one inbound request blob and produces the response blob, or
  /// `None` for notifications. Every failure becomes an error envelope;
  /// nothing escapes to the connection.
  pub async fn process_request(
    &self,
    raw: &str,
    endpoint_path: &str,
    transport: TransportContext,
  ) -> Option<String> {
    let plugins = self.plugin_snapshot();
    let mut raw = raw.to_string();

    for plugin in &plugins {
      if let Err(err) = plugin.before_json_decode(&mut raw).await {
        return self.finish_early(&plugins, RequestId::Null, err).await;
      }
    }

    let frame = match Frame::parse(&raw) {
      Ok(frame) => frame,
      Err(err) => return self.finish_early(&plugins, RequestId::Null, err).await,
    };
    let fallback_id = frame.request_id().unwrap_or(RequestId::Null);
    let mut envelope = match frame.into_request() {
      Ok(envelope) => envelope,
      Err(err) => return self.finish_early(&plugins, fallback_id, err).await,
    };

    for plugin in &plugins {
      if let Err(err) = plugin.after_json_decode(&mut envelope).await {
        if envelope.is_notification() {
          return None;
        }
        let id = envelope.id.clone().unwrap_or(RequestId::Null);
        return self.finish_early(&plugins, id, err).await;
      }
    }

    if envelope.is_notification() && !self.config.allow_notifications {
      let err = RemoteError::invalid_request("notifications are not accepted here");
      return self.finish_early(&plugins, RequestId::Null, err).await;
    }

    let endpoint = match self.registry.endpoint_for_path(endpoint_path) {
      Some(endpoint) => endpoint,
      None => {
        if envelope.is_notification() {
          debug!("[RPC] dropping notification for unknown path {}", endpoint_path);
          return None;
        }
        let id = envelope.id.clone().unwrap_or(RequestId::Null);
        let err = RemoteError::method_not_found(endpoint_path);
        return self.finish_early(&plugins, id, err).await;
      },
    };

    let is_notification = envelope.is_notification();
    let response_id = envelope.id.clone().unwrap_or(RequestId::Null);
    let mut incoming = IncomingRequest::new(envelope, endpoint.clone(), &transport);

    let denied = self.run_auth(&plugins, &mut incoming).await;
    match denied {
      Some(err) => incoming.set_outcome(Err(err)),
      None => {
        trace!("[RPC] handling {}::{}", endpoint.name(), incoming.method());
        let outcome = endpoint.dispatch(incoming.clone()).await;
        incoming.set_outcome(outcome);
      },
    }

    // call_result on the success path, exception_catch on the failure path.
    // A call_result error moves the request onto the failure path.
    let mut succeeded = matches!(incoming.outcome(), Some(Ok(_)));
    if succeeded {
      for plugin in &plugins {
        if let Err(err) = plugin.call_result(&mut incoming).await {
          incoming.set_outcome(Err(err));
          succeeded = false;
          break;
        }
      }
    }
    if !succeeded {
      for plugin in &plugins {
        plugin.exception_catch(&mut incoming).await;
      }
    }

    let mut response = match incoming.outcome().cloned() {
      Some(Ok(value)) => ResponseEnvelope::success(response_id, value),
      Some(Err(err)) => ResponseEnvelope::failure(response_id, err),
      None => ResponseEnvelope::failure(
        response_id,
        RemoteError::internal("request finished without an outcome"),
      ),
    };
    for plugin in &plugins {
      plugin.response(&mut incoming, &mut response).await;
    }

    let mut blob = match response.encode() {
      Ok(blob) => blob,
      Err(err) => error_blob(RequestId::Null, RemoteError::internal(err.to_string())),
    };
    for plugin in &plugins {
      plugin.after_json_encode(&mut blob).await;
    }

    if is_notification {
      // Hooks above still fired so auditing plugins observe the call, but
      // a notification never produces bytes on the wire.
      trace!("[RPC] suppressing response for notification {}", incoming.method());
      return None;
    }
    Some(blob)
  }

  /// Authentication then authorization, in plugin order. Returns the denial
  /// when the request may not proceed to the handler.
  async fn run_auth(
    &self,
    plugins: &[Arc<dyn ServerPlugin>],
    incoming: &mut IncomingRequest,
  ) -> Option<RemoteError> {
    for plugin in plugins {
      if let Err(err) = plugin.authenticate(incoming).await {
        return Some(err);
      }
    }
    if !incoming.is_authenticated() {
      return Some(RemoteError::authentication("caller is not authenticated"));
    }
    for plugin in plugins {
      if let Err(err) = plugin.authorize(incoming).await {
        return Some(err);
      }
    }
    if !incoming.is_authorized() {
      return Some(RemoteError::authorization("caller is not authorized"));
    }
    None
  }

  /// Failure before an [`IncomingRequest`] exists: only the blob-level
  /// outbound hook still applies.
  async fn finish_early(
    &self,
    plugins: &[Arc<dyn ServerPlugin>],
    id: RequestId,
    err: RemoteError,
  ) -> Option<String> {
    debug!("[RPC] rejecting request: {}", err);
    let mut blob = error_blob(id, err);
    for plugin in plugins {
      plugin.after_json_encode(&mut blob).await;
    }
    Some(blob)
  }
}
