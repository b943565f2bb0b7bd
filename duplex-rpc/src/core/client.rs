use crate::core::codec::{Frame, RequestEnvelope, RequestId, ResponseEnvelope};
use crate::core::plugin::ClientPlugin;
use crate::core::request::OutgoingRequest;
use crate::error::RpcError;
use parking_lot::{Mutex, RwLock};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{trace, warn};

/// Options recognized by a [`Client`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
  /// Per-call deadline. On expiry the pending call is removed and the
  /// caller gets a timeout error; a late response for that id is dropped.
  pub timeout: Option<Duration>,
}

struct PendingCall {
  completion: oneshot::Sender<Result<ResponseEnvelope, RpcError>>,
  method: String,
  created_at: Instant,
}

/// One side of a JSON-RPC conversation: issues calls, matches responses.
///
/// A client owns its id counter and pending-call map and nothing else; the
/// wire is whatever transport plugin is installed. The same type serves as
/// the router's per-connection reverse client.
pub struct Client {
  plugins: RwLock<Vec<Arc<dyn ClientPlugin>>>,
  request_id_counter: AtomicI64,
  pending: Mutex<HashMap<i64, PendingCall>>,
  config: ClientConfig,
}

impl Default for Client {
  fn default() -> Self {
    Self::new()
  }
}

impl Client {
  pub fn new() -> Self {
    Self::with_config(ClientConfig::default())
  }

  pub fn with_config(config: ClientConfig) -> Self {
    Client {
      plugins: RwLock::new(Vec::new()),
      request_id_counter: AtomicI64::new(0),
      pending: Mutex::new(HashMap::new()),
      config,
    }
  }

  /// Appends a plugin. Hooks run in registration order.
  pub fn add_plugin(&self, plugin: Arc<dyn ClientPlugin>) {
    self.plugins.write().push(plugin);
  }

  /// Removes the most recently added plugin.
  pub fn remove_plugin(&self) -> Option<Arc<dyn ClientPlugin>> {
    self.plugins.write().pop()
  }

  fn plugin_snapshot(&self) -> Vec<Arc<dyn ClientPlugin>> {
    self.plugins.read().clone()
  }

  pub fn pending_count(&self) -> usize {
    self.pending.lock().len()
  }

  /// Invokes `method` and awaits the matching response.
  ///
  /// `params` must be a JSON array (positional) or object (named). The
  /// returned value is the peer's `result`; a peer `error` surfaces as
  /// [`RpcError::Remote`].
  pub async fn rpc(&self, method: &str, params: JsonValue) -> Result<JsonValue, RpcError> {
    let plugins = self.plugin_snapshot();
    let id = self.request_id_counter.fetch_add(1, Ordering::Relaxed);
    let envelope = RequestEnvelope::new(method, params, Some(RequestId::Number(id)));
    let mut outgoing = OutgoingRequest::new(envelope);

    match self.execute_call(&plugins, &mut outgoing, id).await {
      Ok(value) => Ok(value),
      Err(mut err) => {
        for plugin in &plugins {
          err = plugin.exception_catch(&mut outgoing, err).await;
        }
        Err(err)
      },
    }
  }

  /// Sends a notification: no id, no response, returns once the request
  /// left the process (or a caching plugin absorbed it).
  pub async fn notify(&self, method: &str, params: JsonValue) -> Result<(), RpcError> {
    let plugins = self.plugin_snapshot();
    let mut outgoing = OutgoingRequest::new(RequestEnvelope::new(method, params, None));

    let result = async {
      self.encode(&plugins, &mut outgoing).await?;
      self.run_transports(&plugins, &mut outgoing).await?;
      if !outgoing.sent && outgoing.response_body.is_none() {
        return Err(RpcError::NoTransport);
      }
      Ok(())
    }
    .await;

    match result {
      Ok(()) => Ok(()),
      Err(mut err) => {
        for plugin in &plugins {
          err = plugin.exception_catch(&mut outgoing, err).await;
        }
        Err(err)
      },
    }
  }

  async fn execute_call(
    &self,
    plugins: &[Arc<dyn ClientPlugin>],
    outgoing: &mut OutgoingRequest,
    id: i64,
  ) -> Result<JsonValue, RpcError> {
    trace!("[RPC] call {} method:{}", id, outgoing.envelope.method);
    self.encode(plugins, outgoing).await?;

    let rx = self.register_pending(id, &outgoing.envelope.method);
    if let Err(err) = self.run_transports(plugins, outgoing).await {
      self.take_pending(id);
      return Err(err);
    }

    let envelope = if let Some(body) = outgoing.response_body.take() {
      // Round-trip transport: the response is already here, the pending
      // entry was never needed.
      self.take_pending(id);
      Frame::parse(&body)
        .and_then(Frame::into_response)
        .map_err(|err| RpcError::Protocol(err.to_string()))?
    } else if outgoing.sent {
      self.await_response(rx, id).await?
    } else {
      self.take_pending(id);
      return Err(RpcError::NoTransport);
    };

    outgoing.response = Some(envelope);
    for plugin in plugins {
      plugin.after_json_decode(outgoing).await?;
    }
    let envelope = match outgoing.response.take() {
      Some(envelope) => envelope,
      None => return Err(RpcError::Protocol("response removed by plugin".to_string())),
    };
    envelope.into_result().map_err(RpcError::Remote)
  }

  async fn encode(
    &self,
    plugins: &[Arc<dyn ClientPlugin>],
    outgoing: &mut OutgoingRequest,
  ) -> Result<(), RpcError> {
    for plugin in plugins {
      plugin.before_json_encode(outgoing).await?;
    }
    outgoing.body = outgoing.envelope.encode()?;
    for plugin in plugins {
      plugin.after_json_encode(outgoing).await?;
    }
    Ok(())
  }

  /// First writer wins: once some plugin filled `response_body`, later
  /// `make_request` hooks are skipped.
  async fn run_transports(
    &self,
    plugins: &[Arc<dyn ClientPlugin>],
    outgoing: &mut OutgoingRequest,
  ) -> Result<(), RpcError> {
    for plugin in plugins {
      if outgoing.response_body.is_some() {
        break;
      }
      plugin.make_request(outgoing).await?;
    }
    Ok(())
  }

  fn register_pending(
    &self,
    id: i64,
    method: &str,
  ) -> oneshot::Receiver<Result<ResponseEnvelope, RpcError>> {
    let (tx, rx) = oneshot::channel();
    self.pending.lock().insert(
      id,
      PendingCall {
        completion: tx,
        method: method.to_string(),
        created_at: Instant::now(),
      },
    );
    rx
  }

  fn take_pending(&self, id: i64) -> Option<PendingCall> {
    self.pending.lock().remove(&id)
  }

  async fn await_response(
    &self,
    rx: oneshot::Receiver<Result<ResponseEnvelope, RpcError>>,
    id: i64,
  ) -> Result<ResponseEnvelope, RpcError> {
    let wait = async {
      match rx.await {
        Ok(result) => result,
        // The sender vanished without completing; the connection is gone.
        Err(_) => Err(RpcError::ConnectionClosed),
      }
    };
    match self.config.timeout {
      Some(deadline) => match tokio::time::timeout(deadline, wait).await {
        Ok(result) => result,
        Err(_) => {
          self.take_pending(id);
          Err(RpcError::Timeout(deadline))
        },
      },
      None => wait.await,
    }
  }

  /// Delivers an inbound response frame and resolves the pending call it
  /// correlates with. Unknown or unmatchable ids are logged and dropped.
  pub fn on_response(&self, text: &str) {
    let frame = match Frame::parse(text) {
      Ok(frame) => frame,
      Err(err) => {
        warn!("[RPC] dropping unparseable response frame: {}", err);
        return;
      },
    };
    let frame_id = frame.request_id();
    match frame.into_response() {
      Ok(envelope) => {
        let id = match envelope.id.as_number() {
          Some(id) => id,
          None => {
            warn!("[RPC] response id {} is not numeric, dropped", envelope.id);
            return;
          },
        };
        match self.take_pending(id) {
          Some(call) => {
            trace!(
              "[RPC] matched response {} for {} after {:?}",
              id,
              call.method,
              call.created_at.elapsed()
            );
            let _ = call.completion.send(Ok(envelope));
          },
          None => warn!("[RPC] response with unknown id {} dropped", id),
        }
      },
      Err(err) => {
        // The frame looked like a response but did not decode. Fail the
        // matching call if the id is recoverable, otherwise drop.
        if let Some(id) = frame_id.and_then(|id| id.as_number()) {
          if let Some(call) = self.take_pending(id) {
            let _ = call
              .completion
              .send(Err(RpcError::Protocol(err.to_string())));
            return;
          }
        }
        warn!("[RPC] dropping invalid response frame: {}", err);
      },
    }
  }

  /// Cooperatively cancels one pending call; a later response for its id
  /// is discarded by the unknown-id path.
  pub fn cancel(&self, id: i64) -> bool {
    match self.take_pending(id) {
      Some(call) => {
        let _ = call.completion.send(Err(RpcError::Cancelled));
        true
      },
      None => false,
    }
  }

  /// Fails every pending call with a connection-closed error. Called when
  /// the transport under this client goes away.
  pub fn fail_all_pending(&self) {
    let calls: Vec<(i64, PendingCall)> = self.pending.lock().drain().collect();
    for (id, call) in calls {
      trace!("[RPC] failing pending call {} ({}): connection closed", id, call.method);
      let _ = call.completion.send(Err(RpcError::ConnectionClosed));
    }
  }
}
