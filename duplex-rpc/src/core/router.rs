use crate::core::client::Client;
use crate::core::codec::{error_blob, Frame, RequestId};
use crate::core::endpoint::{normalize_path, ReverseClientFactory};
use crate::core::request::TransportContext;
use crate::core::server::Server;
use crate::core::transport::{SocketHandle, WebSocketTransport};
use crate::error::{RemoteError, RpcError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
  Open,
  Closing,
  Closed,
}

/// One duplex connection owned by the router: the socket write half, the
/// connection's endpoint path, and the reverse clients created for it.
pub struct RouterConnection {
  id: u64,
  endpoint_path: String,
  socket: Arc<dyn SocketHandle>,
  state: Mutex<ConnectionState>,
  reverse_clients: Mutex<HashMap<String, Arc<Client>>>,
}

impl RouterConnection {
  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn endpoint_path(&self) -> &str {
    &self.endpoint_path
  }

  pub fn state(&self) -> ConnectionState {
    *self.state.lock()
  }

  /// Sends one text frame, unless the connection already left `Open`.
  fn send_text(&self, text: String) -> Result<(), RpcError> {
    if self.state() != ConnectionState::Open {
      trace!("[RPC] dropping send on conn {}: not open", self.id);
      return Err(RpcError::ConnectionClosed);
    }
    self.socket.send_text(text)
  }

  fn set_state(&self, next: ConnectionState) {
    *self.state.lock() = next;
  }

  fn reverse_client_for_path(&self, path: &str) -> Option<Arc<Client>> {
    self.reverse_clients.lock().get(path).cloned()
  }
}

/// A writer the reverse client's transport holds instead of the connection
/// itself: it keeps only a weak reference and re-checks liveness on every
/// send, so connection teardown is never kept alive by an idle client.
struct ConnectionWriter {
  conn: Weak<RouterConnection>,
}

impl SocketHandle for ConnectionWriter {
  fn send_text(&self, text: String) -> Result<(), RpcError> {
    match self.conn.upgrade() {
      Some(conn) => conn.send_text(text),
      None => Err(RpcError::ConnectionClosed),
    }
  }

  fn close(&self) {
    if let Some(conn) = self.conn.upgrade() {
      conn.socket.close();
    }
  }
}

/// Demultiplexes inbound frames on duplex connections: requests go to the
/// local server (with the connection's reverse client attached), responses
/// go to the reverse client that issued the call. One router lifts every
/// connection it owns into that paired client/server view.
pub struct Router {
  server: Arc<Server>,
  connections: Mutex<HashMap<u64, Arc<RouterConnection>>>,
  connection_id_counter: AtomicU64,
  reverse_client_subscribers: Mutex<Vec<mpsc::UnboundedSender<(u64, Arc<Client>)>>>,
}

impl Router {
  pub fn new(server: Arc<Server>) -> Arc<Self> {
    Arc::new(Router {
      server,
      connections: Mutex::new(HashMap::new()),
      connection_id_counter: AtomicU64::new(0),
      reverse_client_subscribers: Mutex::new(Vec::new()),
    })
  }

  pub fn server(&self) -> &Arc<Server> {
    &self.server
  }

  /// Registers a connection and returns its id. `path` is the connection's
  /// upgrade path; it selects the endpoint for every request arriving here.
  pub fn add_connection(&self, socket: Arc<dyn SocketHandle>, path: &str) -> u64 {
    let id = self.connection_id_counter.fetch_add(1, Ordering::SeqCst);
    let conn = Arc::new(RouterConnection {
      id,
      endpoint_path: normalize_path(path),
      socket,
      state: Mutex::new(ConnectionState::Open),
      reverse_clients: Mutex::new(HashMap::new()),
    });
    info!("[RPC] connection {} open on {}", id, conn.endpoint_path);
    self.connections.lock().insert(id, conn);
    id
  }

  pub fn connection(&self, id: u64) -> Option<Arc<RouterConnection>> {
    self.connections.lock().get(&id).cloned()
  }

  pub fn connection_count(&self) -> usize {
    self.connections.lock().len()
  }

  /// A stream of `(connection_id, client)` pairs, one per reverse client
  /// the router instantiates. Operators use this to install per-connection
  /// plugins before the first reverse call goes out.
  pub fn subscribe_reverse_clients(&self) -> UnboundedReceiverStream<(u64, Arc<Client>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    self.reverse_client_subscribers.lock().push(tx);
    UnboundedReceiverStream::new(rx)
  }

  fn notify_reverse_client(&self, conn_id: u64, client: &Arc<Client>) {
    let mut subscribers = self.reverse_client_subscribers.lock();
    subscribers.retain(|tx| tx.send((conn_id, client.clone())).is_ok());
  }

  /// The reverse client bound to this connection's (single) endpoint,
  /// created on first use from the endpoint's factory.
  pub fn connection_singleton_client(&self, id: u64) -> Result<Arc<Client>, RpcError> {
    let conn = self
      .connection(id)
      .ok_or(RpcError::ConnectionClosed)?;
    let factory = self
      .server
      .endpoint_for_path(&conn.endpoint_path)
      .and_then(|endpoint| endpoint.reverse_client_factory());
    Ok(self.reverse_client_for(&conn, factory))
  }

  /// Same as [`connection_singleton_client`], with an explicit factory
  /// overriding whatever the endpoint declares.
  ///
  /// [`connection_singleton_client`]: Router::connection_singleton_client
  pub fn connection_singleton_client_with(
    &self,
    id: u64,
    factory: ReverseClientFactory,
  ) -> Result<Arc<Client>, RpcError> {
    let conn = self
      .connection(id)
      .ok_or(RpcError::ConnectionClosed)?;
    Ok(self.reverse_client_for(&conn, Some(factory)))
  }

  fn reverse_client_for(
    &self,
    conn: &Arc<RouterConnection>,
    factory: Option<ReverseClientFactory>,
  ) -> Arc<Client> {
    let created = {
      let mut clients = conn.reverse_clients.lock();
      if let Some(existing) = clients.get(&conn.endpoint_path) {
        return existing.clone();
      }
      let transport: Arc<dyn crate::core::plugin::ClientPlugin> =
        Arc::new(WebSocketTransport::new(Arc::new(ConnectionWriter {
          conn: Arc::downgrade(conn),
        })));
      let client = match factory {
        Some(factory) => Arc::new(factory(transport)),
        None => {
          let client = Client::new();
          client.add_plugin(transport);
          Arc::new(client)
        },
      };
      clients.insert(conn.endpoint_path.clone(), client.clone());
      client
    };
    debug!("[RPC] made reverse calls client on conn {}", conn.id);
    self.notify_reverse_client(conn.id, &created);
    created
  }

  /// Classifies and routes one inbound text frame.
  ///
  /// Requests are dispatched on their own task so a handler that calls
  /// back toward the peer does not stall this connection's read loop —
  /// the response it awaits arrives through here. Frames are still
  /// classified in arrival order; responses go out in completion order.
  pub async fn handle_message(self: &Arc<Self>, id: u64, text: &str) {
    let Some(conn) = self.connection(id) else {
      warn!("[RPC] message for unknown connection {}", id);
      return;
    };

    let frame = match Frame::parse(text) {
      Ok(frame) => frame,
      Err(err) => {
        trace!("[RPC] malformed frame on conn {}: {}", id, err);
        let _ = conn.send_text(error_blob(RequestId::Null, err));
        return;
      },
    };

    if frame.is_request() {
      self.dispatch_request(conn, text.to_string());
    } else if frame.is_response() {
      match conn.reverse_client_for_path(&conn.endpoint_path) {
        Some(client) => client.on_response(text),
        None => warn!(
          "[RPC] response on conn {} with no reverse client, dropped",
          id
        ),
      }
    } else {
      let err = RemoteError::invalid_request("frame is neither a request nor a response");
      let _ = conn.send_text(error_blob(RequestId::Null, err));
    }
  }

  fn dispatch_request(self: &Arc<Self>, conn: Arc<RouterConnection>, raw: String) {
    // Attach the reverse client before dispatch so the handler can call
    // back on this same connection.
    let reverse_client = self
      .server
      .endpoint_for_path(&conn.endpoint_path)
      .filter(|endpoint| endpoint.has_reverse_client())
      .map(|endpoint| self.reverse_client_for(&conn, endpoint.reverse_client_factory()));

    let transport = TransportContext {
      connection_id: Some(conn.id),
      remote_addr: None,
      reverse_client,
    };

    let router = self.clone();
    tokio::spawn(async move {
      let response = router
        .server
        .process_request(&raw, &conn.endpoint_path, transport)
        .await;
      if let Some(blob) = response {
        if let Err(err) = conn.send_text(blob) {
          debug!("[RPC] response dropped on conn {}: {}", conn.id, err);
        }
      }
    });
  }

  /// Initiates a local shutdown: the connection stops accepting sends and
  /// asks the transport to close. Cleanup happens in [`Router::handle_close`]
  /// once the transport confirms.
  pub fn begin_close(&self, id: u64) {
    if let Some(conn) = self.connection(id) {
      info!("[RPC] closing connection {}", id);
      conn.set_state(ConnectionState::Closing);
      conn.socket.close();
    }
  }

  /// The transport reported the connection gone: fail everything pending
  /// on its reverse clients and drop the entry.
  pub fn handle_close(&self, id: u64) {
    let Some(conn) = self.connections.lock().remove(&id) else {
      return;
    };
    conn.set_state(ConnectionState::Closed);
    let clients: Vec<Arc<Client>> = conn.reverse_clients.lock().values().cloned().collect();
    for client in clients {
      client.fail_all_pending();
    }
    info!("[RPC] connection {} closed", id);
  }

  /// A transport error is a close from any state.
  pub fn handle_error(&self, id: u64, err: impl Display) {
    error!("[RPC] connection {} errored: {}", id, err);
    self.handle_close(id);
  }
}
