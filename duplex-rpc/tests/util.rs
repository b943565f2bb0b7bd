use duplex_rpc::{
  AuthenticationSkipPlugin, AuthorizeAllPlugin, Endpoint, RemoteError, Router, RpcError, Server,
  SocketHandle,
};
use serde_json::{json, Value};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::fmt::Subscriber;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub fn setup_log() {
  static START: Once = Once::new();
  START.call_once(|| {
    let level = "trace";
    let mut filters = vec![];
    filters.push(format!("duplex_rpc={}", level));
    std::env::set_var("RUST_LOG", filters.join(","));

    let subscriber = Subscriber::builder()
      .with_env_filter(EnvFilter::from_default_env())
      .with_line_number(true)
      .with_ansi(true)
      .finish();
    subscriber.try_init().unwrap();
  });
}

/// The calculator endpoint the scenario tests run against, mounted at /api.
pub fn math_endpoint() -> Endpoint {
  Endpoint::builder("calculator", "/api")
    .method("divide", &["a", "b"], |_req, params| async move {
      let a = params
        .first()
        .and_then(Value::as_f64)
        .ok_or_else(|| RemoteError::invalid_params("a must be a number"))?;
      let b = params
        .get(1)
        .and_then(Value::as_f64)
        .ok_or_else(|| RemoteError::invalid_params("b must be a number"))?;
      if b == 0.0 {
        return Err(RemoteError::application(1, "division by zero"));
      }
      let quotient = a / b;
      if quotient.fract() == 0.0 {
        Ok(json!(quotient as i64))
      } else {
        Ok(json!(quotient))
      }
    })
    .method("ping", &["text", "should_throw"], |_req, params| async move {
      let should_throw = params.get(1).and_then(Value::as_bool).unwrap_or(false);
      if should_throw {
        return Err(RemoteError::application(0, "You asked me to throw."));
      }
      Ok(params.first().cloned().unwrap_or(Value::Null))
    })
    .method("delay", &["ms", "value"], |_req, params| async move {
      let ms = params.first().and_then(Value::as_u64).unwrap_or(0);
      tokio::time::sleep(Duration::from_millis(ms)).await;
      Ok(params.get(1).cloned().unwrap_or(Value::Null))
    })
    .build()
}

/// Installs the explicit allow-everything auth plugins. Servers without
/// these deny all traffic.
pub fn open_doors(server: &Server) {
  server.add_plugin(Arc::new(AuthenticationSkipPlugin));
  server.add_plugin(Arc::new(AuthorizeAllPlugin));
}

pub fn permissive_server() -> Arc<Server> {
  let server = Arc::new(Server::new());
  open_doors(&server);
  server.register_endpoint(math_endpoint()).unwrap();
  server
}

/// Socket that forwards every frame into a channel, for asserting on what
/// a router actually sent.
pub struct CaptureSocket {
  tx: mpsc::UnboundedSender<String>,
}

impl SocketHandle for CaptureSocket {
  fn send_text(&self, text: String) -> Result<(), RpcError> {
    self.tx.send(text).map_err(|_| RpcError::ConnectionClosed)
  }

  fn close(&self) {}
}

pub fn capture_socket() -> (Arc<CaptureSocket>, mpsc::UnboundedReceiver<String>) {
  let (tx, rx) = mpsc::unbounded_channel();
  (Arc::new(CaptureSocket { tx }), rx)
}

struct PipeSocket {
  tx: mpsc::UnboundedSender<String>,
}

impl SocketHandle for PipeSocket {
  fn send_text(&self, text: String) -> Result<(), RpcError> {
    self.tx.send(text).map_err(|_| RpcError::ConnectionClosed)
  }

  fn close(&self) {}
}

/// Wires two routers together over an in-memory duplex pipe on `path`,
/// standing in for one WebSocket between two processes. Returns the
/// connection id each router assigned to its end.
pub fn link_routers(a: &Arc<Router>, b: &Arc<Router>, path: &str) -> (u64, u64) {
  let (a_tx, mut a_rx) = mpsc::unbounded_channel::<String>();
  let (b_tx, mut b_rx) = mpsc::unbounded_channel::<String>();

  let id_a = a.add_connection(Arc::new(PipeSocket { tx: a_tx }), path);
  let id_b = b.add_connection(Arc::new(PipeSocket { tx: b_tx }), path);

  let to_b = b.clone();
  tokio::spawn(async move {
    while let Some(text) = a_rx.recv().await {
      to_b.handle_message(id_b, &text).await;
    }
    to_b.handle_close(id_b);
  });

  let to_a = a.clone();
  tokio::spawn(async move {
    while let Some(text) = b_rx.recv().await {
      to_a.handle_message(id_a, &text).await;
    }
    to_a.handle_close(id_a);
  });

  (id_a, id_b)
}

/// Waits for one frame, panicking if the router stays silent.
pub async fn recv_frame(rx: &mut mpsc::UnboundedReceiver<String>) -> Value {
  let text = tokio::time::timeout(Duration::from_secs(2), rx.recv())
    .await
    .expect("timed out waiting for a frame")
    .expect("socket channel closed");
  serde_json::from_str(&text).expect("router sent invalid JSON")
}
