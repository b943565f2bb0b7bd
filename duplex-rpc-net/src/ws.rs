//! WebSocket bindings: adapters between tokio-tungstenite streams and the
//! framework's socket shape.
//!
//! The accepting side registers each upgraded connection with a [`Router`]
//! under its upgrade path; the connecting side either wires inbound frames
//! straight into a [`Client`] (one-way use) or registers the outbound
//! connection with a router of its own (fully bidirectional use).

use duplex_rpc::{Client, Router, RpcError, SocketHandle, WebSocketTransport};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{
  Request as UpgradeRequest, Response as UpgradeResponse,
};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

/// Write half of a connection: frames queue onto an unbounded channel that
/// the write task drains into the sink, so `send_text` never blocks the
/// caller on socket backpressure.
struct ChannelSocket {
  tx: mpsc::UnboundedSender<Message>,
}

impl SocketHandle for ChannelSocket {
  fn send_text(&self, text: String) -> Result<(), RpcError> {
    self
      .tx
      .send(Message::Text(text))
      .map_err(|_| RpcError::ConnectionClosed)
  }

  fn close(&self) {
    let _ = self.tx.send(Message::Close(None));
  }
}

/// Accept loop: every inbound TCP connection is upgraded and handed to the
/// router. Runs until the listener fails.
pub async fn serve(listener: TcpListener, router: Arc<Router>) -> std::io::Result<()> {
  loop {
    let (stream, addr) = listener.accept().await?;
    let router = router.clone();
    tokio::spawn(async move {
      if let Err(err) = accept_connection(router, stream).await {
        warn!("[RPC] websocket handshake failed from {}: {}", addr, err);
      }
    });
  }
}

/// Upgrades one TCP stream, capturing the upgrade path as the connection's
/// endpoint path, and registers it with the router.
pub async fn accept_connection(router: Arc<Router>, stream: TcpStream) -> anyhow::Result<u64> {
  let path = Arc::new(Mutex::new(String::from("/")));
  let capture = path.clone();
  let ws = tokio_tungstenite::accept_hdr_async(
    stream,
    move |request: &UpgradeRequest, response: UpgradeResponse| {
      *capture.lock() = request.uri().path().to_string();
      Ok(response)
    },
  )
  .await?;
  let path = path.lock().clone();
  Ok(spawn_connection(router, ws, &path))
}

/// Dials `url` and registers the resulting connection with the local
/// router: both peers can then initiate calls on it.
pub async fn connect_router(url: &str, router: Arc<Router>) -> Result<u64, RpcError> {
  let request = url
    .into_client_request()
    .map_err(|err| RpcError::Transport(err.to_string()))?;
  let path = request.uri().path().to_string();
  let (ws, _) = tokio_tungstenite::connect_async(request)
    .await
    .map_err(|err| RpcError::Transport(err.to_string()))?;
  Ok(spawn_connection(router, ws, &path))
}

/// Dials `url` for plain one-way use: installs a [`WebSocketTransport`] on
/// `client` and wires inbound frames to its `on_response`. Returns the
/// socket handle so the caller can close the connection.
pub async fn connect(url: &str, client: Arc<Client>) -> Result<Arc<dyn SocketHandle>, RpcError> {
  let (ws, _) = tokio_tungstenite::connect_async(url)
    .await
    .map_err(|err| RpcError::Transport(err.to_string()))?;
  let (mut sink, mut stream) = ws.split();

  let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
  tokio::spawn(async move {
    while let Some(message) = rx.recv().await {
      let closing = matches!(message, Message::Close(_));
      if sink.send(message).await.is_err() || closing {
        break;
      }
    }
    let _ = sink.close().await;
  });

  let socket: Arc<dyn SocketHandle> = Arc::new(ChannelSocket { tx });
  client.add_plugin(Arc::new(WebSocketTransport::new(socket.clone())));

  let reader = client.clone();
  tokio::spawn(async move {
    while let Some(next) = stream.next().await {
      match next {
        Ok(Message::Text(text)) => reader.on_response(&text),
        Ok(Message::Close(_)) => break,
        Ok(_) => {},
        Err(err) => {
          warn!("[RPC] websocket read error: {}", err);
          break;
        },
      }
    }
    debug!("[RPC] websocket closed, failing pending calls");
    reader.fail_all_pending();
  });

  Ok(socket)
}

/// Splits an upgraded stream into the router's socket shape: a write task
/// draining the egress queue and a read loop feeding the router.
fn spawn_connection<S>(router: Arc<Router>, ws: WebSocketStream<S>, path: &str) -> u64
where
  S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
  let (mut sink, stream) = ws.split();
  let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
  tokio::spawn(async move {
    while let Some(message) = rx.recv().await {
      let closing = matches!(message, Message::Close(_));
      if sink.send(message).await.is_err() || closing {
        break;
      }
    }
    let _ = sink.close().await;
  });

  let id = router.add_connection(Arc::new(ChannelSocket { tx }), path);
  tokio::spawn(read_loop(router, id, stream));
  id
}

async fn read_loop<S>(
  router: Arc<Router>,
  id: u64,
  mut stream: futures_util::stream::SplitStream<WebSocketStream<S>>,
) where
  S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
  while let Some(next) = stream.next().await {
    match next {
      Ok(Message::Text(text)) => router.handle_message(id, &text).await,
      Ok(Message::Close(_)) => break,
      Ok(_) => {},
      Err(err) => {
        router.handle_error(id, err);
        return;
      },
    }
  }
  router.handle_close(id);
}
