//! Bi-directional JSON-RPC 2.0 over duplex transports.
//!
//! A pair of peers exchange requests and responses in both directions over
//! one connection, most importantly a single WebSocket. Each peer runs a
//! [`Server`] for inbound calls and any number of [`Client`]s for outbound
//! ones; the [`Router`] owns each duplex connection and splits its inbound
//! frames between the two. Classical client → server HTTP is the degenerate
//! one-way case of the same model.
//!
//! [`Server`]: core::server::Server
//! [`Client`]: core::client::Client
//! [`Router`]: core::router::Router

pub mod core;
pub mod error;

pub use crate::core::client::{Client, ClientConfig};
pub use crate::core::codec::{Frame, RequestEnvelope, RequestId, ResponseEnvelope};
pub use crate::core::endpoint::{Endpoint, EndpointBuilder, ReverseClientFactory};
pub use crate::core::plugin::{
  AuthenticationSkipPlugin, AuthorizeAllPlugin, ClientPlugin, DebugDataPlugin, ServerPlugin,
};
pub use crate::core::request::{IncomingRequest, OutgoingRequest, TransportContext};
pub use crate::core::router::{ConnectionState, Router, RouterConnection};
pub use crate::core::server::{Server, ServerConfig};
pub use crate::core::transport::{HttpTransport, SocketHandle, WebSocketTransport};
pub use crate::error::{codes, ErrorKind, RemoteError, RpcError};
