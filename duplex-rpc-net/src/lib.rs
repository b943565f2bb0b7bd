//! Network bindings for `duplex-rpc`: a tokio-tungstenite WebSocket host
//! and connector for the bi-directional router, and an axum mount that
//! serves a [`duplex_rpc::Server`] over plain HTTP POST.

pub mod http;
pub mod ws;
