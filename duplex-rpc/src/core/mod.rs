pub mod client;
pub mod codec;
pub mod endpoint;
pub mod plugin;
pub mod request;
pub mod router;
pub mod server;
pub mod transport;
