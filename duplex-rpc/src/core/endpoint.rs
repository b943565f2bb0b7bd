use crate::core::client::Client;
use crate::core::plugin::ClientPlugin;
use crate::core::request::IncomingRequest;
use crate::error::{RemoteError, RpcError};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::trace;

/// A registered method body: takes the per-call context and the bound
/// positional arguments, returns a result value or a wire error.
pub type MethodHandler =
  Arc<dyn Fn(IncomingRequest, Vec<JsonValue>) -> BoxFuture<'static, Result<JsonValue, RemoteError>> + Send + Sync>;

/// Builds the per-connection reverse client from the router-provided
/// transport plugin. The replacement for "class to instantiate": endpoints
/// supply a factory capability instead of a type.
pub type ReverseClientFactory = Arc<dyn Fn(Arc<dyn ClientPlugin>) -> Client + Send + Sync>;

struct MethodDef {
  param_names: Vec<String>,
  handler: MethodHandler,
}

/// A named handler set mounted at a URL path. Immutable once registered.
pub struct Endpoint {
  name: String,
  path: String,
  methods: HashMap<String, MethodDef>,
  reverse_client_factory: Option<ReverseClientFactory>,
}

impl std::fmt::Debug for Endpoint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Endpoint")
      .field("name", &self.name)
      .field("path", &self.path)
      .field("methods", &self.methods.keys().collect::<Vec<_>>())
      .finish()
  }
}

impl Endpoint {
  pub fn builder(name: impl Into<String>, path: impl Into<String>) -> EndpointBuilder {
    EndpointBuilder {
      name: name.into(),
      path: normalize_path(&path.into()),
      methods: HashMap::new(),
      reverse_client_factory: None,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// The normalized routing key.
  pub fn path(&self) -> &str {
    &self.path
  }

  pub fn has_method(&self, method: &str) -> bool {
    self.methods.contains_key(method)
  }

  pub fn has_reverse_client(&self) -> bool {
    self.reverse_client_factory.is_some()
  }

  pub(crate) fn reverse_client_factory(&self) -> Option<ReverseClientFactory> {
    self.reverse_client_factory.clone()
  }

  /// Resolves the method named in the request, binds its params, and runs
  /// the handler. Reserved `rpc.`-prefixed names are never callable.
  pub(crate) async fn dispatch(
    &self,
    request: IncomingRequest,
  ) -> Result<JsonValue, RemoteError> {
    let method = request.method().to_string();
    if method.starts_with("rpc.") {
      return Err(RemoteError::method_not_found(&method));
    }
    let def = self
      .methods
      .get(&method)
      .ok_or_else(|| RemoteError::method_not_found(&method))?;
    let args = bind_params(&def.param_names, request.envelope().params.clone())?;
    trace!("[RPC] dispatch {}::{}", self.name, method);
    (def.handler)(request, args).await
  }
}

/// Binds wire params to a handler's declared parameters. Arrays bind
/// positionally (padded to the declared arity with null); objects bind by
/// declared name, missing names become null, extras are ignored.
fn bind_params(param_names: &[String], params: JsonValue) -> Result<Vec<JsonValue>, RemoteError> {
  match params {
    JsonValue::Array(mut args) => {
      while args.len() < param_names.len() {
        args.push(JsonValue::Null);
      }
      Ok(args)
    },
    JsonValue::Object(mut named) => Ok(
      param_names
        .iter()
        .map(|name| named.remove(name).unwrap_or(JsonValue::Null))
        .collect(),
    ),
    other => Err(RemoteError::invalid_params(format!(
      "params must be an array or an object, got {}",
      other
    ))),
  }
}

pub struct EndpointBuilder {
  name: String,
  path: String,
  methods: HashMap<String, MethodDef>,
  reverse_client_factory: Option<ReverseClientFactory>,
}

impl EndpointBuilder {
  /// Registers a method. `param_names` drive by-name binding when a caller
  /// sends object params.
  pub fn method<F, Fut>(mut self, name: impl Into<String>, param_names: &[&str], f: F) -> Self
  where
    F: Fn(IncomingRequest, Vec<JsonValue>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<JsonValue, RemoteError>> + Send + 'static,
  {
    let def = MethodDef {
      param_names: param_names.iter().map(|s| s.to_string()).collect(),
      handler: Arc::new(move |request, args| Box::pin(f(request, args))),
    };
    self.methods.insert(name.into(), def);
    self
  }

  /// Supplies the factory the router uses to build this endpoint's
  /// per-connection reverse client. The factory receives the connection's
  /// transport plugin and must install it on the client it returns.
  pub fn reverse_client<F>(mut self, factory: F) -> Self
  where
    F: Fn(Arc<dyn ClientPlugin>) -> Client + Send + Sync + 'static,
  {
    self.reverse_client_factory = Some(Arc::new(factory));
    self
  }

  /// Declares a reverse client without custom construction: a plain
  /// [`Client`] with the connection transport installed.
  pub fn default_reverse_client(self) -> Self {
    self.reverse_client(|transport| {
      let client = Client::new();
      client.add_plugin(transport);
      client
    })
  }

  pub fn build(self) -> Endpoint {
    Endpoint {
      name: self.name,
      path: self.path,
      methods: self.methods,
      reverse_client_factory: self.reverse_client_factory,
    }
  }
}

/// Path → endpoint table, read-mostly after startup.
#[derive(Default)]
pub struct EndpointRegistry {
  endpoints: RwLock<HashMap<String, Arc<Endpoint>>>,
}

impl EndpointRegistry {
  pub fn register(&self, endpoint: Endpoint) -> Result<Arc<Endpoint>, RpcError> {
    let mut endpoints = self.endpoints.write();
    let path = endpoint.path.clone();
    if endpoints.contains_key(&path) {
      return Err(RpcError::PathInUse(path));
    }
    let endpoint = Arc::new(endpoint);
    endpoints.insert(path, endpoint.clone());
    Ok(endpoint)
  }

  pub fn endpoint_for_path(&self, path: &str) -> Option<Arc<Endpoint>> {
    self.endpoints.read().get(&normalize_path(path)).cloned()
  }
}

/// Canonical routing key: query string dropped, trailing slashes trimmed,
/// the empty path and `/` are the same key.
pub fn normalize_path(path: &str) -> String {
  let path = path.split('?').next().unwrap_or_default();
  let trimmed = path.trim_end_matches('/');
  if trimmed.is_empty() {
    "/".to_string()
  } else {
    trimmed.to_string()
  }
}
