use duplex_rpc::{
  AuthenticationSkipPlugin, AuthorizeAllPlugin, Endpoint, RemoteError, Router, Server,
};
use serde_json::{json, Value};
use std::sync::{Arc, Once};
use tracing_subscriber::fmt::Subscriber;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub fn setup_log() {
  static START: Once = Once::new();
  START.call_once(|| {
    let level = "trace";
    let mut filters = vec![];
    filters.push(format!("duplex_rpc={}", level));
    filters.push(format!("duplex_rpc_net={}", level));
    std::env::set_var("RUST_LOG", filters.join(","));

    let subscriber = Subscriber::builder()
      .with_env_filter(EnvFilter::from_default_env())
      .with_line_number(true)
      .with_ansi(true)
      .finish();
    subscriber.try_init().unwrap();
  });
}

/// Open server with the calculator endpoint at /api, reverse calls enabled.
pub fn rpc_site() -> Arc<Server> {
  let server = Arc::new(Server::new());
  server.add_plugin(Arc::new(AuthenticationSkipPlugin));
  server.add_plugin(Arc::new(AuthorizeAllPlugin));
  server
    .register_endpoint(
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
        .method(
          "method_on_the_other_side",
          &["first", "second", "third"],
          |_req, params| async move { Ok(json!(params)) },
        )
        .method("ping", &["text", "should_throw"], |req, params| async move {
          let should_throw = params.get(1).and_then(Value::as_bool).unwrap_or(false);
          if should_throw {
            return Err(RemoteError::application(0, "You asked me to throw."));
          }
          match req.reverse_calls_client() {
            Some(reverse) => {
              let reverse = reverse.clone();
              let echoed = reverse
                .rpc("method_on_the_other_side", json!(["paramValue", true, false]))
                .await
                .map_err(|err| RemoteError::internal(err.to_string()))?;
              Ok(json!({ "pong": params.first(), "peer": echoed }))
            },
            None => Ok(params.first().cloned().unwrap_or(Value::Null)),
          }
        })
        .default_reverse_client()
        .build(),
    )
    .unwrap();
  server
}

pub fn rpc_router() -> Arc<Router> {
  Router::new(rpc_site())
}
