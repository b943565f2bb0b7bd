use crate::util::{permissive_server, setup_log};
use duplex_rpc::{codes, TransportContext};
use serde_json::{json, Value};

async fn call(server: &duplex_rpc::Server, raw: &str) -> Value {
  let blob = server
    .process_request(raw, "/api", TransportContext::default())
    .await
    .expect("expected a response blob");
  serde_json::from_str(&blob).unwrap()
}

#[tokio::test]
async fn positional_params_bind_in_order() {
  setup_log();
  let server = permissive_server();
  let reply = call(
    &server,
    r#"{"jsonrpc":"2.0","id":1,"method":"divide","params":[6,2]}"#,
  )
  .await;
  assert_eq!(reply["result"], json!(3));
}

#[tokio::test]
async fn named_params_bind_by_declared_name() {
  setup_log();
  let server = permissive_server();
  let reply = call(
    &server,
    r#"{"jsonrpc":"2.0","id":1,"method":"divide","params":{"b":2,"a":6}}"#,
  )
  .await;
  assert_eq!(reply["result"], json!(3));
}

#[tokio::test]
async fn extra_named_params_are_ignored() {
  setup_log();
  let server = permissive_server();
  let reply = call(
    &server,
    r#"{"jsonrpc":"2.0","id":1,"method":"divide","params":{"a":6,"b":2,"c":99}}"#,
  )
  .await;
  assert_eq!(reply["result"], json!(3));
}

#[tokio::test]
async fn missing_named_params_become_null() {
  setup_log();
  let server = permissive_server();
  // "a" is unbound, so the handler sees null and rejects it as a bad param.
  let reply = call(
    &server,
    r#"{"jsonrpc":"2.0","id":1,"method":"divide","params":{"b":2}}"#,
  )
  .await;
  assert_eq!(reply["error"]["code"], json!(codes::INVALID_PARAMS));
}

#[tokio::test]
async fn unknown_method_is_method_not_found() {
  setup_log();
  let server = permissive_server();
  let reply = call(
    &server,
    r#"{"jsonrpc":"2.0","id":1,"method":"multiply","params":[2,3]}"#,
  )
  .await;
  assert_eq!(reply["error"]["code"], json!(codes::METHOD_NOT_FOUND));
}

#[tokio::test]
async fn reserved_rpc_names_are_not_callable() {
  setup_log();
  let server = permissive_server();
  let reply = call(
    &server,
    r#"{"jsonrpc":"2.0","id":1,"method":"rpc.discover","params":[]}"#,
  )
  .await;
  assert_eq!(reply["error"]["code"], json!(codes::METHOD_NOT_FOUND));
}

#[tokio::test]
async fn scalar_params_are_invalid() {
  setup_log();
  let server = permissive_server();
  let reply = call(
    &server,
    r#"{"jsonrpc":"2.0","id":1,"method":"divide","params":5}"#,
  )
  .await;
  assert_eq!(reply["error"]["code"], json!(codes::INVALID_REQUEST));
}

#[tokio::test]
async fn absent_params_mean_an_empty_array() {
  setup_log();
  let server = permissive_server();
  let reply = call(&server, r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).await;
  // ping with no args: text binds to null, should_throw defaults false.
  assert_eq!(reply["result"], Value::Null);
}
