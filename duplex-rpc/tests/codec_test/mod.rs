use duplex_rpc::{codes, Frame, RequestEnvelope, RequestId, ResponseEnvelope};
use serde_json::{json, Value};

#[test]
fn request_round_trips_through_the_codec() {
  let cases = vec![
    RequestEnvelope::new("divide", json!([6, 2]), Some(RequestId::Number(1))),
    RequestEnvelope::new("divide", json!({"a": 6, "b": 2}), Some(RequestId::String("req-7".into()))),
    RequestEnvelope::new("log", json!(["line"]), None),
  ];
  for envelope in cases {
    let text = envelope.encode().unwrap();
    let decoded = Frame::parse(&text).unwrap().into_request().unwrap();
    assert_eq!(decoded, envelope);
  }
}

#[test]
fn response_round_trips_through_the_codec() {
  let ok = ResponseEnvelope::success(RequestId::Number(1), json!(3));
  let text = ok.encode().unwrap();
  let decoded = Frame::parse(&text).unwrap().into_response().unwrap();
  assert_eq!(decoded, ok);

  let err = ResponseEnvelope::failure(
    RequestId::Number(2),
    duplex_rpc::RemoteError::method_not_found("nope"),
  );
  let text = err.encode().unwrap();
  let decoded = Frame::parse(&text).unwrap().into_response().unwrap();
  assert_eq!(decoded, err);
}

#[test]
fn missing_or_wrong_version_is_rejected() {
  let no_version = Frame::parse(r#"{"method":"ping","id":1}"#).unwrap();
  let err = no_version.into_request().unwrap_err();
  assert_eq!(err.code, codes::INVALID_REQUEST);

  let wrong = Frame::parse(r#"{"jsonrpc":"1.0","method":"ping","id":1}"#).unwrap();
  let err = wrong.into_request().unwrap_err();
  assert_eq!(err.code, codes::INVALID_REQUEST);

  let response = Frame::parse(r#"{"id":1,"result":3}"#).unwrap();
  let err = response.into_response().unwrap_err();
  assert_eq!(err.code, codes::INVALID_REQUEST);
}

#[test]
fn response_must_carry_exactly_one_of_result_and_error() {
  let both = Frame::parse(
    r#"{"jsonrpc":"2.0","id":1,"result":3,"error":{"code":0,"message":"x"}}"#,
  )
  .unwrap();
  assert_eq!(both.into_response().unwrap_err().code, codes::INVALID_REQUEST);

  let neither = Frame::parse(r#"{"jsonrpc":"2.0","id":1}"#).unwrap();
  assert!(!neither.is_response());
  assert_eq!(neither.into_response().unwrap_err().code, codes::INVALID_REQUEST);
}

#[test]
fn frames_classify_by_shape() {
  let request = Frame::parse(r#"{"jsonrpc":"2.0","method":"ping","params":[],"id":1}"#).unwrap();
  assert!(request.is_request());
  assert!(!request.is_response());

  let success = Frame::parse(r#"{"jsonrpc":"2.0","id":1,"result":3}"#).unwrap();
  assert!(success.is_response());
  assert!(!success.is_request());

  let failure =
    Frame::parse(r#"{"jsonrpc":"2.0","id":1,"error":{"code":0,"message":"x"}}"#).unwrap();
  assert!(failure.is_response());

  let neither = Frame::parse(r#"{"jsonrpc":"2.0","id":5}"#).unwrap();
  assert!(!neither.is_request());
  assert!(!neither.is_response());
}

#[test]
fn non_object_frames_are_parse_errors() {
  assert_eq!(Frame::parse("{not json").unwrap_err().code, codes::PARSE_ERROR);
  assert_eq!(Frame::parse("[1,2,3]").unwrap_err().code, codes::PARSE_ERROR);
  assert_eq!(Frame::parse("42").unwrap_err().code, codes::PARSE_ERROR);
}

#[test]
fn ids_accept_number_string_and_null() {
  let frame = Frame::parse(r#"{"jsonrpc":"2.0","method":"m","id":"abc"}"#).unwrap();
  assert_eq!(frame.request_id(), Some(RequestId::String("abc".into())));

  let frame = Frame::parse(r#"{"jsonrpc":"2.0","method":"m","id":null}"#).unwrap();
  assert_eq!(frame.request_id(), Some(RequestId::Null));

  let frame = Frame::parse(r#"{"jsonrpc":"2.0","method":"m"}"#).unwrap();
  assert_eq!(frame.request_id(), None);
  assert!(frame.into_request().unwrap().is_notification());
}

#[test]
fn string_params_are_rejected() {
  let frame = Frame::parse(r#"{"jsonrpc":"2.0","method":"m","params":"x","id":1}"#).unwrap();
  let err = frame.into_request().unwrap_err();
  assert_eq!(err.code, codes::INVALID_REQUEST);
}

#[test]
fn error_blob_has_null_id() {
  let blob = duplex_rpc::core::codec::error_blob(
    RequestId::Null,
    duplex_rpc::RemoteError::parse_error("bad"),
  );
  let value: Value = serde_json::from_str(&blob).unwrap();
  assert_eq!(value["id"], Value::Null);
  assert_eq!(value["error"]["code"], json!(codes::PARSE_ERROR));
}
