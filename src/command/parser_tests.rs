use serde_json::json;

use crate::command::errors::RequestError;
use crate::command::parser::{parse_envelope, parse_request};
use crate::command::types::RequestMeta;
use crate::test_helpers::factory::{EnvelopeFactory, Factory};

fn meta() -> RequestMeta {
    EnvelopeFactory::meta()
}

#[test]
fn test_parses_envelope_and_keeps_entry_order() {
    let body = Factory::envelope()
        .with_call("z", "demo", "add", json!({"a": 1}))
        .with_call("a", "demo", "HELP", json!(null))
        .with_call("m", "demo", "empty", json!(null))
        .body();

    let envelope = parse_request(&body, &meta()).expect("valid envelope");

    assert_eq!(envelope.version, 1);
    assert_eq!(envelope.ids().collect::<Vec<_>>(), vec!["z", "a", "m"]);
}

#[test]
fn test_version_accepts_numeric_strings_and_floats() {
    let body = Factory::envelope().with_version(json!("3")).body();
    assert_eq!(parse_envelope(&body, &meta()).unwrap().version, 3);

    let body = Factory::envelope().with_version(json!(2.7)).body();
    assert_eq!(parse_envelope(&body, &meta()).unwrap().version, 2);
}

#[test]
fn test_rejects_wrong_content_type() {
    let body = Factory::envelope().body();
    let meta = RequestMeta::new(Some("text/plain"), true);

    let err = parse_envelope(&body, &meta).unwrap_err();
    assert!(matches!(err, RequestError::InvalidContentType(ref ct) if ct == "text/plain"));

    let err = parse_envelope(&body, &RequestMeta::new(None, true)).unwrap_err();
    assert!(matches!(err, RequestError::InvalidContentType(_)));
}

#[test]
fn test_rejects_insecure_transport() {
    let body = Factory::envelope().body();
    let meta = RequestMeta::new(Some("application/json"), false);

    assert!(matches!(
        parse_envelope(&body, &meta),
        Err(RequestError::InsecureTransport)
    ));
}

#[test]
fn test_rejects_malformed_bodies() {
    assert!(matches!(
        parse_envelope(b"{not json", &meta()),
        Err(RequestError::MalformedJson(_))
    ));
    assert!(matches!(
        parse_envelope(b"[1, 2]", &meta()),
        Err(RequestError::NotAnObject)
    ));
}

#[test]
fn test_rejects_missing_or_invalid_version() {
    for version in [json!(null), json!("abc"), json!(0), json!(true)] {
        let body = Factory::envelope().with_version(version.clone()).body();
        assert!(
            matches!(parse_envelope(&body, &meta()), Err(RequestError::MissingVersion)),
            "version {version}"
        );
    }

    let body = serde_json::to_vec(&json!({"payload": {}})).unwrap();
    assert!(matches!(
        parse_envelope(&body, &meta()),
        Err(RequestError::MissingVersion)
    ));
}

#[test]
fn test_rejects_missing_or_invalid_payload() {
    for body in [json!({"version": 1}), json!({"version": 1, "payload": [1]})] {
        let body = serde_json::to_vec(&body).unwrap();
        assert!(matches!(
            parse_envelope(&body, &meta()),
            Err(RequestError::MissingPayload)
        ));
    }
}

#[test]
fn test_parse_request_wraps_every_cause_as_invalid_request() {
    let err = parse_request(b"{}", &meta()).unwrap_err();

    assert_eq!(err.message(), "Invalid request");
    assert_eq!(err.code(), 400);
    assert!(err.is_recoverable());
    let cause = std::error::Error::source(&err).expect("cause kept");
    assert_eq!(cause.to_string(), "Missing version");
}
