use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::json;
use tokio::io::AsyncWrite;

use crate::command::errors::RequestError;
use crate::command::runner::{BatchRunner, BatchSummary};
use crate::command::types::RequestMeta;
use crate::logging::init_for_tests;
use crate::registry::loader::{AppContext, Registry};
use crate::shared::config::DispatchConfig;
use crate::shared::response::Boundary;
use crate::test_helpers::factory::{EnvelopeFactory, Factory};
use crate::test_helpers::multipart::{ParsedResponse, parse_multipart};

const BOUNDARY: &str = "BATCH-test";

async fn run(
    body: &[u8],
    meta: &RequestMeta,
    registry: &Registry,
    settings: &DispatchConfig,
) -> (BatchSummary, ParsedResponse) {
    let app = AppContext::empty();
    let runner = BatchRunner::new(registry, settings, &app);
    let (summary, raw) = runner
        .run(body, meta, Vec::new(), Boundary::new(BOUNDARY))
        .await;
    (summary, parse_multipart(&raw, BOUNDARY))
}

#[tokio::test]
async fn test_one_part_per_entry_then_terminator() {
    init_for_tests();

    let registry = Factory::registry().create();
    let body = Factory::envelope()
        .with_call("c", "demo", "add", json!({"a": 1}))
        .with_call("a", "demo", "fail_user", json!(null))
        .with_call("b", "demo", "empty", json!(null))
        .body();

    let (summary, response) = run(
        &body,
        &EnvelopeFactory::meta(),
        &registry,
        &DispatchConfig::default(),
    )
    .await;

    assert!(response.terminated);
    assert_eq!(response.ids(), vec!["c", "a", "b"]);
    assert!(response.parts.iter().all(|part| part.content_type == "application/json"));
    assert_eq!(response.entry(0).1, &json!({"error": false, "result": 1}));
    assert_eq!(
        response.entry(1).1,
        &json!({"error": true, "message": "Quota exceeded", "version": 100, "code": 400})
    );
    assert_eq!(response.entry(2).1, &json!({"error": false, "result": []}));
    assert_eq!(
        summary,
        BatchSummary {
            succeeded: 2,
            failed: 1,
            aborted: false
        }
    );
}

#[tokio::test]
async fn test_invalid_request_yields_single_unkeyed_failure() {
    init_for_tests();

    let registry = Factory::registry().create();
    let meta = RequestMeta::new(Some("application/json"), false);
    let body = Factory::envelope()
        .with_call("a", "demo", "add", json!({"a": 1}))
        .body();

    let (summary, response) = run(&body, &meta, &registry, &DispatchConfig::default()).await;

    assert!(response.terminated);
    assert_eq!(response.parts.len(), 1);
    assert_eq!(
        response.parts[0].body,
        json!({"error": true, "message": "Invalid request", "version": 100, "code": 400})
    );
    assert!(summary.aborted);
    assert_eq!(summary.entries(), 0);
}

#[tokio::test]
async fn test_empty_batch_is_just_a_terminator() {
    let registry = Factory::registry().create();
    let body = Factory::envelope().body();

    let (summary, response) = run(
        &body,
        &EnvelopeFactory::meta(),
        &registry,
        &DispatchConfig::default(),
    )
    .await;

    assert!(response.terminated);
    assert!(response.parts.is_empty());
    assert_eq!(summary, BatchSummary::default());
}

#[tokio::test]
async fn test_entry_limit_emits_fault_after_processed_entries() {
    init_for_tests();

    let registry = Factory::registry().create();
    let settings = DispatchConfig {
        max_entries: Some(1),
        ..DispatchConfig::default()
    };
    let body = Factory::envelope()
        .with_call("1", "demo", "add", json!({"a": 1}))
        .with_call("2", "demo", "add", json!({"a": 2}))
        .body();

    let (summary, response) = run(&body, &EnvelopeFactory::meta(), &registry, &settings).await;

    assert!(response.terminated);
    assert_eq!(response.parts.len(), 2);
    assert_eq!(response.entry(0).0, "1");
    assert_eq!(
        response.parts[1].body,
        json!({"error": true, "message": "Too many operations", "version": 100, "code": 400})
    );
    assert!(summary.aborted);
    assert_eq!(summary.succeeded, 1);
}

#[tokio::test]
async fn test_debug_mode_surfaces_internal_messages() {
    init_for_tests();

    let registry = Factory::registry().create();
    let body = Factory::envelope()
        .with_call("x", "demo", "fail_plain", json!(null))
        .body();

    let (_, hidden) = run(
        &body,
        &EnvelopeFactory::meta(),
        &registry,
        &DispatchConfig::default(),
    )
    .await;
    let debug = DispatchConfig {
        debug: true,
        ..DispatchConfig::default()
    };
    let (_, shown) = run(&body, &EnvelopeFactory::meta(), &registry, &debug).await;

    assert_eq!(hidden.entry(0).1["message"], json!("Internal error"));
    assert_eq!(hidden.entry(0).1["code"], json!(500));
    assert_eq!(shown.entry(0).1["message"], json!("loading account"));
}

#[tokio::test]
async fn test_reject_writes_failure_and_terminator() {
    init_for_tests();

    let registry = Factory::registry().create();
    let settings = DispatchConfig::default();
    let app = AppContext::empty();
    let runner = BatchRunner::new(&registry, &settings, &app);

    let raw = runner
        .reject(
            RequestError::BodyTooLarge { limit: 10 },
            Vec::new(),
            Boundary::new(BOUNDARY),
        )
        .await;
    let response = parse_multipart(&raw, BOUNDARY);

    assert!(response.terminated);
    assert_eq!(response.parts[0].body["message"], json!("Invalid request"));
}

/// Collects output, except that the first write panics.
#[derive(Default)]
struct PanicOnFirstWrite {
    out: Vec<u8>,
    panicked: bool,
}

impl AsyncWrite for PanicOnFirstWrite {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if !self.panicked {
            self.panicked = true;
            panic!("transport fault");
        }
        self.out.extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn test_panicking_module_factory_fails_only_its_entry() {
    init_for_tests();

    let registry = Factory::registry().with_panicking("flaky").create();
    let body = Factory::envelope()
        .with_call("a", "flaky", "x", json!(null))
        .with_call("b", "demo", "add", json!({"a": 2, "b": 3}))
        .body();

    let (summary, response) = run(
        &body,
        &EnvelopeFactory::meta(),
        &registry,
        &DispatchConfig::default(),
    )
    .await;

    assert!(response.terminated);
    assert_eq!(response.ids(), vec!["a", "b"]);
    assert_eq!(
        response.entry(0).1,
        &json!({"error": true, "message": "Internal error", "version": 100, "code": 500})
    );
    assert_eq!(response.entry(1).1, &json!({"error": false, "result": 5}));
    assert_eq!(
        summary,
        BatchSummary {
            succeeded: 1,
            failed: 1,
            aborted: false
        }
    );
}

#[tokio::test]
async fn test_panic_outside_an_entry_aborts_with_one_unkeyed_part() {
    init_for_tests();

    let registry = Factory::registry().create();
    let settings = DispatchConfig::default();
    let app = AppContext::empty();
    let body = Factory::envelope()
        .with_call("a", "demo", "add", json!({"a": 1}))
        .with_call("b", "demo", "add", json!({"a": 2}))
        .body();

    let (summary, transport) = BatchRunner::new(&registry, &settings, &app)
        .run(
            &body,
            &EnvelopeFactory::meta(),
            PanicOnFirstWrite::default(),
            Boundary::new(BOUNDARY),
        )
        .await;
    let response = parse_multipart(&transport.out, BOUNDARY);

    assert!(response.terminated);
    assert_eq!(response.parts.len(), 1);
    assert_eq!(
        response.parts[0].body,
        json!({"error": true, "message": "Internal error", "version": 100, "code": 500})
    );
    assert!(summary.aborted);
    assert_eq!(summary.entries(), 0);
}

#[tokio::test]
async fn test_module_parts_precede_the_entry_result() {
    init_for_tests();

    let registry = Factory::registry().create();
    let body = Factory::envelope()
        .with_call("r", "demo", "report", json!({"text": "hi"}))
        .with_call("n", "demo", "add", json!({"a": 1}))
        .body();

    let (summary, response) = run(
        &body,
        &EnvelopeFactory::meta(),
        &registry,
        &DispatchConfig::default(),
    )
    .await;

    assert!(response.terminated);
    assert_eq!(response.parts.len(), 3);
    assert_eq!(response.parts[0].content_type, "text/plain");
    assert_eq!(response.parts[0].body, json!("report: hi"));
    assert_eq!(response.entry(1), ("r", &json!({"error": false, "result": 2})));
    assert_eq!(response.entry(2), ("n", &json!({"error": false, "result": 1})));
    assert_eq!(summary.succeeded, 2);
}

#[tokio::test]
async fn test_results_wait_behind_a_module_part_left_open() {
    init_for_tests();

    let registry = Factory::registry().create();
    let body = Factory::envelope()
        .with_call("o", "demo", "report_open", json!({"text": "x"}))
        .with_call("n", "demo", "add", json!({"a": 1}))
        .body();

    let (_, response) = run(
        &body,
        &EnvelopeFactory::meta(),
        &registry,
        &DispatchConfig::default(),
    )
    .await;

    assert!(response.terminated);
    assert_eq!(response.parts.len(), 3);
    assert_eq!(response.parts[0].body, json!("report: x"));
    assert_eq!(response.entry(1).0, "o");
    assert_eq!(response.entry(2).0, "n");
}
