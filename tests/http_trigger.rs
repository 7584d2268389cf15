mod support;

use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use pressrun::{
    domain::seed::{Seed, derive_hash},
    infra::http::{HttpState, build_router},
};
use pressrun_api_types::{BuildSequenceResponse, PublicationManifest};
use support::{FakeRenderer, FakeStore, Harness};
use tower::ServiceExt;

fn router(harness: &Harness, editions: u32, renderer: FakeRenderer, store: FakeStore) -> Router {
    let sequence = harness.sequence(editions, Arc::new(renderer), Arc::new(store));
    build_router(HttpState::new(
        Arc::new(sequence),
        harness.generator.clone(),
        Some(harness.manifest_path()),
    ))
}

fn build_request() -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/build-sequence")
        .body(Body::empty())
        .expect("request")
}

async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

async fn body_json(response: Response) -> BuildSequenceResponse {
    serde_json::from_str(&body_string(response).await).expect("json body")
}

#[tokio::test]
async fn iframe_previews_the_requested_seed() {
    let harness = Harness::new();
    let app = router(&harness, 1, FakeRenderer::new(), FakeStore::new());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/iframe?seedString=sunrise")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/html"), "{content_type}");

    let html = body_string(response).await;
    let hash = derive_hash(&Seed::parse("sunrise").expect("seed"));
    assert!(html.contains(&format!("\"tokenHash\":\"{hash}\"")), "{html}");
    assert!(html.contains("\"tokenID\":null"));
}

#[tokio::test]
async fn iframe_falls_back_to_the_default_seed() {
    let harness = Harness::new();
    let app = router(&harness, 1, FakeRenderer::new(), FakeStore::new());
    let expected = derive_hash(&Seed::default_seed());

    for uri in ["/iframe", "/iframe?seedString=", "/iframe?seedString=%20%20"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
        let html = body_string(response).await;
        assert!(
            html.contains(&format!("\"tokenHash\":\"{expected}\"")),
            "{uri} did not use the default seed"
        );
    }
}

#[tokio::test]
async fn build_sequence_returns_the_manifest_and_writes_it() {
    let harness = Harness::new();
    let app = router(&harness, 2, FakeRenderer::new(), FakeStore::new());

    let response = app.oneshot(build_request()).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.result, "Build sequence complete!");
    assert!(body.errors.is_empty());
    let manifest = body.manifest.expect("manifest in response");
    assert_eq!(manifest.editions.len(), 2);
    assert_eq!(manifest.editions[0].id, 1);
    assert_eq!(manifest.editions[1].id, 2);

    let written: PublicationManifest = serde_json::from_str(
        &std::fs::read_to_string(harness.manifest_path()).expect("manifest on disk"),
    )
    .expect("manifest parses");
    assert_eq!(written, manifest);
}

#[tokio::test]
async fn build_sequence_failures_are_reported_per_item() {
    let harness = Harness::new();
    let app = router(
        &harness,
        2,
        FakeRenderer::new(),
        FakeStore::new().failing_on("2.html"),
    );

    let response = app.oneshot(build_request()).await.expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body.result, "Build sequence error.");
    assert!(body.manifest.is_none());
    assert_eq!(body.errors.len(), 1, "{:?}", body.errors);
    assert!(body.errors[0].starts_with("edition 2 artifact"), "{:?}", body.errors);
    assert!(!harness.manifest_path().exists());
}

#[tokio::test]
async fn missing_credentials_fail_the_trigger() {
    let harness = Harness::new();
    let app = router(
        &harness,
        1,
        FakeRenderer::new(),
        FakeStore::new().missing(vec!["publish.token"]),
    );

    let response = app.oneshot(build_request()).await.expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body.result, "Build sequence error.");
    assert!(
        body.errors.iter().any(|line| line.contains("publish.token")),
        "{:?}",
        body.errors
    );
}

#[tokio::test]
async fn concurrent_triggers_are_rejected() {
    let harness = Harness::new();
    let app = router(
        &harness,
        1,
        FakeRenderer::new().with_delay(Duration::from_millis(300)),
        FakeStore::new(),
    );

    let first = tokio::spawn(app.clone().oneshot(build_request()));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = app
        .clone()
        .oneshot(build_request())
        .await
        .expect("response");
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = body_json(second).await;
    assert_eq!(body.result, "Build sequence already running.");

    let first = first.await.expect("first request task").expect("response");
    assert_eq!(first.status(), StatusCode::OK);

    let third = app.oneshot(build_request()).await.expect("response");
    assert_eq!(third.status(), StatusCode::OK, "lock is released after a run");
}
