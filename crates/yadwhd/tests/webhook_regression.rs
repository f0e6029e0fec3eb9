//! Webhook regression tests.
//!
//! Drives the full router against an in-memory runtime: secret transport,
//! authentication statuses, and the container update itself.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use yadwh_api::{SECRET_HEADER, build_router};
use yadwh_core::{CredentialStore, DEFAULT_LABEL_KEY, GroupCredential};
use yadwh_orchestrator::Orchestrator;
use yadwh_runtime::{MemoryRuntime, Operation};

const SECRET: &str = "abcdefghijkl";

fn test_router(rt: &MemoryRuntime) -> Router {
    let store = CredentialStore::from_credentials([GroupCredential::new("BACKEND_PROD", SECRET)]);
    build_router(Orchestrator::new(Arc::new(rt.clone()), Arc::new(store)))
}

fn backend_runtime() -> (MemoryRuntime, String) {
    let rt = MemoryRuntime::new();
    rt.publish("example/api:1", "sha256:old");
    let id = rt.run("api", "example/api:1", &[(DEFAULT_LABEL_KEY, "backend_prod")]);
    (rt, id)
}

async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn path_secret_recreates_container() {
    let (rt, old_id) = backend_runtime();
    let router = test_router(&rt);

    let req = Request::builder()
        .method("POST")
        .uri(format!("/BACKEND_PROD/{SECRET}"))
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    let updated = json.as_array().unwrap();
    assert_eq!(updated.len(), 1);
    let new_id = updated[0]["id"].as_str().unwrap();
    assert_ne!(new_id, old_id);

    assert!(rt.container(&old_id).is_none());
    let replacement = rt.container("api").unwrap();
    assert_eq!(replacement.id, new_id);
    assert_eq!(replacement.label(DEFAULT_LABEL_KEY), Some("backend_prod"));
}

#[tokio::test]
async fn wrong_path_secret_is_unauthorized() {
    let (rt, _) = backend_runtime();
    let router = test_router(&rt);

    let req = Request::builder()
        .uri("/BACKEND_PROD/short")
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let json = body_json(resp).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "secret mismatch");
    assert_eq!(rt.call_count(), 0);
}

#[tokio::test]
async fn unknown_group_is_not_found() {
    let (rt, _) = backend_runtime();
    let router = test_router(&rt);

    let req = Request::builder()
        .uri(format!("/UNKNOWN_GROUP?secret={SECRET}"))
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(rt.call_count(), 0);
}

#[tokio::test]
async fn secret_from_query() {
    let (rt, _) = backend_runtime();
    let router = test_router(&rt);

    let req = Request::builder()
        .uri(format!("/backend_prod?secret={SECRET}"))
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(rt.calls_of(Operation::Start), 1);
}

#[tokio::test]
async fn secret_from_header() {
    let (rt, _) = backend_runtime();
    let router = test_router(&rt);

    let req = Request::builder()
        .method("POST")
        .uri("/BACKEND_PROD")
        .header(SECRET_HEADER, SECRET)
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(rt.calls_of(Operation::Start), 1);
}

#[tokio::test]
async fn secret_from_body() {
    let (rt, _) = backend_runtime();
    let router = test_router(&rt);

    let req = Request::builder()
        .method("POST")
        .uri("/BACKEND_PROD")
        .body(Body::from(format!("{SECRET}\n")))
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(rt.calls_of(Operation::Start), 1);
}

#[tokio::test]
async fn missing_secret_is_unauthorized() {
    let (rt, _) = backend_runtime();
    let router = test_router(&rt);

    let req = Request::builder()
        .method("POST")
        .uri("/BACKEND_PROD")
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "secret not found");
    assert_eq!(rt.call_count(), 0);
}

#[tokio::test]
async fn listing_failure_is_internal_error() {
    let (rt, _) = backend_runtime();
    rt.fail_all(Operation::List);
    let router = test_router(&rt);

    let req = Request::builder()
        .uri(format!("/BACKEND_PROD/{SECRET}"))
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(rt.calls_of(Operation::Pull), 0);
}

#[tokio::test]
async fn failed_container_is_left_out_of_response() {
    let rt = MemoryRuntime::new();
    rt.publish("example/api:1", "sha256:a");
    rt.publish("example/worker:1", "sha256:b");
    rt.run("api", "example/api:1", &[(DEFAULT_LABEL_KEY, "BACKEND_PROD")]);
    rt.run("worker", "example/worker:1", &[(DEFAULT_LABEL_KEY, "BACKEND_PROD")]);
    rt.fail(Operation::Pull, "example/api:1");
    let router = test_router(&rt);

    let req = Request::builder()
        .uri(format!("/BACKEND_PROD/{SECRET}"))
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let json = body_json(resp).await;
    let updated = json.as_array().unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0]["image"], "example/worker:1");
}

#[tokio::test]
async fn healthz_ok() {
    let rt = MemoryRuntime::new();
    let router = test_router(&rt);

    let req = Request::builder()
        .uri("/healthz")
        .body(Body::empty())
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(rt.call_count(), 0);
}
