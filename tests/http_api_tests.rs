//! # HTTP API Tests
//!
//! Drive the router with `tower::ServiceExt::oneshot` against the in-memory
//! cluster.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{legacy_config, service_with_authorizer, ALICE_TOKEN};
use gitops_registration::cluster::{FailPoint, MemoryCluster};
use gitops_registration::server::{router, ServerState};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower::ServiceExt;

fn app(cluster: &Arc<MemoryCluster>, ready: bool) -> Router {
    let registrations = Arc::new(service_with_authorizer(cluster, legacy_config()));
    let state = Arc::new(ServerState::new(registrations));
    state.is_ready.store(ready, Ordering::Relaxed);
    router(state)
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_probes() {
    let cluster = Arc::new(MemoryCluster::new());

    let response = app(&cluster, false)
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&cluster, false)
        .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app(&cluster, true)
        .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let cluster = Arc::new(MemoryCluster::new());
    gitops_registration::observability::register_metrics().unwrap();

    let response = app(&cluster, true)
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_registration_returns_created() {
    let cluster = Arc::new(MemoryCluster::new());
    let response = app(&cluster, true)
        .oneshot(post_json(
            "/api/v1/registrations",
            r#"{"namespace":"team-prod","repository":{"url":"https://github.com/team/config"}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["namespace"], "team-prod");
    assert_eq!(body["status"]["phase"], "active");
    assert_eq!(body["status"]["namespaceCreated"], true);
    assert_eq!(body["status"]["argocdApplication"], "team-prod-app");
    assert_eq!(body["repository"]["branch"], "main");
}

#[tokio::test]
async fn test_duplicate_namespace_returns_conflict() {
    let cluster = Arc::new(MemoryCluster::new());
    cluster.insert_namespace("team-prod", BTreeMap::new());

    let response = app(&cluster, true)
        .oneshot(post_json(
            "/api/v1/registrations",
            r#"{"namespace":"team-prod","repository":{"url":"https://github.com/team/config"}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "NAMESPACE_CONFLICT");
}

#[tokio::test]
async fn test_invalid_bodies_return_bad_request() {
    let cluster = Arc::new(MemoryCluster::new());

    let response = app(&cluster, true)
        .oneshot(post_json("/api/v1/registrations", "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app(&cluster, true)
        .oneshot(post_json(
            "/api/v1/registrations",
            r#"{"namespace":"","repository":{"url":"https://github.com/team/config"}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_dependency_failure_is_opaque() {
    let cluster = Arc::new(MemoryCluster::new());
    cluster.fail_on(FailPoint::CreateAppProject);

    let response = app(&cluster, true)
        .oneshot(post_json(
            "/api/v1/registrations",
            r#"{"namespace":"team-a","repository":{"url":"https://github.com/user/repo"}}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "INTERNAL_ERROR");
    assert!(!body["message"].as_str().unwrap().contains("injected"));
}

#[tokio::test]
async fn test_existing_namespace_requires_bearer_token() {
    let cluster = Arc::new(MemoryCluster::new());
    cluster.insert_namespace("legacy-ns", BTreeMap::new());
    let body = r#"{"existingNamespace":"legacy-ns","repository":{"url":"https://github.com/user/repo"}}"#;

    let response = app(&cluster, true)
        .oneshot(post_json("/api/v1/registrations/existing", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut request = post_json("/api/v1/registrations/existing", body);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {ALICE_TOKEN}").parse().unwrap(),
    );
    let response = app(&cluster, true).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    assert_eq!(body["createdBy"], "alice");
    assert_eq!(body["status"]["namespaceCreated"], false);
}

#[tokio::test]
async fn test_existing_namespace_forbidden() {
    let cluster = Arc::new(MemoryCluster::new());
    cluster.insert_namespace("kube-system", BTreeMap::new());

    let mut request = post_json(
        "/api/v1/registrations/existing",
        r#"{"existingNamespace":"kube-system","repository":{"url":"https://github.com/user/repo"}}"#,
    );
    request.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {ALICE_TOKEN}").parse().unwrap(),
    );
    let response = app(&cluster, true).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
