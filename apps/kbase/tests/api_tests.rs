//! Integration tests for the Knowledge Base HTTP API.
//!
//! Uses axum-test to exercise the router without starting a real server.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::{HeaderValue, StatusCode, header};
use axum_test::TestServer;
use kbase::api::{
    AppState, CarrierJson, ComponentsResponse, DeleteSeriesResponse, ErrorResponse,
    HealthResponse, KnowledgeBaseResponse, OperatorsResponse, PayloadJson, PointerResponse,
    StatusResponse, StructureResponse, VersionsResponse, create_router,
};
use kbase::config::{DEFAULT_BODY_LIMIT, SecurityConfig};
use kbase_core::primitives::DEFAULT_NAMESPACE;
use kbase_core::{
    KbError, KnowledgeBase, KnowledgeBaseStore, KnowledgeCarrier, KnowledgeOperator, Params,
    Registry, ResourceId, Weaver,
};
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn open_security() -> SecurityConfig {
    SecurityConfig {
        api_key: None,
        rate_limit: 0,
        cors_origins: None,
    }
}

/// Create a test server over a fresh in-memory store.
fn create_test_server() -> TestServer {
    let store = Arc::new(KnowledgeBaseStore::new());
    let router = create_router(AppState::new(store), &open_security(), DEFAULT_BODY_LIMIT);
    TestServer::new(router).unwrap()
}

/// Create a test server with authentication enabled.
fn create_auth_test_server(api_key: &str) -> TestServer {
    let security = SecurityConfig {
        api_key: Some(api_key.to_string()),
        ..open_security()
    };
    let store = Arc::new(KnowledgeBaseStore::new());
    let router = create_router(AppState::new(store), &security, DEFAULT_BODY_LIMIT);
    TestServer::new(router).unwrap()
}

fn carrier_body(id: Option<&str>, payload: Value) -> Value {
    let mut body = json!({
        "representation": { "language": "DMN_1_2" },
        "payload": payload,
    });
    if let Some(id) = id {
        body["asset_id"] = json!(id);
    }
    body
}

fn open_composite() -> Value {
    json!({ "kind": "composite", "components": [] })
}

fn parsed(value: Value) -> Value {
    json!({ "kind": "parsed", "value": value })
}

async fn init_with(server: &TestServer, carrier: Option<Value>) -> PointerResponse {
    let body = match carrier {
        Some(c) => json!({ "carrier": c }),
        None => json!({}),
    };
    let response = server.post("/kbase").json(&body).await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

fn version_path(pointer: &PointerResponse) -> String {
    format!("/kbase/{}/{}", pointer.tag, pointer.version)
}

// =============================================================================
// HEALTH & STATUS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_status_counts_versions() {
    let server = create_test_server();

    let status: StatusResponse = server.get("/status").await.json();
    assert_eq!(status.versions, 0);

    init_with(&server, None).await;
    let status: StatusResponse = server.get("/status").await.json();
    assert_eq!(status.versions, 1);
    assert!(!status.namespace.is_empty());
}

// =============================================================================
// CREATION
// =============================================================================

#[tokio::test]
async fn test_init_empty_is_version_zero() {
    let server = create_test_server();

    let pointer = init_with(&server, None).await;
    assert_eq!(pointer.version, "0");

    let kb: KnowledgeBaseResponse = server.get(&version_path(&pointer)).await.json();
    assert!(kb.local);
    assert!(kb.manifestation.is_none());
}

#[tokio::test]
async fn test_init_from_carrier_keeps_asset_id() {
    let server = create_test_server();
    let tag = Uuid::new_v4();
    let id = format!("urn:test/{}/versions/1.0", tag);

    let pointer = init_with(&server, Some(carrier_body(Some(&id), parsed(json!({"a": 1}))))).await;

    assert_eq!(pointer.tag, tag);
    assert_eq!(pointer.version, "1.0");
    let kb: KnowledgeBaseResponse = server.get(&version_path(&pointer)).await.json();
    let manifestation = kb.manifestation.unwrap();
    assert_eq!(manifestation.payload, PayloadJson::Parsed { value: json!({"a": 1}) });
}

#[tokio::test]
async fn test_init_twice_conflicts() {
    let server = create_test_server();
    let id = format!("urn:test/{}/versions/1", Uuid::new_v4());
    let body = json!({ "carrier": carrier_body(Some(&id), parsed(json!(1))) });

    server.post("/kbase").json(&body).await.assert_status(StatusCode::CREATED);
    let response = server.post("/kbase").json(&body).await;

    response.assert_status(StatusCode::CONFLICT);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, "AlreadyInitialized");
}

#[tokio::test]
async fn test_invalid_asset_id_is_bad_request() {
    let server = create_test_server();
    let body = json!({ "carrier": carrier_body(Some("not-an-id"), parsed(json!(1))) });

    let response = server.post("/kbase").json(&body).await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bytes_payload_round_trips_as_base64() {
    let server = create_test_server();
    let payload = json!({ "kind": "bytes", "base64": "PGRlZmluaXRpb25zLz4=" });

    let pointer = init_with(&server, Some(carrier_body(None, payload))).await;

    let kb: KnowledgeBaseResponse = server.get(&version_path(&pointer)).await.json();
    assert_eq!(
        kb.manifestation.unwrap().payload,
        PayloadJson::Bytes {
            base64: "PGRlZmluaXRpb25zLz4=".to_string()
        }
    );
}

#[tokio::test]
async fn test_invalid_base64_is_bad_request() {
    let server = create_test_server();
    let payload = json!({ "kind": "bytes", "base64": "***" });
    let body = json!({ "carrier": carrier_body(None, payload) });

    let response = server.post("/kbase").json(&body).await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

// =============================================================================
// POPULATE & COMPONENTS
// =============================================================================

#[tokio::test]
async fn test_populate_open_composite_appends() {
    let server = create_test_server();
    let pointer = init_with(&server, Some(carrier_body(None, open_composite()))).await;
    let path = version_path(&pointer);

    for n in 0..2 {
        server
            .post(&format!("{}/populate", path))
            .json(&carrier_body(None, parsed(json!(n))))
            .await
            .assert_status_ok();
    }

    let components: ComponentsResponse = server.get(&format!("{}/components", path)).await.json();
    assert_eq!(components.components.len(), 2);
}

#[tokio::test]
async fn test_populate_closed_composite_is_unprocessable() {
    let server = create_test_server();
    let closed = json!({ "kind": "composite", "components": [], "aggregation": "uniform" });
    let pointer = init_with(&server, Some(carrier_body(None, closed))).await;

    let response = server
        .post(&format!("{}/populate", version_path(&pointer)))
        .json(&carrier_body(None, parsed(json!(1))))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, "Unsupported");
}

#[tokio::test]
async fn test_populate_missing_version_is_not_found() {
    let server = create_test_server();

    let response = server
        .post(&format!("/kbase/{}/0/populate", Uuid::new_v4()))
        .json(&carrier_body(None, parsed(json!(1))))
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn test_components_of_atomic_is_unprocessable() {
    let server = create_test_server();
    let pointer = init_with(&server, Some(carrier_body(None, parsed(json!(1))))).await;

    let response = server
        .get(&format!("{}/components", version_path(&pointer)))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

// =============================================================================
// STRUCTURE
// =============================================================================

#[tokio::test]
async fn test_set_structure_marks_graph() {
    let server = create_test_server();
    let pointer = init_with(&server, Some(carrier_body(None, open_composite()))).await;
    let path = version_path(&pointer);

    let before: StructureResponse = server.get(&format!("{}/structure", path)).await.json();
    assert!(before.structure.is_none());

    server
        .put(&format!("{}/structure", path))
        .json(&carrier_body(None, parsed(json!({"edges": []}))))
        .await
        .assert_status_ok();

    let after: StructureResponse = server.get(&format!("{}/structure", path)).await.json();
    assert!(after.structure.is_some());
    let kb: KnowledgeBaseResponse = server.get(&path).await.json();
    let CarrierJson { payload, .. } = kb.manifestation.unwrap();
    let PayloadJson::Composite { aggregation, .. } = payload else {
        panic!("expected composite manifestation");
    };
    assert_eq!(aggregation, kbase_core::Aggregation::Graph);
}

// =============================================================================
// VERSIONING & DELETION
// =============================================================================

#[tokio::test]
async fn test_next_version_shares_tag() {
    let server = create_test_server();
    let pointer = init_with(&server, Some(carrier_body(None, parsed(json!("x"))))).await;

    let response = server
        .post(&format!("{}/next", version_path(&pointer)))
        .await;
    response.assert_status(StatusCode::CREATED);
    let next: PointerResponse = response.json();

    assert_eq!(next.tag, pointer.tag);
    assert_ne!(next.version, pointer.version);
    let forked: KnowledgeBaseResponse = server.get(&version_path(&next)).await.json();
    assert!(forked.manifestation.is_some());

    let versions: VersionsResponse = server
        .get(&format!("/kbase/{}/versions", pointer.tag))
        .await
        .json();
    assert_eq!(versions.versions.len(), 2);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let server = create_test_server();
    let pointer = init_with(&server, None).await;
    let path = version_path(&pointer);

    server.delete(&path).await.assert_status(StatusCode::NO_CONTENT);
    server.delete(&path).await.assert_status(StatusCode::NO_CONTENT);
    server.get(&path).await.assert_status_not_found();
}

#[tokio::test]
async fn test_delete_series_removes_every_version() {
    let server = create_test_server();
    let pointer = init_with(&server, None).await;
    server
        .post(&format!("{}/next", version_path(&pointer)))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server.delete(&format!("/kbase/{}", pointer.tag)).await;

    response.assert_status_ok();
    let deleted: DeleteSeriesResponse = response.json();
    assert_eq!(deleted.removed, 2);
    let status: StatusResponse = server.get("/status").await.json();
    assert_eq!(status.versions, 0);
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[tokio::test]
async fn test_404_on_unknown_endpoint() {
    let server = create_test_server();

    server.get("/unknown").await.assert_status_not_found();
}

#[tokio::test]
async fn test_method_not_allowed() {
    let server = create_test_server();

    let response = server.post("/health").await;
    assert_eq!(response.status_code(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_invalid_json_body() {
    let server = create_test_server();

    let response = server
        .post("/kbase")
        .text("not valid json")
        .content_type("application/json")
        .await;

    assert!(response.status_code().is_client_error());
}

#[tokio::test]
async fn test_malformed_tag_is_client_error() {
    let server = create_test_server();

    let response = server.get("/kbase/not-a-uuid/0").await;

    assert!(response.status_code().is_client_error());
}

// =============================================================================
// AUTHENTICATION
// =============================================================================

#[tokio::test]
async fn test_auth_valid_bearer_token() {
    let api_key = "test-secret-key-12345";
    let server = create_auth_test_server(api_key);

    let response = server
        .get("/status")
        .add_header(
            header::AUTHORIZATION,
            format!("Bearer {}", api_key).parse::<HeaderValue>().unwrap(),
        )
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_valid_raw_token() {
    let api_key = "test-raw-key-67890";
    let server = create_auth_test_server(api_key);

    let response = server
        .get("/status")
        .add_header(header::AUTHORIZATION, api_key.parse::<HeaderValue>().unwrap())
        .await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_auth_invalid_token_rejected() {
    let server = create_auth_test_server("correct-key");

    let response = server
        .get("/status")
        .add_header(
            header::AUTHORIZATION,
            "Bearer wrong-key".parse::<HeaderValue>().unwrap(),
        )
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_missing_header_rejected() {
    let server = create_auth_test_server("required-key");

    server
        .post("/kbase")
        .json(&json!({}))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_bearer_prefix_only_rejected() {
    let server = create_auth_test_server("actual-key");

    let response = server
        .get("/status")
        .add_header(header::AUTHORIZATION, "Bearer ".parse::<HeaderValue>().unwrap())
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_health_endpoint_bypasses_auth() {
    let server = create_auth_test_server("secret-key-for-bypass-test");

    let response = server.get("/health").await;

    response.assert_status_ok();
}

// =============================================================================
// RATE LIMITING
// =============================================================================

#[tokio::test]
async fn test_rate_limit_rejects_burst() {
    let security = SecurityConfig {
        rate_limit: 1,
        ..open_security()
    };
    let store = Arc::new(KnowledgeBaseStore::new());
    let server =
        TestServer::new(create_router(AppState::new(store), &security, DEFAULT_BODY_LIMIT))
            .unwrap();

    server.get("/health").await.assert_status_ok();
    server
        .get("/health")
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);
}

// =============================================================================
// OPERATOR DISPATCH
// =============================================================================

/// Labels the manifestation with the `label` param; fails when `fail` is set.
struct LabelWeaver {
    id: ResourceId,
}

impl KnowledgeOperator for LabelWeaver {
    fn operator_id(&self) -> ResourceId {
        self.id.clone()
    }
}

impl Weaver for LabelWeaver {
    fn weave(
        &self,
        kbase: &KnowledgeBase,
        _aspects: &KnowledgeCarrier,
        params: &Params,
    ) -> Result<KnowledgeCarrier, KbError> {
        if params.contains_key("fail") {
            return Err(KbError::operator(self.id.tag, "asked to fail"));
        }
        let label = params.get("label").cloned().unwrap_or_default();
        Ok(kbase.require_manifestation()?.clone().with_label(label))
    }
}

/// A test server whose registry holds one `LabelWeaver`, plus its id.
fn create_dispatch_test_server() -> (TestServer, Uuid) {
    let weaver = LabelWeaver {
        id: ResourceId::random(DEFAULT_NAMESPACE, "1"),
    };
    let operator = weaver.id.tag;
    let registry = Registry::builder()
        .with_named_weaver(Arc::new(weaver))
        .build()
        .unwrap();
    let state = AppState::with_registry(Arc::new(KnowledgeBaseStore::new()), registry);
    let router = create_router(state, &open_security(), DEFAULT_BODY_LIMIT);
    (TestServer::new(router).unwrap(), operator)
}

fn dispatch_path(pointer: &PointerResponse, capability: &str) -> String {
    format!("{}/dispatch/{}", version_path(pointer), capability)
}

#[tokio::test]
async fn test_named_weave_commits_new_version() {
    let (server, operator) = create_dispatch_test_server();
    let base = init_with(&server, Some(carrier_body(None, parsed(json!("x"))))).await;

    let response = server
        .post(&dispatch_path(&base, "weave"))
        .json(&json!({
            "operator": operator,
            "carrier": carrier_body(None, parsed(json!("aspects"))),
            "params": { "label": "woven" },
        }))
        .await;

    response.assert_status(StatusCode::CREATED);
    let woven: PointerResponse = response.json();
    assert_eq!(woven.tag, base.tag);
    assert_ne!(woven.version, base.version);
    let kb: KnowledgeBaseResponse = server.get(&version_path(&woven)).await.json();
    assert_eq!(kb.manifestation.unwrap().label.as_deref(), Some("woven"));
    let original: KnowledgeBaseResponse = server.get(&version_path(&base)).await.json();
    assert!(original.manifestation.unwrap().label.is_none());
}

#[tokio::test]
async fn test_failed_dispatch_leaves_no_version() {
    let (server, operator) = create_dispatch_test_server();
    let base = init_with(&server, Some(carrier_body(None, parsed(json!("x"))))).await;

    let response = server
        .post(&dispatch_path(&base, "weave"))
        .json(&json!({
            "operator": operator,
            "carrier": carrier_body(None, parsed(json!("aspects"))),
            "params": { "fail": "yes" },
        }))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, "OperatorFailure");
    let versions: VersionsResponse = server
        .get(&format!("/kbase/{}/versions", base.tag))
        .await
        .json();
    assert_eq!(versions.versions, vec![base.version]);
}

#[tokio::test]
async fn test_unnamed_weave_uses_registered_operator() {
    let (server, _) = create_dispatch_test_server();
    let base = init_with(&server, Some(carrier_body(None, parsed(json!("x"))))).await;

    let response = server
        .post(&dispatch_path(&base, "weave"))
        .json(&json!({ "carrier": carrier_body(None, parsed(json!("aspects"))) }))
        .await;

    response.assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn test_dispatch_on_empty_registry_is_unprocessable() {
    let server = create_test_server();
    let base = init_with(&server, Some(carrier_body(None, parsed(json!("x"))))).await;

    let response = server
        .post(&dispatch_path(&base, "transform"))
        .json(&json!({}))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let error: ErrorResponse = response.json();
    assert_eq!(error.kind, "Unsupported");
}

#[tokio::test]
async fn test_dispatch_unknown_operator_or_capability_is_unprocessable() {
    let (server, _) = create_dispatch_test_server();
    let base = init_with(&server, Some(carrier_body(None, parsed(json!("x"))))).await;
    let aspects = json!({ "carrier": carrier_body(None, parsed(json!("aspects"))) });

    server
        .post(&dispatch_path(&base, "compose"))
        .json(&aspects)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    let mut named = aspects.clone();
    named["operator"] = json!(Uuid::new_v4());
    server
        .post(&dispatch_path(&base, "weave"))
        .json(&named)
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_weave_without_carrier_is_unprocessable() {
    let (server, operator) = create_dispatch_test_server();
    let base = init_with(&server, Some(carrier_body(None, parsed(json!("x"))))).await;

    let response = server
        .post(&dispatch_path(&base, "weave"))
        .json(&json!({ "operator": operator }))
        .await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let error: ErrorResponse = response.json();
    assert!(error.error.contains("carrier"));
}

#[tokio::test]
async fn test_operators_lists_registry() {
    let (server, operator) = create_dispatch_test_server();

    let response = server.get("/operators").await;

    response.assert_status_ok();
    let listing: OperatorsResponse = response.json();
    assert_eq!(listing.operators.len(), 7);
    assert_eq!(listing.operators["weave"], vec![operator]);
    assert!(listing.operators["bind"].is_empty());
}
