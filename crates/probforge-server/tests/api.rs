use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use probforge_core::model::ProblemFilter;
use probforge_core::traits::ContentStore;
use probforge_core::{GatewaySettings, GenerationRetry, InMemoryStore, VariantGateway};
use probforge_providers::{MockProvider, ProviderError};
use probforge_server::{router, AppState, StateOptions};

struct TestApp {
    router: Router,
    provider: Arc<MockProvider>,
    store: Arc<InMemoryStore>,
}

fn test_app(provider: MockProvider) -> TestApp {
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(provider);
    let gateway = Arc::new(VariantGateway::new(
        provider.clone(),
        GatewaySettings::default(),
    ));
    let state = AppState::new(
        store.clone(),
        gateway,
        StateOptions {
            retry: GenerationRetry::none(),
            ..StateOptions::default()
        },
    );
    TestApp {
        router: router(state),
        provider,
        store,
    }
}

fn default_app() -> TestApp {
    test_app(MockProvider::with_variant(
        "Solve $x^2 = 16$.",
        "$x = \\pm 4$",
    ))
}

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    owner: Option<Uuid>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(owner) = owner {
        builder = builder.header("x-owner-id", owner.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_problem(app: &TestApp, body: Value) -> Value {
    let (status, problem) = send(app, Method::POST, "/problems", None, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{problem}");
    problem
}

fn id_of(value: &Value) -> String {
    value["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_ok() {
    let app = default_app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "probforge");
}

#[tokio::test]
async fn unknown_route_uses_error_body() {
    let app = default_app();
    let (status, body) = send(&app, Method::GET, "/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn create_and_fetch_problem() {
    let app = default_app();
    let owner = Uuid::new_v4();
    let (status, created) = send(
        &app,
        Method::POST,
        "/problems",
        Some(owner),
        Some(json!({"content": "What is 7 * 8?", "solution": "56", "difficulty": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["subject"], "math");
    assert_eq!(created["difficulty"], 2);
    assert_eq!(created["owner_id"], owner.to_string());
    assert!(created["parent_id"].is_null());

    let (status, fetched) = send(
        &app,
        Method::GET,
        &format!("/problems/{}", id_of(&created)),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, listed) = send(&app, Method::GET, "/problems", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn blank_content_is_rejected() {
    let app = default_app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/problems",
        None,
        Some(json!({"content": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn malformed_json_is_a_validation_error() {
    let app = default_app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/problems")
        .header("content-type", "application/json")
        .body(Body::from("{\"content\": "))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_and_malformed_ids() {
    let app = default_app();
    let (status, body) = send(
        &app,
        Method::GET,
        &format!("/problems/{}", Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) = send(&app, Method::GET, "/problems/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn generate_creates_linked_variant() {
    let app = default_app();
    let original = create_problem(
        &app,
        json!({"content": "Solve $x^2 = 9$.", "solution": "$x = \\pm 3$", "subject": "algebra", "difficulty": 3}),
    )
    .await;
    let original_id = id_of(&original);

    let (status, variant) = send(
        &app,
        Method::POST,
        &format!("/problems/{original_id}/generate"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{variant}");
    assert_eq!(variant["parent_id"], original_id.as_str());
    assert_eq!(variant["content"], "Solve $x^2 = 16$.");
    assert_eq!(variant["solution"], "$x = \\pm 4$");
    assert_eq!(variant["subject"], "algebra");
    assert_eq!(variant["difficulty"], 3);
    assert_eq!(app.provider.call_count(), 1);

    let (_, ancestors) = send(
        &app,
        Method::GET,
        &format!("/problems/{}/ancestors", id_of(&variant)),
        None,
        None,
    )
    .await;
    let ancestor_ids: Vec<&str> = ancestors
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_str().unwrap())
        .collect();
    assert_eq!(ancestor_ids, vec![original_id.as_str()]);

    let (_, children) = send(
        &app,
        Method::GET,
        &format!("/problems/{original_id}/children"),
        None,
        None,
    )
    .await;
    assert_eq!(children.as_array().unwrap().len(), 1);
    assert_eq!(children[0]["id"], variant["id"]);
}

#[tokio::test]
async fn generate_applies_overrides() {
    let app = default_app();
    let original = create_problem(&app, json!({"content": "2 + 2 = ?", "solution": "4"})).await;

    let (status, variant) = send(
        &app,
        Method::POST,
        &format!("/problems/{}/generate", id_of(&original)),
        None,
        Some(json!({"subject": "arithmetic", "difficulty": 4})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(variant["subject"], "arithmetic");
    assert_eq!(variant["difficulty"], 4);
    assert!(app
        .provider
        .last_request()
        .unwrap()
        .prompt
        .contains("arithmetic"));

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/problems/{}/generate", id_of(&original)),
        None,
        Some(json!({"difficulty": 9})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(app.provider.call_count(), 1);
}

#[tokio::test]
async fn generate_for_missing_problem_never_calls_provider() {
    let app = default_app();
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/problems/{}/generate", Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(app.provider.call_count(), 0);
}

#[tokio::test]
async fn format_error_persists_nothing() {
    let app = test_app(MockProvider::with_fixed_response(
        r#"{"content": "A new problem"}"#,
    ));
    let original = create_problem(&app, json!({"content": "1 + 1 = ?"})).await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/problems/{}/generate", id_of(&original)),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "GENERATION_FORMAT_ERROR");

    let all = app.store.list_problems(&ProblemFilter::default()).await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn provider_outage_is_unavailable() {
    let app = default_app();
    app.provider
        .push_reply(Err(ProviderError::NetworkError("connection refused".into())));
    let original = create_problem(&app, json!({"content": "3 * 3 = ?"})).await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/problems/{}/generate", id_of(&original)),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "GENERATION_UNAVAILABLE");
    assert_eq!(body["success"], false);

    let (_, children) = send(
        &app,
        Method::GET,
        &format!("/problems/{}/children", id_of(&original)),
        None,
        None,
    )
    .await;
    assert!(children.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn exam_requires_owner_header() {
    let app = default_app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/exams",
        None,
        Some(json!({"title": "Quiz 1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/exams")
        .header("x-owner-id", "someone")
        .header("content-type", "application/json")
        .body(Body::from(json!({"title": "Quiz 1"}).to_string()))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn exam_composition_flow() {
    let app = default_app();
    let owner = Uuid::new_v4();
    let (status, exam) = send(
        &app,
        Method::POST,
        "/exams",
        Some(owner),
        Some(json!({"title": "Midterm", "description": "Chapters 1-3"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(exam["owner_id"], owner.to_string());
    assert_eq!(exam["is_published"], false);
    let exam_id = id_of(&exam);

    let first = create_problem(&app, json!({"content": "first"})).await;
    let second = create_problem(&app, json!({"content": "second"})).await;
    let problems_uri = format!("/exams/{exam_id}/problems");

    for (problem, order_index) in [(&first, 2), (&second, 1)] {
        let (status, _) = send(
            &app,
            Method::POST,
            &problems_uri,
            None,
            Some(json!({"problem_id": id_of(problem), "order_index": order_index})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(
        &app,
        Method::POST,
        &problems_uri,
        None,
        Some(json!({"problem_id": id_of(&first), "order_index": 5})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DUPLICATE_LINK");

    let (_, entries) = send(&app, Method::GET, &problems_uri, None, None).await;
    let order: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["problem"]["content"].as_str().unwrap())
        .collect();
    assert_eq!(order, vec!["second", "first"]);

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("{problems_uri}/{}", id_of(&first)),
        None,
        Some(json!({"order_index": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, entries) = send(&app, Method::GET, &problems_uri, None, None).await;
    assert_eq!(entries[0]["problem"]["content"], "first");
    assert_eq!(entries[0]["order_index"], 0);

    // A linked problem cannot be deleted under the default policy.
    let (status, body) = send(
        &app,
        Method::DELETE,
        &format!("/problems/{}", id_of(&second)),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "PROBLEM_IN_USE");

    for _ in 0..2 {
        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("{problems_uri}/{}", id_of(&second)),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/problems/{}", id_of(&second)),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, published) = send(
        &app,
        Method::PUT,
        &format!("/exams/{exam_id}/publish"),
        None,
        Some(json!({"is_published": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(published["is_published"], true);

    let (_, mine) = send(
        &app,
        Method::GET,
        &format!("/exams?owner_id={owner}"),
        None,
        None,
    )
    .await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let (_, others) = send(
        &app,
        Method::GET,
        &format!("/exams?owner_id={}", Uuid::new_v4()),
        None,
        None,
    )
    .await;
    assert!(others.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn reorder_unknown_link_is_not_found() {
    let app = default_app();
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/exams/{}/problems/{}", Uuid::new_v4(), Uuid::new_v4()),
        None,
        Some(json!({"order_index": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}
