//! Black-box coverage of the HTTP surface over a full axum `Router`,
//! without binding a real TCP port.

use agor::config::{RuntimeConfig, ServiceRegistry};
use agor::domain_types::LlmServiceId;
use agor::llm_client::test_double::ScriptedLlmClient;
use agor::llm_client::LlmClient;
use agor::server::{AppState, create_router};
use agor::time_provider::test_time_provider;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

fn test_router() -> Router {
    let mut clients: HashMap<LlmServiceId, Arc<dyn LlmClient>> = HashMap::new();
    clients.insert(
        LlmServiceId::try_new("svc").unwrap(),
        Arc::new(ScriptedLlmClient::new(vec![])),
    );
    let state = Arc::new(AppState::new(
        RuntimeConfig::development(),
        ServiceRegistry::from_json("[]").unwrap(),
        clients,
        "base".to_string(),
        "rules".to_string(),
        test_time_provider(),
    ));
    create_router(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check_returns_ok() {
    let router = test_router();
    let response = router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn submitting_a_task_seeds_two_system_agents() {
    let router = test_router();

    let submit = Request::builder()
        .method("POST")
        .uri("/tasks")
        .header("content-type", "application/json")
        .body(Body::from(json!({"text": "hello"}).to_string()))
        .unwrap();
    let response = router.clone().oneshot(submit).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let task_id = body["task_id"].as_str().unwrap().to_string();

    let agents_req = Request::builder()
        .uri(format!("/tasks/{task_id}/agents"))
        .body(Body::empty())
        .unwrap();
    let agents_resp = router.oneshot(agents_req).await.unwrap();
    assert_eq!(agents_resp.status(), StatusCode::OK);
    let agents = body_json(agents_resp).await;
    assert_eq!(agents.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_task_id_yields_an_error_status() {
    let router = test_router();
    let request = Request::builder()
        .uri("/tasks/not-a-real-task/agents")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_ne!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn sending_a_message_to_an_unknown_agent_is_rejected() {
    let router = test_router();

    let submit = Request::builder()
        .method("POST")
        .uri("/tasks")
        .header("content-type", "application/json")
        .body(Body::from(json!({"text": "hello"}).to_string()))
        .unwrap();
    let response = router.clone().oneshot(submit).await.unwrap();
    let task_id = body_json(response).await["task_id"]
        .as_str()
        .unwrap()
        .to_string();

    let bogus_agent = uuid::Uuid::new_v4().to_string();
    let send = Request::builder()
        .method("POST")
        .uri(format!("/tasks/{task_id}/messages"))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "from": bogus_agent,
                "to": bogus_agent,
                "text": "hi",
            })
            .to_string(),
        ))
        .unwrap();
    let response = router.oneshot(send).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn aborting_an_idle_agent_reports_no_call_was_cancelled() {
    let router = test_router();

    let submit = Request::builder()
        .method("POST")
        .uri("/tasks")
        .header("content-type", "application/json")
        .body(Body::from(json!({"text": "hello"}).to_string()))
        .unwrap();
    let response = router.clone().oneshot(submit).await.unwrap();
    let task_id = body_json(response).await["task_id"]
        .as_str()
        .unwrap()
        .to_string();

    let agents_req = Request::builder()
        .uri(format!("/tasks/{task_id}/agents"))
        .body(Body::empty())
        .unwrap();
    let agents_resp = router.clone().oneshot(agents_req).await.unwrap();
    let agents = body_json(agents_resp).await;
    let root_id = agents
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["role_id"].is_string())
        .unwrap()["agent_id"]
        .as_str()
        .unwrap()
        .to_string();

    let abort_req = Request::builder()
        .method("POST")
        .uri(format!("/tasks/{task_id}/agents/{root_id}/abort"))
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(abort_req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let aborted = body_json(response).await;
    assert_eq!(aborted, json!(false));
}
