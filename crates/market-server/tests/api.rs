//! End-to-end API tests
//!
//! Drive the full router in-process against the mock gateway.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use market_core::{CatalogStore, NewAgent, NewTeam, WorkflowStep};
use market_payments::{IntentStatus, MockGateway, PaymentGateway};
use market_server::{build_router, AppState};

struct TestApp {
    router: Router,
    gateway: Arc<MockGateway>,
}

async fn app() -> TestApp {
    app_with(|state| state).await
}

async fn app_with(configure: impl FnOnce(AppState) -> AppState) -> TestApp {
    let gateway = Arc::new(MockGateway::new());
    let state = configure(AppState::in_memory(Some(gateway.clone() as Arc<dyn PaymentGateway>)));

    state
        .catalog
        .create_agent(
            NewAgent {
                name: "Email Assistant".into(),
                description: "Automates email".into(),
                price: 2999,
                category: "Communication".into(),
                is_popular: true,
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    let team = state
        .catalog
        .create_team(
            NewTeam {
                name: "LexiSuite".into(),
                description: "Legal document pipeline".into(),
                category: "Legal".into(),
                price: 9999,
                workflow: vec![WorkflowStep {
                    step: 1,
                    description: "Ingest".into(),
                    agent: "LexiScan".into(),
                }],
                is_featured: true,
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    state
        .catalog
        .create_agent(
            NewAgent {
                name: "LexiScan".into(),
                description: "Reads contracts".into(),
                price: 0,
                category: "Legal".into(),
                team_id: Some(team.id),
                team_role: Some("Intake".into()),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();

    TestApp {
        router: build_router(state),
        gateway,
    }
}

enum Caller {
    Anonymous,
    User(u64),
    Admin(u64),
}

impl TestApp {
    async fn call(&self, method: Method, uri: &str, caller: Caller, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        match caller {
            Caller::Anonymous => {}
            Caller::User(id) => {
                builder = builder
                    .header("x-user-id", id.to_string())
                    .header("x-user-email", format!("user{id}@example.com"));
            }
            Caller::Admin(id) => {
                builder = builder
                    .header("x-user-id", id.to_string())
                    .header("x-user-email", format!("admin{id}@example.com"))
                    .header("x-user-role", "admin");
            }
        }

        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

#[tokio::test]
async fn test_health() {
    let app = app().await;
    let (status, body) = app.call(Method::GET, "/api/health", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["paymentsEnabled"], true);
    assert_eq!(body["webhooksEnabled"], false);
}

#[tokio::test]
async fn test_catalog_reads() {
    let app = app().await;

    let (status, agents) = app.call(Method::GET, "/api/agents", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(agents.as_array().unwrap().len(), 2);

    let (_, featured) = app.call(Method::GET, "/api/agents/featured", Caller::Anonymous, None).await;
    assert_eq!(featured.as_array().unwrap().len(), 1);
    assert_eq!(featured[0]["name"], "Email Assistant");

    let (status, team) = app.call(Method::GET, "/api/agent-teams/1", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(team["name"], "LexiSuite");
    assert_eq!(team["agents"][0]["name"], "LexiScan");
    assert_eq!(team["workflow"][0]["step"], 1);

    let (status, body) = app.call(Method::GET, "/api/agents/99", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Agent not found");
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) = app.call(Method::GET, "/api/agents/abc", Caller::Anonymous, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid agent ID");
}

#[tokio::test]
async fn test_subscription_flow() {
    let app = app().await;
    app.gateway.queue_intent_id("pi_1").await;

    let (status, started) = app
        .call(Method::POST, "/api/agents/1/create-payment-intent", Caller::User(5), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(started["clientSecret"].as_str().unwrap().starts_with("pi_1_secret_"));
    let subscription_id = started["subscriptionId"].as_u64().unwrap();

    let (_, rows) = app.call(Method::GET, "/api/user/subscriptions", Caller::User(5), None).await;
    assert_eq!(rows[0]["status"], "pending");
    assert_eq!(rows[0]["paymentIntentId"], "pi_1");
    assert_eq!(rows[0]["agentId"], 1);

    // Browser has not confirmed yet
    let complete_uri = format!("/api/subscriptions/{subscription_id}/complete");
    let (status, body) = app
        .call(Method::POST, &complete_uri, Caller::User(5), Some(json!({"paymentIntentId": "pi_1"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "PAYMENT_NOT_COMPLETE");

    app.gateway.set_intent_status("pi_1", IntentStatus::Succeeded).await;
    let (status, body) = app
        .call(Method::POST, &complete_uri, Caller::User(5), Some(json!({"paymentIntentId": "pi_1"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");
    assert_eq!(app.gateway.customers().await.len(), 1);

    let (_, agents) = app.call(Method::GET, "/api/user/agents", Caller::User(5), None).await;
    assert_eq!(agents.as_array().unwrap().len(), 1);

    let (status, body) = app
        .call(Method::POST, "/api/agents/1/create-payment-intent", Caller::User(5), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "CONFLICT");

    let cancel_uri = format!("/api/subscriptions/{subscription_id}/cancel");
    let (status, _) = app.call(Method::POST, &cancel_uri, Caller::User(6), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, canceled) = app.call(Method::POST, &cancel_uri, Caller::User(5), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(canceled["status"], "canceled");
    assert!(canceled["endDate"].is_string());

    let (status, _) = app.call(Method::POST, &cancel_uri, Caller::User(5), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, agents) = app.call(Method::GET, "/api/user/agents", Caller::User(5), None).await;
    assert!(agents.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_complete_body_validation() {
    let app = app().await;
    let (_, started) = app
        .call(Method::POST, "/api/agents/1/create-payment-intent", Caller::User(5), None)
        .await;
    let uri = format!("/api/subscriptions/{}/complete", started["subscriptionId"]);

    let (status, body) = app.call(Method::POST, &uri, Caller::User(5), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Payment intent ID is required");

    let (status, _) = app
        .call(Method::POST, "/api/subscriptions/77/complete", Caller::User(5), Some(json!({"paymentIntentId": "pi"})))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_team_subscription_flow() {
    let app = app().await;
    app.gateway.queue_intent_id("pi_team").await;

    let (status, started) = app
        .call(Method::POST, "/api/agent-teams/1/create-payment-intent", Caller::User(3), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(app.gateway.intent("pi_team").await.unwrap().amount, 9999);

    app.gateway.set_intent_status("pi_team", IntentStatus::Succeeded).await;
    let uri = format!("/api/team-subscriptions/{}/complete", started["subscriptionId"]);
    let (status, body) = app
        .call(Method::POST, &uri, Caller::User(3), Some(json!({"paymentIntentId": "pi_team"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["teamId"], 1);

    let (_, teams) = app.call(Method::GET, "/api/user/agent-teams", Caller::User(3), None).await;
    assert_eq!(teams[0]["name"], "LexiSuite");

    let (_, rows) = app.call(Method::GET, "/api/user/team-subscriptions", Caller::User(3), None).await;
    assert_eq!(rows.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_authentication_required() {
    let app = app().await;

    for uri in ["/api/user/subscriptions", "/api/user/agents", "/api/user/workflow-requests"] {
        let (status, body) = app.call(Method::GET, uri, Caller::Anonymous, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["message"], "Unauthorized");
    }

    let (status, _) = app
        .call(Method::POST, "/api/agents/1/create-payment-intent", Caller::Anonymous, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.gateway.intent_count().await, 0);
}

#[tokio::test]
async fn test_admin_catalog_management() {
    let app = app().await;
    let new_agent = json!({
        "name": "Invoice Bot",
        "description": "Chases invoices",
        "price": 1999,
        "category": "Finance",
        "features": ["Reminders"],
        "isNew": true
    });

    let (status, _) = app
        .call(Method::POST, "/api/admin/agents", Caller::User(5), Some(new_agent.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = app
        .call(Method::POST, "/api/admin/agents", Caller::Admin(1), Some(new_agent))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["createdBy"], 1);
    let uri = format!("/api/admin/agents/{}", created["id"]);

    let (status, updated) = app
        .call(Method::PATCH, &uri, Caller::Admin(1), Some(json!({"price": 2499})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["price"], 2499);
    assert_eq!(updated["name"], "Invoice Bot");

    let (status, _) = app
        .call(Method::PATCH, &uri, Caller::Admin(1), Some(json!({"price": -1})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.call(Method::DELETE, &uri, Caller::Admin(1), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call(Method::DELETE, &uri, Caller::Admin(1), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/admin/agents",
            Caller::Admin(1),
            Some(json!({"name": "", "description": "d", "price": 1, "category": "c"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, team) = app
        .call(
            Method::POST,
            "/api/admin/agent-teams",
            Caller::Admin(1),
            Some(json!({"name": "Ops Crew", "description": "Runs ops", "category": "Ops", "price": 5000})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/admin/agent-teams/{}", team["id"]);
    let (status, _) = app
        .call(Method::PATCH, &uri, Caller::Admin(1), Some(json!({"isPopular": true})))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app.call(Method::DELETE, &uri, Caller::Admin(1), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_workflow_requests() {
    let app = app().await;
    let (status, created) = app
        .call(
            Method::POST,
            "/api/workflow-requests",
            Caller::User(4),
            Some(json!({
                "name": "Invoice routing",
                "description": "Send invoices to approvers",
                "complexity": "advanced",
                "integrations": "Slack,QuickBooks",
                "status": "approved"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");
    assert_eq!(created["userId"], 4);

    let (_, mine) = app.call(Method::GET, "/api/user/workflow-requests", Caller::User(4), None).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let (_, theirs) = app.call(Method::GET, "/api/user/workflow-requests", Caller::User(8), None).await;
    assert!(theirs.as_array().unwrap().is_empty());

    let (status, _) = app
        .call(
            Method::POST,
            "/api/workflow-requests",
            Caller::User(4),
            Some(json!({"name": "x", "description": "y", "complexity": "galactic"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, all) = app
        .call(Method::GET, "/api/admin/workflow-requests", Caller::Admin(1), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().unwrap().len(), 1);

    let uri = format!("/api/admin/workflow-requests/{}", created["id"]);
    let (status, updated) = app
        .call(Method::PATCH, &uri, Caller::Admin(1), Some(json!({"status": "approved"})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "approved");

    let (status, body) = app
        .call(Method::PATCH, &uri, Caller::Admin(1), Some(json!({"status": "archived"})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid status");

    let (status, body) = app
        .call(
            Method::PATCH,
            "/api/admin/workflow-requests/42",
            Caller::Admin(1),
            Some(json!({"status": "rejected"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Workflow request not found");
}

#[tokio::test]
async fn test_admin_sweep() {
    let app = app().await;
    app.gateway.queue_intent_id("pi_1").await;
    app.call(Method::POST, "/api/agents/1/create-payment-intent", Caller::User(5), None)
        .await;

    let (status, _) = app
        .call(Method::POST, "/api/admin/subscriptions/sweep", Caller::Admin(1), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (status, body) = app
        .call(Method::POST, "/api/admin/subscriptions/sweep?olderThanSecs=0", Caller::Admin(1), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["agentSubscriptions"].as_array().unwrap().len(), 1);
    assert_eq!(body["agentSubscriptions"][0]["status"], "canceled");
    assert!(body["teamSubscriptions"].as_array().unwrap().is_empty());
    assert_eq!(app.gateway.intent("pi_1").await.unwrap().status, IntentStatus::Canceled);
}

#[tokio::test]
async fn test_free_agent_cannot_be_purchased() {
    let app = app().await;

    // LexiScan is listed at price 0
    let (status, body) = app
        .call(Method::POST, "/api/agents/2/create-payment-intent", Caller::User(5), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(app.gateway.intent_count().await, 0);
}

#[tokio::test]
async fn test_configured_ttl_sweep() {
    let app = app_with(|state| state.with_pending_ttl(std::time::Duration::from_secs(3600))).await;
    app.call(Method::POST, "/api/agents/1/create-payment-intent", Caller::User(5), None)
        .await;

    let (status, body) = app
        .call(Method::POST, "/api/admin/subscriptions/sweep", Caller::Admin(1), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["agentSubscriptions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_webhook_endpoint() {
    let app = app().await;
    let (status, body) = app
        .call(Method::POST, "/api/webhooks/stripe", Caller::Anonymous, Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "WEBHOOKS_DISABLED");

    let app = app_with(|state| state.with_webhook_secret("whsec_test")).await;
    let (status, body) = app
        .call(Method::POST, "/api/webhooks/stripe", Caller::Anonymous, Some(json!({})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_SIGNATURE");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/webhooks/stripe")
        .header("stripe-signature", "t=1,v1=deadbeef")
        .body(Body::from(r#"{"id":"evt_1"}"#))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_payments_disabled() {
    let state = AppState::in_memory(None);
    state
        .catalog
        .create_agent(
            NewAgent {
                name: "a".into(),
                description: "d".into(),
                price: 100,
                category: "c".into(),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    let router = build_router(state);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/agents/1/create-payment-intent")
        .header("x-user-id", "1")
        .header("x-user-email", "a@example.com")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
