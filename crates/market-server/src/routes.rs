//! Router

use axum::{
    routing::{get, patch, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    admin_create_agent, admin_create_team, admin_delete_agent, admin_delete_team, admin_sweep_pending,
    admin_update_agent, admin_update_team, admin_update_workflow_request, admin_workflow_requests,
    cancel_agent_subscription, cancel_team_subscription, complete_agent_subscription, complete_team_subscription,
    create_workflow_request, featured_agents, featured_teams, get_agent, get_team, health_check, list_agents,
    list_teams, start_agent_subscription, start_team_subscription, stripe_webhook, user_agents, user_subscriptions,
    user_team_subscriptions, user_teams, user_workflow_requests,
};
use crate::state::AppState;

/// Every endpoint, mounted under `/api`
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        // Catalog
        .route("/agents", get(list_agents))
        .route("/agents/featured", get(featured_agents))
        .route("/agents/{id}", get(get_agent))
        .route("/agent-teams", get(list_teams))
        .route("/agent-teams/featured", get(featured_teams))
        .route("/agent-teams/{id}", get(get_team))
        // Agent subscriptions
        .route("/agents/{id}/create-payment-intent", post(start_agent_subscription))
        .route("/subscriptions/{id}/complete", post(complete_agent_subscription))
        .route("/subscriptions/{id}/cancel", post(cancel_agent_subscription))
        // Team subscriptions
        .route("/agent-teams/{id}/create-payment-intent", post(start_team_subscription))
        .route("/team-subscriptions/{id}/complete", post(complete_team_subscription))
        .route("/team-subscriptions/{id}/cancel", post(cancel_team_subscription))
        // Caller's records
        .route("/user/subscriptions", get(user_subscriptions))
        .route("/user/agents", get(user_agents))
        .route("/user/team-subscriptions", get(user_team_subscriptions))
        .route("/user/agent-teams", get(user_teams))
        .route("/user/workflow-requests", get(user_workflow_requests))
        .route("/workflow-requests", post(create_workflow_request))
        // Admin
        .route("/admin/agents", post(admin_create_agent))
        .route("/admin/agents/{id}", patch(admin_update_agent).delete(admin_delete_agent))
        .route("/admin/agent-teams", post(admin_create_team))
        .route("/admin/agent-teams/{id}", patch(admin_update_team).delete(admin_delete_team))
        .route("/admin/workflow-requests", get(admin_workflow_requests))
        .route("/admin/workflow-requests/{id}", patch(admin_update_workflow_request))
        .route("/admin/subscriptions/sweep", post(admin_sweep_pending))
        // Payments
        .route("/webhooks/stripe", post(stripe_webhook))
}

/// Full application with CORS and request tracing
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
