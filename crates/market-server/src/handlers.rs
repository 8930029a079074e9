//! HTTP Handlers

use std::str::FromStr;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

use market_core::{
    Agent, AgentId, AgentPatch, AgentSubscription, AgentTarget, AgentTeam, CatalogStore, MarketError, NewAgent,
    NewTeam, NewWorkflowRequest, RequestStatus, StartedSubscription, SubscriptionId, TeamId, TeamPatch,
    TeamSubscription, TeamTarget, WorkflowRequest, WorkflowRequestId, WorkflowRequestStore,
};

use crate::error::{ApiError, ApiResult};
use crate::extract::{AdminUser, CurrentUser};
use crate::state::AppState;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub payments_enabled: bool,
    pub webhooks_enabled: bool,
}

/// A team with its member agents
#[derive(Debug, Serialize)]
pub struct TeamDetail {
    #[serde(flatten)]
    pub team: AgentTeam,
    pub agents: Vec<Agent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    #[serde(default)]
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepParams {
    /// Overrides the configured pending TTL
    pub older_than_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepResponse {
    pub agent_subscriptions: Vec<AgentSubscription>,
    pub team_subscriptions: Vec<TeamSubscription>,
}

#[derive(Debug, Serialize)]
pub struct Acknowledged {
    pub received: bool,
}

fn parse_id<I: FromStr>(raw: &str, what: &'static str) -> ApiResult<I> {
    raw.parse().map_err(|_| ApiError::InvalidId(what))
}

fn not_found(entity: &'static str, id: impl ToString) -> ApiError {
    MarketError::not_found(entity, id).into()
}

// ============================================================================
// Catalog
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        payments_enabled: state.payments_enabled,
        webhooks_enabled: state.webhooks.is_some(),
    })
}

pub async fn list_agents(State(state): State<AppState>) -> ApiResult<Json<Vec<Agent>>> {
    Ok(Json(state.catalog.list_agents().await?))
}

pub async fn featured_agents(State(state): State<AppState>) -> ApiResult<Json<Vec<Agent>>> {
    Ok(Json(state.catalog.featured_agents().await?))
}

pub async fn get_agent(State(state): State<AppState>, Path(raw): Path<String>) -> ApiResult<Json<Agent>> {
    let id: AgentId = parse_id(&raw, "agent")?;
    let agent = state.catalog.get_agent(id).await?.ok_or_else(|| not_found("agent", id))?;
    Ok(Json(agent))
}

pub async fn list_teams(State(state): State<AppState>) -> ApiResult<Json<Vec<AgentTeam>>> {
    Ok(Json(state.catalog.list_teams().await?))
}

pub async fn featured_teams(State(state): State<AppState>) -> ApiResult<Json<Vec<AgentTeam>>> {
    Ok(Json(state.catalog.featured_teams().await?))
}

pub async fn get_team(State(state): State<AppState>, Path(raw): Path<String>) -> ApiResult<Json<TeamDetail>> {
    let id: TeamId = parse_id(&raw, "agent team")?;
    let team = state.catalog.get_team(id).await?.ok_or_else(|| not_found("agent team", id))?;
    let agents = state.catalog.team_agents(id).await?;
    Ok(Json(TeamDetail { team, agents }))
}

// ============================================================================
// Agent Subscriptions
// ============================================================================

/// Open a payment intent for an agent and record a pending subscription
pub async fn start_agent_subscription(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(raw): Path<String>,
) -> ApiResult<(StatusCode, Json<StartedSubscription>)> {
    let id: AgentId = parse_id(&raw, "agent")?;
    let started = state.agent_subscriptions.start(&user, AgentTarget::from(id)).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

pub async fn complete_agent_subscription(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(raw): Path<String>,
    payload: Result<Json<CompleteRequest>, JsonRejection>,
) -> ApiResult<Json<AgentSubscription>> {
    let id: SubscriptionId = parse_id(&raw, "subscription")?;
    let Json(body) = payload?;
    let intent = body.payment_intent_id.unwrap_or_default();
    Ok(Json(state.agent_subscriptions.complete(&user, id, &intent).await?))
}

pub async fn cancel_agent_subscription(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(raw): Path<String>,
) -> ApiResult<Json<AgentSubscription>> {
    let id: SubscriptionId = parse_id(&raw, "subscription")?;
    Ok(Json(state.agent_subscriptions.cancel(&user, id).await?))
}

pub async fn user_subscriptions(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<AgentSubscription>>> {
    Ok(Json(state.agent_subscriptions.list_for_user(user.user_id).await?))
}

/// Agents the caller holds an active subscription to
pub async fn user_agents(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Json<Vec<Agent>>> {
    Ok(Json(state.agent_subscriptions.subscribed_agents(user.user_id).await?))
}

// ============================================================================
// Team Subscriptions
// ============================================================================

pub async fn start_team_subscription(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(raw): Path<String>,
) -> ApiResult<(StatusCode, Json<StartedSubscription>)> {
    let id: TeamId = parse_id(&raw, "agent team")?;
    let started = state.team_subscriptions.start(&user, TeamTarget::from(id)).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

pub async fn complete_team_subscription(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(raw): Path<String>,
    payload: Result<Json<CompleteRequest>, JsonRejection>,
) -> ApiResult<Json<TeamSubscription>> {
    let id: SubscriptionId = parse_id(&raw, "subscription")?;
    let Json(body) = payload?;
    let intent = body.payment_intent_id.unwrap_or_default();
    Ok(Json(state.team_subscriptions.complete(&user, id, &intent).await?))
}

pub async fn cancel_team_subscription(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(raw): Path<String>,
) -> ApiResult<Json<TeamSubscription>> {
    let id: SubscriptionId = parse_id(&raw, "subscription")?;
    Ok(Json(state.team_subscriptions.cancel(&user, id).await?))
}

pub async fn user_team_subscriptions(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<TeamSubscription>>> {
    Ok(Json(state.team_subscriptions.list_for_user(user.user_id).await?))
}

pub async fn user_teams(State(state): State<AppState>, user: CurrentUser) -> ApiResult<Json<Vec<AgentTeam>>> {
    Ok(Json(state.team_subscriptions.subscribed_teams(user.user_id).await?))
}

// ============================================================================
// Workflow Requests
// ============================================================================

pub async fn create_workflow_request(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<NewWorkflowRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<WorkflowRequest>)> {
    let Json(body) = payload?;
    body.validate()?;
    let request = state.requests.create(user.user_id, body).await?;
    tracing::info!(request_id = %request.id, user_id = %user.user_id, "Workflow request submitted");
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn user_workflow_requests(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<WorkflowRequest>>> {
    Ok(Json(state.requests.list_by_user(user.user_id).await?))
}

// ============================================================================
// Admin
// ============================================================================

pub async fn admin_create_agent(
    State(state): State<AppState>,
    admin: AdminUser,
    payload: Result<Json<NewAgent>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Agent>)> {
    let Json(body) = payload?;
    body.validate()?;
    let agent = state.catalog.create_agent(body, Some(admin.user_id)).await?;
    tracing::info!(agent_id = %agent.id, admin = %admin.user_id, "Agent created");
    Ok((StatusCode::CREATED, Json(agent)))
}

pub async fn admin_update_agent(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(raw): Path<String>,
    payload: Result<Json<AgentPatch>, JsonRejection>,
) -> ApiResult<Json<Agent>> {
    let id: AgentId = parse_id(&raw, "agent")?;
    let Json(patch) = payload?;
    patch.validate()?;
    let agent = state
        .catalog
        .update_agent(id, patch)
        .await?
        .ok_or_else(|| not_found("agent", id))?;
    Ok(Json(agent))
}

pub async fn admin_delete_agent(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(raw): Path<String>,
) -> ApiResult<StatusCode> {
    let id: AgentId = parse_id(&raw, "agent")?;
    if !state.catalog.delete_agent(id).await? {
        return Err(not_found("agent", id));
    }
    tracing::info!(agent_id = %id, admin = %admin.user_id, "Agent deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn admin_create_team(
    State(state): State<AppState>,
    admin: AdminUser,
    payload: Result<Json<NewTeam>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AgentTeam>)> {
    let Json(body) = payload?;
    body.validate()?;
    let team = state.catalog.create_team(body, Some(admin.user_id)).await?;
    tracing::info!(team_id = %team.id, admin = %admin.user_id, "Agent team created");
    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn admin_update_team(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(raw): Path<String>,
    payload: Result<Json<TeamPatch>, JsonRejection>,
) -> ApiResult<Json<AgentTeam>> {
    let id: TeamId = parse_id(&raw, "agent team")?;
    let Json(patch) = payload?;
    patch.validate()?;
    let team = state
        .catalog
        .update_team(id, patch)
        .await?
        .ok_or_else(|| not_found("agent team", id))?;
    Ok(Json(team))
}

pub async fn admin_delete_team(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(raw): Path<String>,
) -> ApiResult<StatusCode> {
    let id: TeamId = parse_id(&raw, "agent team")?;
    if !state.catalog.delete_team(id).await? {
        return Err(not_found("agent team", id));
    }
    tracing::info!(team_id = %id, admin = %admin.user_id, "Agent team deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn admin_workflow_requests(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<WorkflowRequest>>> {
    Ok(Json(state.requests.list_all().await?))
}

pub async fn admin_update_workflow_request(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(raw): Path<String>,
    payload: Result<Json<StatusUpdate>, JsonRejection>,
) -> ApiResult<Json<WorkflowRequest>> {
    let id: WorkflowRequestId = parse_id(&raw, "request")?;
    let Json(body) = payload?;
    let status: RequestStatus = body.status.as_deref().unwrap_or_default().parse()?;

    let request = state
        .requests
        .set_status(id, status)
        .await?
        .ok_or_else(|| not_found("workflow request", id))?;
    Ok(Json(request))
}

/// Cancel pending subscriptions nobody paid for
pub async fn admin_sweep_pending(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(params): Query<SweepParams>,
) -> ApiResult<Json<SweepResponse>> {
    let ttl = params
        .older_than_secs
        .map(Duration::from_secs)
        .or(state.pending_ttl)
        .ok_or_else(|| MarketError::validation("No pending TTL configured; pass olderThanSecs"))?;

    let agent_subscriptions = state.agent_subscriptions.expire_abandoned(ttl).await?;
    let team_subscriptions = state.team_subscriptions.expire_abandoned(ttl).await?;

    tracing::info!(
        admin = %admin.user_id,
        agents = agent_subscriptions.len(),
        teams = team_subscriptions.len(),
        "Manual pending sweep"
    );

    Ok(Json(SweepResponse {
        agent_subscriptions,
        team_subscriptions,
    }))
}

// ============================================================================
// Webhooks
// ============================================================================

/// Stripe webhook handler
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<Acknowledged>> {
    let handler = state.webhooks.as_ref().ok_or(ApiError::WebhooksDisabled)?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::MissingSignature)?;

    let event = handler.handle(&body, signature).await.map_err(|e| {
        tracing::warn!(error = %e, "Webhook rejected");
        ApiError::Webhook(e)
    })?;

    tracing::debug!(?event, "Webhook processed");
    Ok(Json(Acknowledged { received: true }))
}
