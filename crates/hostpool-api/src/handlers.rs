//! REST API handlers.
//!
//! Reads go straight to the `StateStore`; anything that moves a team count
//! goes through the `AssignmentEngine`.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::warn;

use hostpool_assign::{AssignError, PoolStats, ProvisionOutcome};
use hostpool_state::*;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> axum::response::Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn state_error(e: &StateError) -> axum::response::Response {
    let status = match e {
        StateError::NotFound(_) => StatusCode::NOT_FOUND,
        StateError::Invalid(_) => StatusCode::BAD_REQUEST,
        StateError::CapacityExceeded { .. } | StateError::AlreadyExists(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status)
}

fn assign_error(e: &AssignError) -> axum::response::Response {
    let status = match e {
        AssignError::ServerNotFound(_) | AssignError::AssignmentNotFound(_) => StatusCode::NOT_FOUND,
        AssignError::CapacityExceeded(_)
        | AssignError::ConcurrentModification(_)
        | AssignError::AlreadyReleased(_)
        | AssignError::ServerNotDrained { .. }
        | AssignError::InvalidTransition(_) => StatusCode::CONFLICT,
        AssignError::InvalidRuleConfiguration { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        AssignError::RuleDisabled(_) => StatusCode::FORBIDDEN,
        AssignError::RequestTimedOut(_) => StatusCode::GATEWAY_TIMEOUT,
        AssignError::State(inner) => return state_error(inner),
        AssignError::Runtime(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(&e.to_string(), status)
}

// ── Servers ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ServerQuery {
    pub tier: Option<Tier>,
}

/// GET /api/v1/servers
pub async fn list_servers(
    State(state): State<ApiState>,
    Query(query): Query<ServerQuery>,
) -> impl IntoResponse {
    let servers = match query.tier {
        Some(tier) => state.store.list_servers(tier),
        None => state.store.list_all_servers(),
    };
    match servers {
        Ok(servers) => ApiResponse::ok(servers).into_response(),
        Err(e) => state_error(&e),
    }
}

/// GET /api/v1/servers/:id
pub async fn get_server(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_server(&id) {
        Ok(Some(server)) => ApiResponse::ok(server).into_response(),
        Ok(None) => error_response("server not found", StatusCode::NOT_FOUND),
        Err(e) => state_error(&e),
    }
}

/// Registration body for a new server.
#[derive(Debug, Clone, Deserialize)]
pub struct NewServer {
    pub id: ServerId,
    pub tier: Tier,
    pub provider: String,
    pub region: String,
    pub specs: ServerSpecs,
    pub max_team_count: u32,
    pub hourly_cost: f64,
    #[serde(default = "default_status")]
    pub status: ServerStatus,
}

fn default_status() -> ServerStatus {
    ServerStatus::Active
}

/// POST /api/v1/servers
pub async fn create_server(
    State(state): State<ApiState>,
    Json(req): Json<NewServer>,
) -> impl IntoResponse {
    if req.id.is_empty() {
        return error_response("server id must not be empty", StatusCode::BAD_REQUEST);
    }
    if req.status == ServerStatus::Retired {
        return error_response("cannot register a retired server", StatusCode::BAD_REQUEST);
    }
    let now = epoch_secs();
    let server = Server {
        id: req.id,
        tier: req.tier,
        provider: req.provider,
        region: req.region,
        specs: req.specs,
        status: req.status,
        utilization: Utilization::default(),
        sampled_at: 0,
        assigned_team_count: 0,
        max_team_count: req.max_team_count,
        hourly_cost: req.hourly_cost,
        revision: 0,
        created_at: now,
        updated_at: now,
    };
    match state.store.insert_server(&server) {
        Ok(()) => (StatusCode::CREATED, ApiResponse::ok(server)).into_response(),
        Err(e) => state_error(&e),
    }
}

/// DELETE /api/v1/servers/:id
pub async fn decommission_server(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine.decommission(&id) {
        Ok(server) => ApiResponse::ok(server).into_response(),
        Err(e) => assign_error(&e),
    }
}

/// POST /api/v1/servers/:id/drain
pub async fn drain_server(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine.drain_server(&id) {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => assign_error(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: ServerStatus,
}

/// PUT /api/v1/servers/:id/status
pub async fn set_server_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> impl IntoResponse {
    match state.engine.set_server_status(&id, req.status) {
        Ok(server) => ApiResponse::ok(server).into_response(),
        Err(e) => assign_error(&e),
    }
}

/// POST /api/v1/servers/:id/utilization
pub async fn report_utilization(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(sample): Json<UtilizationSample>,
) -> impl IntoResponse {
    match state.store.refresh_utilization(&id, &sample) {
        Ok(applied) => ApiResponse::ok(serde_json::json!({
            "server": id,
            "applied": applied,
        }))
        .into_response(),
        Err(e) => state_error(&e),
    }
}

// ── Rules ──────────────────────────────────────────────────────

/// GET /api/v1/rules/:tier
///
/// A tier that was never configured reports the default rule at version 0.
pub async fn get_rule(
    State(state): State<ApiState>,
    Path(tier): Path<Tier>,
) -> impl IntoResponse {
    match state.store.get_active_rule(tier) {
        Ok(rule) => ApiResponse::ok(rule.unwrap_or_else(|| AssignmentRule::default_for(tier)))
            .into_response(),
        Err(e) => state_error(&e),
    }
}

/// PUT /api/v1/rules/:tier
pub async fn put_rule(
    State(state): State<ApiState>,
    Path(tier): Path<Tier>,
    Json(rule): Json<AssignmentRule>,
) -> impl IntoResponse {
    if rule.tier != tier {
        return error_response(
            &format!("rule is for tier {} but was sent to {tier}", rule.tier),
            StatusCode::BAD_REQUEST,
        );
    }
    match state.engine.update_rule(&rule) {
        Ok(stored) => ApiResponse::ok(stored).into_response(),
        Err(e) => assign_error(&e),
    }
}

/// GET /api/v1/rules/:tier/versions
pub async fn list_rule_versions(
    State(state): State<ApiState>,
    Path(tier): Path<Tier>,
) -> impl IntoResponse {
    match state.store.list_rule_versions(tier) {
        Ok(versions) => ApiResponse::ok(versions).into_response(),
        Err(e) => state_error(&e),
    }
}

// ── Assignments ────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionRequest {
    pub team_id: TeamId,
    pub tier: Tier,
    pub resource: ResourceSpec,
}

/// POST /api/v1/provision
pub async fn provision(
    State(state): State<ApiState>,
    Json(req): Json<ProvisionRequest>,
) -> impl IntoResponse {
    if req.team_id.is_empty() {
        return error_response("team_id must not be empty", StatusCode::BAD_REQUEST);
    }
    let timeout = state.engine.request_timeout();
    match state
        .engine
        .provision_within(&req.team_id, req.tier, &req.resource, timeout)
        .await
    {
        Ok(outcome @ ProvisionOutcome::Provisioned(_)) => {
            (StatusCode::CREATED, ApiResponse::ok(outcome)).into_response()
        }
        Ok(outcome) => ApiResponse::ok(outcome).into_response(),
        Err(e) => {
            warn!(team = %req.team_id, tier = %req.tier, error = %e, "provision request failed");
            assign_error(&e)
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignmentQuery {
    pub team: Option<String>,
    pub server: Option<String>,
    #[serde(default)]
    pub active: bool,
}

/// GET /api/v1/assignments
pub async fn list_assignments(
    State(state): State<ApiState>,
    Query(query): Query<AssignmentQuery>,
) -> impl IntoResponse {
    match state.store.list_assignments() {
        Ok(all) => {
            let filtered: Vec<Assignment> = all
                .into_iter()
                .filter(|a| query.team.as_ref().is_none_or(|t| &a.team_id == t))
                .filter(|a| query.server.as_ref().is_none_or(|s| &a.server_id == s))
                .filter(|a| !query.active || a.is_active())
                .collect();
            ApiResponse::ok(filtered).into_response()
        }
        Err(e) => state_error(&e),
    }
}

/// POST /api/v1/assignments/:id/release
pub async fn release_assignment(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine.release(&id) {
        Ok(assignment) => ApiResponse::ok(assignment).into_response(),
        Err(e) => assign_error(&e),
    }
}

/// DELETE /api/v1/teams/:team
pub async fn offboard_team(
    State(state): State<ApiState>,
    Path(team): Path<String>,
) -> impl IntoResponse {
    match state.engine.offboard_team(&team) {
        Ok(released) => ApiResponse::ok(released).into_response(),
        Err(e) => assign_error(&e),
    }
}

// ── Tiers ──────────────────────────────────────────────────────

/// GET /api/v1/tiers/:tier/stats
pub async fn tier_stats(
    State(state): State<ApiState>,
    Path(tier): Path<Tier>,
) -> impl IntoResponse {
    match state.engine.stats(tier) {
        Ok(stats) => ApiResponse::ok(stats).into_response(),
        Err(e) => assign_error(&e),
    }
}

/// GET /api/v1/tiers/:tier/preview
pub async fn tier_preview(
    State(state): State<ApiState>,
    Path(tier): Path<Tier>,
) -> impl IntoResponse {
    match state.engine.preview(tier) {
        Ok(preview) => ApiResponse::ok(preview).into_response(),
        Err(e) => assign_error(&e),
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let stats: Vec<PoolStats> = Tier::ALL
        .iter()
        .filter_map(|&tier| state.engine.stats(tier).ok())
        .collect();

    let body = crate::metrics::render_prometheus(&stats);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
