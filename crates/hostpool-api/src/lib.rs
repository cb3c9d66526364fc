//! hostpool-api: REST API for hostpool.
//!
//! Provides axum route handlers for the server registry, the rule store and
//! the assignment engine, plus a Prometheus endpoint.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/servers` | List servers (`?tier=`) |
//! | POST | `/api/v1/servers` | Register a server |
//! | GET | `/api/v1/servers/{id}` | Get server details |
//! | DELETE | `/api/v1/servers/{id}` | Decommission an empty server |
//! | POST | `/api/v1/servers/{id}/drain` | Move teams off a server |
//! | PUT | `/api/v1/servers/{id}/status` | Change server status |
//! | POST | `/api/v1/servers/{id}/utilization` | Utilization feed |
//! | GET | `/api/v1/rules/{tier}` | Active rule of a tier |
//! | PUT | `/api/v1/rules/{tier}` | Store a new rule version |
//! | GET | `/api/v1/rules/{tier}/versions` | Rule history |
//! | POST | `/api/v1/provision` | Assign a team to a server |
//! | GET | `/api/v1/assignments` | List assignments (`?team=&active=`) |
//! | POST | `/api/v1/assignments/{id}/release` | Release an assignment |
//! | DELETE | `/api/v1/teams/{team}` | Release all of a team's assignments |
//! | GET | `/api/v1/tiers/{tier}/stats` | Pool statistics |
//! | GET | `/api/v1/tiers/{tier}/preview` | Next assignment without committing |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;
pub mod metrics;

use axum::Router;
use axum::routing::{delete, get, post, put};
use hostpool_assign::AssignmentEngine;
use hostpool_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub engine: AssignmentEngine,
}

impl ApiState {
    pub fn new(engine: AssignmentEngine) -> Self {
        Self {
            store: engine.store().clone(),
            engine,
        }
    }
}

/// Build the complete API router (REST + metrics).
pub fn build_router(engine: AssignmentEngine) -> Router {
    let api_state = ApiState::new(engine);

    let api_routes = Router::new()
        .route("/servers", get(handlers::list_servers).post(handlers::create_server))
        .route("/servers/{id}", get(handlers::get_server).delete(handlers::decommission_server))
        .route("/servers/{id}/drain", post(handlers::drain_server))
        .route("/servers/{id}/status", put(handlers::set_server_status))
        .route("/servers/{id}/utilization", post(handlers::report_utilization))
        .route("/rules/{tier}", get(handlers::get_rule).put(handlers::put_rule))
        .route("/rules/{tier}/versions", get(handlers::list_rule_versions))
        .route("/provision", post(handlers::provision))
        .route("/assignments", get(handlers::list_assignments))
        .route("/assignments/{id}/release", post(handlers::release_assignment))
        .route("/teams/{team}", delete(handlers::offboard_team))
        .route("/tiers/{tier}/stats", get(handlers::tier_stats))
        .route("/tiers/{tier}/preview", get(handlers::tier_preview))
        .with_state(api_state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(api_state))
}
