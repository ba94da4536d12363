//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.

use super::{
    AppState,
    types::{
        CloseRequest, CloseResponse, ExtendResponse, HealthResponse, InstanceResponse,
        OpenRequest, OpenResponse, PoliciesResponse, PolicyJson, PolicyRequest, PolicyResponse,
        StatusResponse,
    },
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use paceline_core::{InstanceId, OwnerRole, PacelineError, StageName};
use serde::Deserialize;

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// Map a core error to its HTTP status.
///
/// Missing resources are 404, rejected field values are 422, rule
/// violations and lost write races are 409, persistence failures are 500.
fn error_status(err: &PacelineError) -> StatusCode {
    match err {
        PacelineError::PolicyNotFound(_) | PacelineError::InstanceNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        PacelineError::InvalidPolicy { .. }
        | PacelineError::InvalidOwnerRole { .. }
        | PacelineError::InvalidCloseStatus { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PacelineError::PolicyInactive(_)
        | PacelineError::ExtensionsDisabled
        | PacelineError::ExtensionLimitReached { .. }
        | PacelineError::StageAlreadyClosed
        | PacelineError::WriteConflict { .. } => StatusCode::CONFLICT,
        PacelineError::SerializationError(_) | PacelineError::IoError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// STATUS HANDLER
// =============================================================================

/// Get engine metrics overview.
pub async fn status_handler(State(state): State<AppState>) -> Response {
    let engine = state.engine.read().await;

    match engine.metrics(Utc::now()) {
        Ok(metrics) => {
            let response = StatusResponse {
                policies: metrics.policies,
                instances: metrics.instances,
                open: metrics.open,
                on_time: metrics.on_time,
                overdue: metrics.overdue,
                expired: metrics.expired,
                closed: metrics.closed,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => (
            error_status(&e),
            Json(serde_json::json!({ "success": false, "error": e.to_string() })),
        )
            .into_response(),
    }
}

// =============================================================================
// POLICY HANDLERS
// =============================================================================

/// List all policies.
pub async fn policies_handler(State(state): State<AppState>) -> Response {
    let engine = state.engine.read().await;

    match engine.policies() {
        Ok(policies) => {
            let response = PoliciesResponse {
                policies: policies.iter().map(PolicyJson::from).collect(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => (
            error_status(&e),
            Json(serde_json::json!({ "success": false, "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// Show the policy for one stage.
pub async fn policy_show_handler(
    State(state): State<AppState>,
    Path(stage): Path<String>,
) -> Response {
    let engine = state.engine.read().await;

    match engine.policy(&StageName::new(&stage)) {
        Ok(policy) => (StatusCode::OK, Json(PolicyResponse::success(&policy))).into_response(),
        Err(e) => (
            error_status(&e),
            Json(PolicyResponse::error(e.to_string())),
        )
            .into_response(),
    }
}

/// Create or replace a policy.
pub async fn policy_put_handler(
    State(state): State<AppState>,
    Json(request): Json<PolicyRequest>,
) -> Response {
    let policy = match request.into_policy() {
        Ok(p) => p,
        Err(e) => {
            return (
                error_status(&e),
                Json(PolicyResponse::error(e.to_string())),
            )
                .into_response();
        }
    };

    let mut engine = state.engine.write().await;
    match engine.upsert_policy(policy.clone()) {
        Ok(()) => (StatusCode::OK, Json(PolicyResponse::success(&policy))).into_response(),
        Err(e) => (
            error_status(&e),
            Json(PolicyResponse::error(e.to_string())),
        )
            .into_response(),
    }
}

// =============================================================================
// INSTANCE HANDLERS
// =============================================================================

/// Open a stage instance.
pub async fn instance_open_handler(
    State(state): State<AppState>,
    Json(request): Json<OpenRequest>,
) -> Response {
    let owner: OwnerRole = match request.owner.parse() {
        Ok(o) => o,
        Err(e) => {
            return (error_status(&e), Json(OpenResponse::error(e.to_string()))).into_response();
        }
    };
    let started_at = request.started_at.unwrap_or_else(Utc::now);

    let mut engine = state.engine.write().await;
    match engine.open_stage(&StageName::new(&request.stage), owner, started_at) {
        Ok(id) => (StatusCode::OK, Json(OpenResponse::success(id))).into_response(),
        Err(e) => (error_status(&e), Json(OpenResponse::error(e.to_string()))).into_response(),
    }
}

/// Query string for instance evaluation.
#[derive(Debug, Deserialize)]
pub struct InspectQuery {
    /// Evaluation instant (RFC3339); the server clock is used when absent.
    pub at: Option<String>,
}

/// Evaluate one instance at an instant.
pub async fn instance_show_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(query): Query<InspectQuery>,
) -> Response {
    let now = match query.at.as_deref() {
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(e) => {
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(serde_json::json!({
                        "success": false,
                        "error": format!("Invalid RFC3339 timestamp '{}': {}", raw, e),
                    })),
                )
                    .into_response();
            }
        },
        None => Utc::now(),
    };

    let engine = state.engine.read().await;
    match engine.inspect(InstanceId(id), now) {
        Ok(report) => (StatusCode::OK, Json(InstanceResponse::from(&report))).into_response(),
        Err(e) => (
            error_status(&e),
            Json(serde_json::json!({ "success": false, "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// Grant one extension to an instance.
pub async fn instance_extend_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Response {
    let mut engine = state.engine.write().await;

    match engine.grant_extension(InstanceId(id)) {
        Ok(record) => (
            StatusCode::OK,
            Json(ExtendResponse::success(
                record.instance.extensions_granted,
                record.version.value(),
            )),
        )
            .into_response(),
        Err(e) => (
            error_status(&e),
            Json(ExtendResponse::error(e.to_string())),
        )
            .into_response(),
    }
}

/// Close an instance.
pub async fn instance_close_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<CloseRequest>,
) -> Response {
    let status = match request.status.parse() {
        Ok(s) => s,
        Err(e) => {
            return (error_status(&e), Json(CloseResponse::error(e.to_string()))).into_response();
        }
    };
    let at = request.closed_at.unwrap_or_else(Utc::now);

    let mut engine = state.engine.write().await;
    match engine.close(InstanceId(id), status, at) {
        Ok(record) => (
            StatusCode::OK,
            Json(CloseResponse::success(
                status.as_str(),
                record.version.value(),
            )),
        )
            .into_response(),
        Err(e) => (error_status(&e), Json(CloseResponse::error(e.to_string()))).into_response(),
    }
}

// =============================================================================
// METRICS HANDLER
// =============================================================================

/// Prometheus text exposition of the engine counters.
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    let engine = state.engine.read().await;

    let metrics = match engine.metrics(Utc::now()) {
        Ok(m) => m,
        Err(e) => {
            return (
                error_status(&e),
                Json(serde_json::json!({ "success": false, "error": e.to_string() })),
            )
                .into_response();
        }
    };

    let mut body = String::new();
    body.push_str("# HELP paceline_policy_count Number of configured SLA policies\n");
    body.push_str("# TYPE paceline_policy_count gauge\n");
    body.push_str(&format!("paceline_policy_count {}\n", metrics.policies));
    body.push_str("# HELP paceline_instance_count Number of stored stage instances\n");
    body.push_str("# TYPE paceline_instance_count gauge\n");
    body.push_str(&format!("paceline_instance_count {}\n", metrics.instances));
    body.push_str("# HELP paceline_instances_open Open stage instances\n");
    body.push_str("# TYPE paceline_instances_open gauge\n");
    body.push_str(&format!("paceline_instances_open {}\n", metrics.open));
    body.push_str("# HELP paceline_instances_by_status Open instances by deadline status\n");
    body.push_str("# TYPE paceline_instances_by_status gauge\n");
    body.push_str(&format!(
        "paceline_instances_by_status{{status=\"on_time\"}} {}\n",
        metrics.on_time
    ));
    body.push_str(&format!(
        "paceline_instances_by_status{{status=\"overdue\"}} {}\n",
        metrics.overdue
    ));
    body.push_str(&format!(
        "paceline_instances_by_status{{status=\"expired\"}} {}\n",
        metrics.expired
    ));
    body.push_str("# HELP paceline_instances_closed Closed stage instances\n");
    body.push_str("# TYPE paceline_instances_closed gauge\n");
    body.push_str(&format!("paceline_instances_closed {}\n", metrics.closed));

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}
