//! Operator HTTP API: health, Prometheus metrics, metric ingestion,
//! executions, overrides and right-sizing

use agent_lib::{
    advisor::{AdvisorScheduler, FunctionUsage},
    collector::{ingest, MetricWindow},
    health::{components, ComponentStatus, HealthRegistry},
    observability::AgentMetrics,
    workflow::{BreachKey, ExecutionHistory},
    MetricSample,
};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: AgentMetrics,
    pub window: MetricWindow,
    pub history: Arc<ExecutionHistory>,
    pub advisor: Arc<AdvisorScheduler>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: AgentMetrics,
        window: MetricWindow,
        history: Arc<ExecutionHistory>,
        advisor: Arc<AdvisorScheduler>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            window,
            history,
            advisor,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Result of a metric ingestion batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRequest {
    pub signal_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbortResponse {
    pub signal_id: Uuid,
    pub cancelled_executions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveResponse {
    pub signal_id: Uuid,
    /// Breach whose next execution is approved, when the signal is known
    pub breach: Option<BreachKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub execution_id: Uuid,
    pub cancelled: bool,
}

/// 200 while operational (degraded included), 503 once a component fails
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Accept a batch from the cost feed; malformed samples are dropped, not fatal
async fn ingest_metrics(
    State(state): State<Arc<AppState>>,
    Json(samples): Json<Vec<MetricSample>>,
) -> Json<IngestResponse> {
    let outcome = ingest(samples);
    let response = IngestResponse {
        accepted: outcome.accepted.len(),
        rejected: outcome.rejected.len(),
    };

    state.window.extend(outcome.accepted).await;
    state
        .metrics
        .record_ingest(response.accepted, response.rejected);

    if response.accepted == 0 && response.rejected > 0 {
        state
            .health_registry
            .set_degraded(components::METRIC_SOURCE, "every sample in the last batch was rejected")
            .await;
    } else {
        state
            .health_registry
            .set_healthy(components::METRIC_SOURCE)
            .await;
    }

    Json(response)
}

async fn list_executions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.history.list())
}

async fn get_execution(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    match state.history.get(id) {
        Some(execution) => Json(execution).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("execution {} not found", id)),
    }
}

/// Plain-text report; 409 while the execution is still running
async fn execution_report(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    let Some(execution) = state.history.get(id) else {
        return error_response(StatusCode::NOT_FOUND, format!("execution {} not found", id));
    };

    match execution.report {
        Some(report) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            report.render(),
        )
            .into_response(),
        None => error_response(
            StatusCode::CONFLICT,
            format!("execution {} is still {}", id, execution.state),
        ),
    }
}

async fn cancel_execution(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    if state.history.cancel(id) {
        info!(execution_id = %id, "Cancellation requested by operator");
        (
            StatusCode::ACCEPTED,
            Json(CancelResponse {
                execution_id: id,
                cancelled: true,
            }),
        )
            .into_response()
    } else {
        error_response(
            StatusCode::NOT_FOUND,
            format!("no running execution {}", id),
        )
    }
}

async fn abort_signal(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignalRequest>,
) -> Json<AbortResponse> {
    let cancelled = state.history.abort_signal(request.signal_id);
    warn!(
        signal_id = %request.signal_id,
        cancelled_executions = cancelled,
        "Emergency aborted by operator override"
    );

    Json(AbortResponse {
        signal_id: request.signal_id,
        cancelled_executions: cancelled,
    })
}

async fn approve_signal(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignalRequest>,
) -> Json<ApproveResponse> {
    let breach = state.history.approve_signal(request.signal_id);
    match &breach {
        Some(b) => info!(
            signal_id = %request.signal_id,
            kind = %b.kind,
            resource_id = %b.resource_id,
            "Irreversible actions approved by operator"
        ),
        None => warn!(
            signal_id = %request.signal_id,
            "Approved signal has no recorded execution; approval applies to that signal id only"
        ),
    }

    Json(ApproveResponse {
        signal_id: request.signal_id,
        breach,
    })
}

async fn list_overrides(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.history.overrides())
}

async fn list_recommendations(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.advisor.all_latest().await)
}

async fn record_usage(
    State(state): State<Arc<AppState>>,
    Json(usage): Json<FunctionUsage>,
) -> Response {
    if let Err(message) = validate_usage(&usage) {
        return error_response(StatusCode::BAD_REQUEST, message);
    }

    state.advisor.record_usage(usage).await;
    StatusCode::ACCEPTED.into_response()
}

fn validate_usage(usage: &FunctionUsage) -> Result<(), String> {
    if usage.resource_id.is_empty() {
        return Err("resource_id is required".to_string());
    }
    if usage.current_memory_mb == 0 {
        return Err("current_memory_mb must be positive".to_string());
    }
    let finite_non_negative = [
        ("avg_duration_ms", usage.avg_duration_ms),
        ("memory_utilization_pct", usage.memory_utilization_pct),
        ("invocations_per_month", usage.invocations_per_month),
    ];
    for (field, value) in finite_non_negative {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{} must be a non-negative number", field));
        }
    }
    Ok(())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/metrics", post(ingest_metrics))
        .route("/api/v1/executions", get(list_executions))
        .route("/api/v1/executions/:id", get(get_execution))
        .route("/api/v1/executions/:id/report", get(execution_report))
        .route("/api/v1/executions/:id/cancel", post(cancel_execution))
        .route("/api/v1/overrides", get(list_overrides))
        .route("/api/v1/overrides/abort", post(abort_signal))
        .route("/api/v1/overrides/approve", post(approve_signal))
        .route("/api/v1/recommendations", get(list_recommendations))
        .route("/api/v1/usage", post(record_usage))
        .with_state(state)
}

/// Serve the API until shutdown is broadcast
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
