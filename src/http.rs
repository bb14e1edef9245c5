//! HTTP surface of the evaluation service.
//!
//! Thin JSON layer over [`ServerEngine`]: one route serves liveness, one
//! describes the model's input shape, one runs a blind evaluation.
//! Evaluation is CPU-bound and runs on the blocking pool.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;

use crate::error::Error;
use crate::ledger::IntegrityLedger;
use crate::protocol::{EvaluationReceipt, RequestBundle, ServerEngine};
use crate::vault::Envelope;

struct AppState<L: IntegrityLedger> {
    engine: ServerEngine<L>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ModelResponse {
    feature_count: usize,
}

#[derive(Serialize)]
struct EvaluateResponse {
    result: Envelope,
    receipt: EvaluationReceipt,
    processing_time_ms: u64,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn get_model<L: IntegrityLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
) -> Json<ModelResponse> {
    Json(ModelResponse {
        feature_count: state.engine.model().feature_count(),
    })
}

async fn handle_evaluate<L: IntegrityLedger + 'static>(
    State(state): State<Arc<AppState<L>>>,
    Json(bundle): Json<RequestBundle>,
) -> Result<Json<EvaluateResponse>, (StatusCode, Json<ErrorResponse>)> {
    let start = Instant::now();

    let worker = Arc::clone(&state);
    let processed = tokio::task::spawn_blocking(move || worker.engine.process(&bundle))
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("evaluation task failed: {e}"),
                }),
            )
        })?;
    let (result, receipt) = processed.map_err(error_response)?;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    info!("evaluation served in {processing_time_ms}ms");

    Ok(Json(EvaluateResponse {
        result,
        receipt,
        processing_time_ms,
    }))
}

fn error_response(e: Error) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &e {
        Error::Authentication
        | Error::MalformedInput(_)
        | Error::ContextMismatch(_)
        | Error::WrongContext(_)
        | Error::CapacityExceeded { .. } => StatusCode::BAD_REQUEST,
        Error::NoiseBudgetExhausted { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Ledger(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

/// Build the service router around a ready evaluation engine.
pub fn router<L: IntegrityLedger + 'static>(engine: ServerEngine<L>) -> Router {
    let state = Arc::new(AppState { engine });
    Router::new()
        .route("/health", get(health_check))
        .route("/model", get(get_model::<L>))
        .route("/evaluate", post(handle_evaluate::<L>))
        .with_state(state)
}
