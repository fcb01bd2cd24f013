use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use rankpilot_billing::{calculate_line, BatchSummary, BillingResult};
use rankpilot_core::CoreError;
use rankpilot_shared::SettlementMonth;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    /// Target month as `YYYY-MM`; previous calendar month when absent.
    pub month: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/billing/lines/{id}", get(line_billing))
        .route("/v1/billing/batch", post(run_batch))
}

/// GET /v1/billing/lines/:id
///
/// Prices one ranking-guarantee line against the measurement feed without
/// persisting anything.
async fn line_billing(
    State(state): State<AppState>,
    Path(line_id): Path<Uuid>,
) -> Result<Json<BillingResult>, AppError> {
    let mut tx = state.ledger.begin().await?;
    let (_, line) = tx
        .supplier_line(line_id)
        .await?
        .ok_or_else(|| CoreError::not_found("supplier order line", line_id))?;
    drop(tx);

    let samples = state
        .feed
        .daily_ranks(line.store_id, &line.keyword, line.start_date, line.end_date)
        .await?;
    let result = calculate_line(&line, &samples)?;
    Ok(Json(result))
}

/// POST /v1/billing/batch
async fn run_batch(
    State(state): State<AppState>,
    body: Option<Json<BatchRequest>>,
) -> Result<Json<BatchSummary>, AppError> {
    let month = match body.as_ref().and_then(|Json(req)| req.month.as_deref()) {
        Some(raw) => Some(SettlementMonth::parse(raw).ok_or_else(|| {
            CoreError::Validation(format!("invalid settlement month: {}", raw))
        })?),
        None => None,
    };
    let summary = state.billing().run(month).await?;
    Ok(Json(summary))
}
