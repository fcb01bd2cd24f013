use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use rankpilot_core::CoreError;
use rankpilot_order::SettlementRecord;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use crate::{actor_of, ActorRequest};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/settlements/{id}", get(get_settlement))
        .route("/v1/settlements/{id}/confirm", post(confirm))
        .route("/v1/settlements/{id}/pay", post(pay))
}

/// GET /v1/settlements/:id
async fn get_settlement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SettlementRecord>, AppError> {
    let mut tx = state.ledger.begin().await?;
    let record = tx
        .settlement_record(id)
        .await?
        .ok_or_else(|| CoreError::not_found("settlement record", id))?;
    Ok(Json(record))
}

/// POST /v1/settlements/:id/confirm
async fn confirm(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ActorRequest>>,
) -> Result<Json<SettlementRecord>, AppError> {
    let record = state.settlements().confirm(id, &actor_of(&body)).await?;
    Ok(Json(record))
}

/// POST /v1/settlements/:id/pay
async fn pay(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ActorRequest>>,
) -> Result<Json<SettlementRecord>, AppError> {
    let record = state.settlements().mark_paid(id, &actor_of(&body)).await?;
    Ok(Json(record))
}
