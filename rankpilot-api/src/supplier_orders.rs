use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use rankpilot_core::CoreError;
use rankpilot_order::SupplierOrder;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use crate::{actor_of, ActorRequest};

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
    pub actor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CompleteSupplierOrderResponse {
    pub order: SupplierOrder,
    pub settlements_created: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/supplier-orders/{id}", get(get_supplier_order))
        .route("/v1/supplier-orders/{id}/submit", post(submit))
        .route("/v1/supplier-orders/{id}/confirm", post(confirm))
        .route("/v1/supplier-orders/{id}/start", post(start))
        .route("/v1/supplier-orders/{id}/cancel", post(cancel))
        .route("/v1/supplier-orders/{id}/complete", post(complete))
}

/// GET /v1/supplier-orders/:id
async fn get_supplier_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SupplierOrder>, AppError> {
    let mut tx = state.ledger.begin().await?;
    let order = tx
        .supplier_order(id)
        .await?
        .ok_or_else(|| CoreError::not_found("supplier order", id))?;
    Ok(Json(order))
}

/// POST /v1/supplier-orders/:id/submit
async fn submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ActorRequest>>,
) -> Result<Json<SupplierOrder>, AppError> {
    let order = state
        .lifecycle()
        .submit_supplier_order(id, &actor_of(&body))
        .await?;
    Ok(Json(order))
}

/// POST /v1/supplier-orders/:id/confirm
async fn confirm(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ActorRequest>>,
) -> Result<Json<SupplierOrder>, AppError> {
    let order = state
        .lifecycle()
        .confirm_supplier_order(id, &actor_of(&body))
        .await?;
    Ok(Json(order))
}

/// POST /v1/supplier-orders/:id/start
async fn start(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ActorRequest>>,
) -> Result<Json<SupplierOrder>, AppError> {
    let order = state
        .lifecycle()
        .start_supplier_order(id, &actor_of(&body))
        .await?;
    Ok(Json(order))
}

/// POST /v1/supplier-orders/:id/cancel
async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<SupplierOrder>, AppError> {
    let (reason, actor) = match body {
        Some(Json(req)) => (req.reason, req.actor.unwrap_or_else(|| "api".to_string())),
        None => (None, "api".to_string()),
    };
    let order = state
        .lifecycle()
        .cancel_supplier_order(id, reason, &actor)
        .await?;
    Ok(Json(order))
}

/// POST /v1/supplier-orders/:id/complete
///
/// Completion settles gross amounts per store in the same transaction, so
/// the response reports how many settlement records the call created.
async fn complete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ActorRequest>>,
) -> Result<Json<CompleteSupplierOrderResponse>, AppError> {
    let (order, settlements_created) = state
        .lifecycle()
        .complete_supplier_order(id, &actor_of(&body))
        .await?;
    Ok(Json(CompleteSupplierOrderResponse {
        order,
        settlements_created,
    }))
}
