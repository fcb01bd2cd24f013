use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use rankpilot_core::CoreError;
use rankpilot_order::{FulfillmentStatement, StatementLineInput};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use crate::{actor_of, ActorRequest};

#[derive(Debug, Deserialize)]
pub struct CreateStatementRequest {
    pub supplier_order_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub lines: Vec<StatementLineInput>,
    pub actor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatementRequest {
    pub lines: Vec<StatementLineInput>,
    pub actor: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConfirmStatementResponse {
    pub statement: FulfillmentStatement,
    pub settlement_lines_created: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/statements", post(create_statement))
        .route("/v1/statements/{id}", get(get_statement))
        .route("/v1/statements/{id}", put(update_statement))
        .route("/v1/statements/{id}", delete(delete_statement))
        .route("/v1/statements/{id}/confirm", post(confirm))
        .route("/v1/statements/{id}/lock", post(lock))
}

/// POST /v1/statements
async fn create_statement(
    State(state): State<AppState>,
    Json(req): Json<CreateStatementRequest>,
) -> Result<Json<FulfillmentStatement>, AppError> {
    let actor = req.actor.as_deref().unwrap_or("api");
    let statement = state
        .statements()
        .create_statement(
            req.supplier_order_id,
            req.period_start,
            req.period_end,
            req.lines,
            actor,
        )
        .await?;
    Ok(Json(statement))
}

/// GET /v1/statements/:id
async fn get_statement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<FulfillmentStatement>, AppError> {
    let mut tx = state.ledger.begin().await?;
    let statement = tx
        .statement(id)
        .await?
        .ok_or_else(|| CoreError::not_found("statement", id))?;
    Ok(Json(statement))
}

/// PUT /v1/statements/:id
async fn update_statement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatementRequest>,
) -> Result<Json<FulfillmentStatement>, AppError> {
    let actor = req.actor.as_deref().unwrap_or("api");
    let statement = state
        .statements()
        .update_statement(id, req.lines, actor)
        .await?;
    Ok(Json(statement))
}

/// DELETE /v1/statements/:id
async fn delete_statement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ActorRequest>>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .statements()
        .delete_statement(id, &actor_of(&body))
        .await?;
    Ok(Json(serde_json::json!({ "deleted": id })))
}

/// POST /v1/statements/:id/confirm
async fn confirm(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ActorRequest>>,
) -> Result<Json<ConfirmStatementResponse>, AppError> {
    let (statement, settlement_lines_created) = state
        .statements()
        .confirm_statement(id, &actor_of(&body))
        .await?;
    Ok(Json(ConfirmStatementResponse {
        statement,
        settlement_lines_created,
    }))
}

/// POST /v1/statements/:id/lock
async fn lock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ActorRequest>>,
) -> Result<Json<FulfillmentStatement>, AppError> {
    let statement = state.statements().lock_statement(id, &actor_of(&body)).await?;
    Ok(Json(statement))
}
