use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use rankpilot_channel::Channel;
use rankpilot_core::CoreError;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    pub base_price: i64,
    pub monthly_capacity: i64,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/channels", post(create_channel))
        .route("/v1/channels", get(list_channels))
        .route("/v1/channels/{id}", get(get_channel))
}

/// POST /v1/channels
async fn create_channel(
    State(state): State<AppState>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<Json<Channel>, AppError> {
    if req.base_price < 0 {
        return Err(CoreError::Validation("base_price must not be negative".into()).into());
    }
    if req.monthly_capacity <= 0 {
        return Err(CoreError::Validation("monthly_capacity must be positive".into()).into());
    }
    let channel = Channel::new(req.name, req.base_price, req.monthly_capacity);
    let mut tx = state.ledger.begin().await?;
    tx.insert_channel(&channel).await?;
    tx.commit().await?;
    Ok(Json(channel))
}

/// GET /v1/channels
async fn list_channels(
    State(state): State<AppState>,
) -> Result<Json<Vec<Channel>>, AppError> {
    let mut tx = state.ledger.begin().await?;
    let channels = tx.active_channels().await?;
    Ok(Json(channels))
}

/// GET /v1/channels/:id
async fn get_channel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Channel>, AppError> {
    let mut tx = state.ledger.begin().await?;
    let channel = tx
        .channel(id)
        .await?
        .ok_or_else(|| CoreError::not_found("channel", id))?;
    Ok(Json(channel))
}
