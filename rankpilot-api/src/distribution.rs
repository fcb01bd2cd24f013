use axum::{extract::State, routing::post, Json, Router};
use chrono::NaiveDate;
use rankpilot_channel::ChannelCapacity;
use rankpilot_core::CoreError;
use rankpilot_distribution::{distribute, DistributionItem, DistributionPlan, Strategy};
use rankpilot_shared::SettlementMonth;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PlanRequest {
    pub items: Vec<DistributionItemRequest>,
    pub strategy: Strategy,
}

#[derive(Debug, Deserialize)]
pub struct DistributionItemRequest {
    pub store_id: Uuid,
    pub keyword: String,
    pub daily_qty: i64,
    pub work_days: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct MaterializeRequest {
    pub plan: DistributionPlan,
    pub created_by: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MaterializeResponse {
    pub supplier_order_ids: Vec<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/distribution/plan", post(plan))
        .route("/v1/distribution/materialize", post(materialize))
}

/// POST /v1/distribution/plan
///
/// Plans against the current month's committed capacity. The plan itself
/// reserves nothing; materialize re-validates before writing.
async fn plan(
    State(state): State<AppState>,
    Json(req): Json<PlanRequest>,
) -> Result<Json<DistributionPlan>, AppError> {
    if req.items.is_empty() {
        return Err(CoreError::Validation("no items to distribute".into()).into());
    }
    let items: Vec<DistributionItem> = req
        .items
        .into_iter()
        .map(|i| {
            DistributionItem::new(
                i.store_id,
                i.keyword,
                i.daily_qty,
                i.work_days,
                i.start_date,
                i.end_date,
            )
        })
        .collect();

    let month = SettlementMonth::current();
    let mut tx = state.ledger.begin().await?;
    let channels = tx.active_channels().await?;
    let mut capacities = Vec::with_capacity(channels.len());
    for channel in &channels {
        let committed = tx.channel_committed(channel.id, month).await?;
        capacities.push(ChannelCapacity::new(
            channel.id,
            channel.base_price,
            committed,
            channel.monthly_capacity,
        ));
    }

    Ok(Json(distribute(&items, &capacities, req.strategy)))
}

/// POST /v1/distribution/materialize
async fn materialize(
    State(state): State<AppState>,
    Json(req): Json<MaterializeRequest>,
) -> Result<Json<MaterializeResponse>, AppError> {
    let created_by = req.created_by.as_deref().unwrap_or("api");
    let supplier_order_ids = state
        .lifecycle()
        .materialize_distribution(&req.plan, created_by)
        .await?;
    Ok(Json(MaterializeResponse { supplier_order_ids }))
}
