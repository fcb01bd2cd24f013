use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use rankpilot_core::CoreError;
use rankpilot_order::{RenewalOutcome, RenewalProposal};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use crate::{actor_of, ActorRequest};

#[derive(Debug, Deserialize)]
pub struct CreateProposalRequest {
    pub supplier_order_id: Uuid,
    pub proposed_start: NaiveDate,
    pub proposed_end: NaiveDate,
    pub proposed_amount: i64,
    pub actor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub notice_days: Option<i64>,
    pub actor: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/renewals", post(create_proposal))
        .route("/v1/renewals/scan", post(scan))
        .route("/v1/renewals/{id}", get(get_proposal))
        .route("/v1/renewals/{id}/accept", post(accept))
        .route("/v1/renewals/{id}/decline", post(decline))
}

/// POST /v1/renewals
async fn create_proposal(
    State(state): State<AppState>,
    Json(req): Json<CreateProposalRequest>,
) -> Result<Json<RenewalProposal>, AppError> {
    let actor = req.actor.as_deref().unwrap_or("api");
    let proposal = state
        .renewals()
        .create_proposal(
            req.supplier_order_id,
            req.proposed_start,
            req.proposed_end,
            req.proposed_amount,
            actor,
        )
        .await?;
    Ok(Json(proposal))
}

/// POST /v1/renewals/scan
///
/// Sweeps in-progress orders ending within the notice window and raises
/// one pending proposal per order.
async fn scan(
    State(state): State<AppState>,
    body: Option<Json<ScanRequest>>,
) -> Result<Json<Vec<RenewalProposal>>, AppError> {
    let (notice_days, actor) = match body {
        Some(Json(req)) => (
            req.notice_days
                .unwrap_or(state.business_rules.renewal_notice_days),
            req.actor.unwrap_or_else(|| "api".to_string()),
        ),
        None => (state.business_rules.renewal_notice_days, "api".to_string()),
    };
    let proposals = state.renewals().scan_expiring(notice_days, &actor).await?;
    Ok(Json(proposals))
}

/// GET /v1/renewals/:id
async fn get_proposal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RenewalProposal>, AppError> {
    let mut tx = state.ledger.begin().await?;
    let proposal = tx
        .proposal(id)
        .await?
        .ok_or_else(|| CoreError::not_found("renewal proposal", id))?;
    Ok(Json(proposal))
}

/// POST /v1/renewals/:id/accept
async fn accept(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ActorRequest>>,
) -> Result<Json<RenewalOutcome>, AppError> {
    let outcome = state.renewals().accept(id, &actor_of(&body)).await?;
    Ok(Json(outcome))
}

/// POST /v1/renewals/:id/decline
async fn decline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ActorRequest>>,
) -> Result<Json<RenewalProposal>, AppError> {
    let proposal = state.renewals().decline(id, &actor_of(&body)).await?;
    Ok(Json(proposal))
}
