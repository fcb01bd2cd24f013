use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use rankpilot_core::CoreError;
use rankpilot_order::{CustomerOrder, CustomerOrderLine, SupplierOrder};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;
use crate::{actor_of, ActorRequest};

#[derive(Debug, Deserialize)]
pub struct CreateCustomerOrderRequest {
    pub customer_id: Uuid,
    pub lines: Vec<CustomerOrderLineRequest>,
    pub actor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CustomerOrderLineRequest {
    pub store_id: Uuid,
    pub keyword: String,
    pub daily_qty: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub work_days: i64,
    pub unit_price: i64,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
    pub actor: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct CancelCustomerOrderResponse {
    pub order: CustomerOrder,
    pub cancelled_supplier_orders: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/customer-orders", post(create_customer_order))
        .route("/v1/customer-orders/{id}", get(get_customer_order))
        .route(
            "/v1/customer-orders/{id}/supplier-orders",
            get(list_supplier_orders),
        )
        .route("/v1/customer-orders/{id}/confirm", post(confirm))
        .route("/v1/customer-orders/{id}/start", post(start))
        .route("/v1/customer-orders/{id}/complete", post(complete))
        .route("/v1/customer-orders/{id}/cancel", post(cancel))
}

/// POST /v1/customer-orders
async fn create_customer_order(
    State(state): State<AppState>,
    Json(req): Json<CreateCustomerOrderRequest>,
) -> Result<Json<CustomerOrder>, AppError> {
    let actor = req.actor.as_deref().unwrap_or("api");
    let lines: Vec<CustomerOrderLine> = req
        .lines
        .into_iter()
        .map(|l| {
            CustomerOrderLine::new(
                l.store_id,
                l.keyword,
                l.daily_qty,
                l.start_date,
                l.end_date,
                l.work_days,
                l.unit_price,
            )
        })
        .collect();

    let order = state
        .lifecycle()
        .create_customer_order(req.customer_id, lines, actor)
        .await?;
    Ok(Json(order))
}

/// GET /v1/customer-orders/:id
async fn get_customer_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CustomerOrder>, AppError> {
    let mut tx = state.ledger.begin().await?;
    let order = tx
        .customer_order(id)
        .await?
        .ok_or_else(|| CoreError::not_found("customer order", id))?;
    Ok(Json(order))
}

/// GET /v1/customer-orders/:id/supplier-orders
async fn list_supplier_orders(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<SupplierOrder>>, AppError> {
    let mut tx = state.ledger.begin().await?;
    let orders = tx.supplier_orders_for_customer(id).await?;
    Ok(Json(orders))
}

/// POST /v1/customer-orders/:id/confirm
async fn confirm(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ActorRequest>>,
) -> Result<Json<CustomerOrder>, AppError> {
    let order = state
        .lifecycle()
        .confirm_customer_order(id, &actor_of(&body))
        .await?;
    Ok(Json(order))
}

/// POST /v1/customer-orders/:id/start
async fn start(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ActorRequest>>,
) -> Result<Json<CustomerOrder>, AppError> {
    let order = state
        .lifecycle()
        .start_customer_order(id, &actor_of(&body))
        .await?;
    Ok(Json(order))
}

/// POST /v1/customer-orders/:id/complete
async fn complete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<ActorRequest>>,
) -> Result<Json<CustomerOrder>, AppError> {
    let order = state
        .lifecycle()
        .complete_customer_order(id, &actor_of(&body))
        .await?;
    Ok(Json(order))
}

/// POST /v1/customer-orders/:id/cancel
async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<CancelCustomerOrderResponse>, AppError> {
    let (reason, actor) = match body {
        Some(Json(req)) => (req.reason, req.actor.unwrap_or_else(|| "api".to_string())),
        None => (None, "api".to_string()),
    };
    let (order, cancelled_supplier_orders) = state
        .lifecycle()
        .cancel_customer_order(id, reason, &actor)
        .await?;
    Ok(Json(CancelCustomerOrderResponse {
        order,
        cancelled_supplier_orders,
    }))
}
