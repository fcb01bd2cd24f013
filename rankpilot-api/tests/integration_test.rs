use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use rankpilot_api::{app, AppState};
use rankpilot_core::measurement::RankSample;
use rankpilot_order::{
    GoalType, LedgerStore, MemoryLedger, RefundPolicy, SettlementDirection, SupplierOrder,
    SupplierOrderLine, SupplierOrderStatus,
};
use rankpilot_shared::SettlementMonth;
use rankpilot_store::{BusinessRules, MemoryMeasurementFeed};
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

fn test_state() -> (AppState, MemoryLedger, MemoryMeasurementFeed) {
    let ledger = MemoryLedger::new();
    let feed = MemoryMeasurementFeed::new();
    let state = AppState {
        ledger: Arc::new(ledger.clone()),
        feed: Arc::new(feed.clone()),
        business_rules: BusinessRules {
            tax_rate: 0.10,
            renewal_notice_days: 30,
            settlement_retry_max: 3,
        },
    };
    (state, ledger, feed)
}

async fn request(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(v) => builder
            .header("content-type", "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_channel(app: &Router, name: &str, base_price: i64, capacity: i64) -> Value {
    let (status, body) = request(
        app,
        "POST",
        "/v1/channels",
        Some(json!({ "name": name, "base_price": base_price, "monthly_capacity": capacity })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

async fn plan_one_item(app: &Router, store_id: Uuid) -> Value {
    let (status, plan) = request(
        app,
        "POST",
        "/v1/distribution/plan",
        Some(json!({
            "items": [{
                "store_id": store_id,
                "keyword": "espresso machine",
                "daily_qty": 10,
                "work_days": 10,
                "start_date": "2025-03-01",
                "end_date": "2025-03-10"
            }],
            "strategy": "LEAST_COST_FIRST"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    plan
}

#[tokio::test]
async fn test_distribution_to_settlement_flow() {
    let (state, ledger, _) = test_state();
    let app = app(state);
    let store_id = Uuid::new_v4();

    let channel = create_channel(&app, "metro search", 100, 1000).await;
    let channel_id = Uuid::parse_str(channel["id"].as_str().unwrap()).unwrap();

    let plan = plan_one_item(&app, store_id).await;
    assert_eq!(plan["success"], json!(true));
    assert_eq!(plan["channel_plans"][0]["total_qty"], json!(100));
    assert_eq!(plan["channel_plans"][0]["estimated_cost"], json!(10_000));

    let (status, body) = request(
        &app,
        "POST",
        "/v1/distribution/materialize",
        Some(json!({ "plan": plan, "created_by": "tester" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let order_id = body["supplier_order_ids"][0].as_str().unwrap().to_string();

    for step in ["submit", "confirm", "start"] {
        let (status, _) = request(
            &app,
            "POST",
            &format!("/v1/supplier-orders/{}/{}", order_id, step),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "transition {} failed", step);
    }

    let (status, order) =
        request(&app, "GET", &format!("/v1/supplier-orders/{}", order_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], json!("IN_PROGRESS"));
    let line_id = order["lines"][0]["id"].as_str().unwrap().to_string();

    // Completion settles gross Revenue and Cost for the single store.
    let (status, body) = request(
        &app,
        "POST",
        &format!("/v1/supplier-orders/{}/complete", order_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settlements_created"], json!(2));
    assert_eq!(body["order"]["status"], json!("COMPLETED"));

    let (status, statement) = request(
        &app,
        "POST",
        "/v1/statements",
        Some(json!({
            "supplier_order_id": order_id,
            "period_start": "2025-03-01",
            "period_end": "2025-03-10",
            "lines": [{
                "supplier_order_line_id": line_id,
                "completed_qty": 100,
                "amount": 10_000
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let statement_id = statement["id"].as_str().unwrap().to_string();

    let (status, body) = request(
        &app,
        "POST",
        &format!("/v1/statements/{}/confirm", statement_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settlement_lines_created"], json!(1));

    let (status, _) = request(
        &app,
        "POST",
        &format!("/v1/statements/{}/confirm", statement_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The statement's cost landed on the record completion opened.
    let mut tx = ledger.begin().await.unwrap();
    let record = tx
        .find_settlement_record(
            store_id,
            channel_id,
            SettlementMonth::new(2025, 3),
            SettlementDirection::Cost,
        )
        .await
        .unwrap()
        .unwrap();
    drop(tx);
    assert_eq!(record.lines.len(), 1);
    assert_eq!(record.amount, 11_000);

    let (status, body) = request(
        &app,
        "POST",
        &format!("/v1/settlements/{}/confirm", record.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("CONFIRMED"));

    let (status, body) = request(
        &app,
        "POST",
        &format!("/v1/settlements/{}/pay", record.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("PAID"));

    let (status, _) = request(
        &app,
        "POST",
        &format!("/v1/settlements/{}/pay", record.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_materialize_twice_exhausts_capacity() {
    let (state, _, _) = test_state();
    let app = app(state);
    let store_id = Uuid::new_v4();

    create_channel(&app, "metro search", 100, 150).await;
    let plan = plan_one_item(&app, store_id).await;
    assert_eq!(plan["success"], json!(true));

    let (status, _) = request(
        &app,
        "POST",
        "/v1/distribution/materialize",
        Some(json!({ "plan": plan })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Same plan again: only 50 of 150 remain.
    let (status, body) = request(
        &app,
        "POST",
        "/v1/distribution/materialize",
        Some(json!({ "plan": plan })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("capacity"));
}

#[tokio::test]
async fn test_customer_order_lifecycle_and_cancel() {
    let (state, _, _) = test_state();
    let app = app(state);

    let (status, order) = request(
        &app,
        "POST",
        "/v1/customer-orders",
        Some(json!({
            "customer_id": Uuid::new_v4(),
            "lines": [{
                "store_id": Uuid::new_v4(),
                "keyword": "gooseneck kettle",
                "daily_qty": 5,
                "start_date": "2025-03-01",
                "end_date": "2025-03-31",
                "work_days": 30,
                "unit_price": 200
            }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], json!("DRAFT"));
    assert_eq!(order["supply_amount"], json!(30_000));
    assert_eq!(order["tax_amount"], json!(3_000));
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, _) = request(
        &app,
        "POST",
        &format!("/v1/customer-orders/{}/confirm", order_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Confirm is not re-runnable.
    let (status, _) = request(
        &app,
        "POST",
        &format!("/v1/customer-orders/{}/confirm", order_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = request(
        &app,
        "POST",
        &format!("/v1/customer-orders/{}/cancel", order_id),
        Some(json!({ "reason": "customer withdrew" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order"]["status"], json!("CANCELLED"));
    assert_eq!(body["cancelled_supplier_orders"], json!(0));
}

#[tokio::test]
async fn test_error_mapping() {
    let (state, _, _) = test_state();
    let app = app(state);

    let (status, _) = request(
        &app,
        "GET",
        &format!("/v1/customer-orders/{}", Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = request(
        &app,
        "POST",
        "/v1/customer-orders",
        Some(json!({ "customer_id": Uuid::new_v4(), "lines": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = request(
        &app,
        "POST",
        "/v1/billing/batch",
        Some(json!({ "month": "2025-13" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

async fn seed_completed_guarantee_order(
    ledger: &MemoryLedger,
    feed: &MemoryMeasurementFeed,
    store_id: Uuid,
) -> (Uuid, Uuid) {
    let mut line = SupplierOrderLine::new(
        store_id,
        "cold brew filter".to_string(),
        1,
        10,
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
        0,
    );
    line.amount = 100_000;
    line.goal_type = GoalType::RankingGuarantee;
    line.target_rank = Some(10);
    line.refund_policy = RefundPolicy::DailyProrated;
    line.refund_rate = 1.0;
    let line_id = line.id;

    let mut order = SupplierOrder::new(
        "SO20250301-9".to_string(),
        Uuid::new_v4(),
        "system".to_string(),
    );
    order.add_line(line);
    order.status = SupplierOrderStatus::Completed;
    let order_id = order.id;

    let mut tx = ledger.begin().await.unwrap();
    tx.insert_supplier_order(&order).await.unwrap();
    tx.commit().await.unwrap();

    // 7 achieved days, 3 failed.
    for day in 1..=10u32 {
        feed.record(&RankSample {
            store_id,
            keyword: "cold brew filter".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            rank: if day <= 7 { 5 } else { 30 },
        })
        .await;
    }

    (order_id, line_id)
}

#[tokio::test]
async fn test_billing_endpoints() {
    let (state, ledger, feed) = test_state();
    let app = app(state);
    let store_id = Uuid::new_v4();
    let (_, line_id) = seed_completed_guarantee_order(&ledger, &feed, store_id).await;

    let (status, result) = request(
        &app,
        "GET",
        &format!("/v1/billing/lines/{}", line_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["achieved_days"], json!(7));
    assert_eq!(result["failed_days"], json!(3));
    assert_eq!(result["deduction_amount"], json!(30_000));
    assert_eq!(result["billable_amount"], json!(70_000));

    let (status, summary) = request(
        &app,
        "POST",
        "/v1/billing/batch",
        Some(json!({ "month": "2025-03" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total_items"], json!(1));
    assert_eq!(summary["processed_items"], json!(1));
    assert_eq!(summary["total_billable_amount"], json!(70_000));

    let (status, order) = request(
        &app,
        "GET",
        &format!(
            "/v1/supplier-orders/{}",
            seeded_order_id(&ledger, line_id).await
        ),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["lines"][0]["refund_per_day"], json!(10_000));
}

async fn seeded_order_id(ledger: &MemoryLedger, line_id: Uuid) -> Uuid {
    let mut tx = ledger.begin().await.unwrap();
    let (order, _) = tx.supplier_line(line_id).await.unwrap().unwrap();
    order.id
}

#[tokio::test]
async fn test_renewal_flow() {
    let (state, _, _) = test_state();
    let app = app(state);
    let store_id = Uuid::new_v4();

    create_channel(&app, "metro search", 100, 1000).await;
    let plan = plan_one_item(&app, store_id).await;
    let (_, body) = request(
        &app,
        "POST",
        "/v1/distribution/materialize",
        Some(json!({ "plan": plan })),
    )
    .await;
    let order_id = body["supplier_order_ids"][0].as_str().unwrap().to_string();

    let (status, proposal) = request(
        &app,
        "POST",
        "/v1/renewals",
        Some(json!({
            "supplier_order_id": order_id,
            "proposed_start": "2025-04-01",
            "proposed_end": "2025-04-30",
            "proposed_amount": 50_000
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let proposal_id = proposal["id"].as_str().unwrap().to_string();

    let (status, outcome) = request(
        &app,
        "POST",
        &format!("/v1/renewals/{}/accept", proposal_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["item_count"], json!(1));
    assert_eq!(outcome["total_amount"], json!(50_000));

    let (status, _) = request(
        &app,
        "POST",
        &format!("/v1/renewals/{}/decline", proposal_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}
