use std::sync::Arc;

use chrono::Utc;
use rankpilot_core::retry::with_tx_retry;
use rankpilot_core::{CoreError, CoreResult};
use rankpilot_distribution::DistributionPlan;
use rankpilot_shared::order_no::{
    format_number, sequence_key, CUSTOMER_ORDER_PREFIX, SUPPLIER_ORDER_PREFIX,
};
use rankpilot_shared::SettlementMonth;
use uuid::Uuid;

use crate::ledger::{LedgerStore, LedgerTx};
use crate::models::{
    AuditEntry, CustomerOrder, CustomerOrderLine, CustomerOrderStatus, LineStatus,
    SettlementDirection, SettlementRecord, StatementStatus, SupplierOrder, SupplierOrderLine,
    SupplierOrderStatus,
};
use crate::settlement::completion_amounts;

/// Drives order state transitions as transaction scripts: guard reads,
/// conditional status update, cascades, audit append, commit. A failed
/// transition leaves the ledger untouched.
pub struct LifecycleService {
    ledger: Arc<dyn LedgerStore>,
    max_tx_attempts: u32,
}

impl LifecycleService {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self {
            ledger,
            max_tx_attempts: 3,
        }
    }

    pub fn with_max_attempts(mut self, max_tx_attempts: u32) -> Self {
        self.max_tx_attempts = max_tx_attempts;
        self
    }

    // --- customer orders ---

    /// Create a customer order in Draft with a fresh `CO{date}-{seq}` number.
    pub async fn create_customer_order(
        &self,
        customer_id: Uuid,
        lines: Vec<CustomerOrderLine>,
        actor: &str,
    ) -> CoreResult<CustomerOrder> {
        if lines.is_empty() {
            return Err(CoreError::Validation("order has no lines".into()));
        }
        for line in &lines {
            if line.daily_qty <= 0 {
                return Err(CoreError::Validation(format!(
                    "line {} daily_qty must be positive",
                    line.keyword
                )));
            }
            if line.work_days <= 0 {
                return Err(CoreError::Validation(format!(
                    "line {} work_days must be positive",
                    line.keyword
                )));
            }
            if line.unit_price < 0 {
                return Err(CoreError::Validation(format!(
                    "line {} unit_price must not be negative",
                    line.keyword
                )));
            }
            if line.end_date < line.start_date {
                return Err(CoreError::Validation(format!(
                    "line {} ends before it starts",
                    line.keyword
                )));
            }
        }

        with_tx_retry(self.max_tx_attempts, || {
            self.try_create_customer_order(customer_id, lines.clone(), actor)
        })
        .await
    }

    async fn try_create_customer_order(
        &self,
        customer_id: Uuid,
        lines: Vec<CustomerOrderLine>,
        actor: &str,
    ) -> CoreResult<CustomerOrder> {
        let mut tx = self.ledger.begin().await?;

        let today = Utc::now().date_naive();
        let seq = tx
            .next_sequence(&sequence_key(CUSTOMER_ORDER_PREFIX, today))
            .await?;
        let mut order = CustomerOrder::new(
            format_number(CUSTOMER_ORDER_PREFIX, today, seq),
            customer_id,
        );
        for line in lines {
            order.add_line(line);
        }

        tx.insert_customer_order(&order).await?;
        tx.append_audit(&AuditEntry::new(
            order.id,
            "CUSTOMER_ORDER_CREATED",
            serde_json::json!({ "order_no": order.order_no, "total": order.total_amount }),
            actor,
        ))
        .await?;
        tx.commit().await?;

        tracing::info!(order_no = %order.order_no, "customer order created");
        Ok(order)
    }

    /// Transition: Draft → Confirmed
    pub async fn confirm_customer_order(&self, id: Uuid, actor: &str) -> CoreResult<CustomerOrder> {
        self.customer_transition(
            id,
            CustomerOrderStatus::Draft,
            CustomerOrderStatus::Confirmed,
            "CUSTOMER_ORDER_CONFIRMED",
            actor,
        )
        .await
    }

    /// Transition: Confirmed → InProgress
    pub async fn start_customer_order(&self, id: Uuid, actor: &str) -> CoreResult<CustomerOrder> {
        self.customer_transition(
            id,
            CustomerOrderStatus::Confirmed,
            CustomerOrderStatus::InProgress,
            "CUSTOMER_ORDER_STARTED",
            actor,
        )
        .await
    }

    /// Transition: InProgress → Completed. Blocked while any linked
    /// supplier order is neither Completed nor Cancelled.
    pub async fn complete_customer_order(
        &self,
        id: Uuid,
        actor: &str,
    ) -> CoreResult<CustomerOrder> {
        with_tx_retry(self.max_tx_attempts, || {
            self.try_complete_customer_order(id, actor)
        })
        .await
    }

    async fn try_complete_customer_order(&self, id: Uuid, actor: &str) -> CoreResult<CustomerOrder> {
        let mut tx = self.ledger.begin().await?;

        let open: Vec<String> = tx
            .supplier_orders_for_customer(id)
            .await?
            .into_iter()
            .filter(|o| {
                !matches!(
                    o.status,
                    SupplierOrderStatus::Completed | SupplierOrderStatus::Cancelled
                )
            })
            .map(|o| o.order_no)
            .collect();
        if !open.is_empty() {
            return Err(CoreError::conflict(
                "customer order has open supplier orders",
                open,
            ));
        }

        let applied = tx
            .update_customer_order_status(
                id,
                CustomerOrderStatus::InProgress,
                CustomerOrderStatus::Completed,
            )
            .await?;
        if !applied {
            let current = tx
                .customer_order(id)
                .await?
                .ok_or_else(|| CoreError::not_found("customer order", id))?;
            return Err(CoreError::invalid_state(
                format!("{:?}", current.status),
                "InProgress",
            ));
        }

        let order = tx
            .customer_order(id)
            .await?
            .ok_or_else(|| CoreError::not_found("customer order", id))?;
        tx.append_audit(&AuditEntry::new(
            id,
            "CUSTOMER_ORDER_COMPLETED",
            serde_json::json!({ "order_no": order.order_no }),
            actor,
        ))
        .await?;
        tx.commit().await?;

        tracing::info!(order_no = %order.order_no, "customer order completed");
        Ok(order)
    }

    /// Cancel a customer order.
    ///
    /// Draft orders cancel outright. Confirmed orders cancel only while no
    /// supplier order has moved past Pending; Draft/Pending supplier orders
    /// cascade to Cancelled in the same transaction. InProgress orders
    /// cancel only once every supplier order is Pending or Cancelled.
    /// Returns the order and how many supplier orders were auto-cancelled.
    pub async fn cancel_customer_order(
        &self,
        id: Uuid,
        reason: Option<String>,
        actor: &str,
    ) -> CoreResult<(CustomerOrder, usize)> {
        with_tx_retry(self.max_tx_attempts, || {
            self.try_cancel_customer_order(id, reason.clone(), actor)
        })
        .await
    }

    async fn try_cancel_customer_order(
        &self,
        id: Uuid,
        reason: Option<String>,
        actor: &str,
    ) -> CoreResult<(CustomerOrder, usize)> {
        let mut tx = self.ledger.begin().await?;

        let order = tx
            .customer_order(id)
            .await?
            .ok_or_else(|| CoreError::not_found("customer order", id))?;

        match order.status {
            CustomerOrderStatus::Cancelled => {
                return Err(CoreError::AlreadyProcessed(format!(
                    "customer order {} is already cancelled",
                    order.order_no
                )));
            }
            CustomerOrderStatus::Completed => {
                return Err(CoreError::invalid_state("Completed", "Draft|Confirmed"));
            }
            _ => {}
        }

        let children = tx.supplier_orders_for_customer(id).await?;
        let blocking: Vec<String> = children
            .iter()
            .filter(|o| match order.status {
                // Past Pending blocks a Confirmed cancellation.
                CustomerOrderStatus::Confirmed => matches!(
                    o.status,
                    SupplierOrderStatus::Confirmed
                        | SupplierOrderStatus::InProgress
                        | SupplierOrderStatus::Completed
                ),
                CustomerOrderStatus::InProgress => !matches!(
                    o.status,
                    SupplierOrderStatus::Pending | SupplierOrderStatus::Cancelled
                ),
                _ => false,
            })
            .map(|o| o.order_no.clone())
            .collect();
        if !blocking.is_empty() {
            return Err(CoreError::conflict(
                "active supplier orders block cancellation",
                blocking,
            ));
        }

        let expected = order.status.clone();
        let applied = tx
            .update_customer_order_status(id, expected, CustomerOrderStatus::Cancelled)
            .await?;
        if !applied {
            return Err(CoreError::ledger_retryable(
                "customer order status changed during cancellation",
            ));
        }

        let mut cancelled = tx
            .customer_order(id)
            .await?
            .ok_or_else(|| CoreError::not_found("customer order", id))?;
        cancelled.cancel_reason = reason.clone();
        cancelled.cancelled_at = Some(Utc::now());
        tx.put_customer_order(&cancelled).await?;

        let mut auto_cancelled = 0;
        let cascade_reason = format!("customer order {} cancelled", cancelled.order_no);
        for child in children {
            if !matches!(
                child.status,
                SupplierOrderStatus::Draft | SupplierOrderStatus::Pending
            ) {
                continue;
            }
            let mut child = child;
            child.update_status(SupplierOrderStatus::Cancelled);
            child.cancel_reason = Some(cascade_reason.clone());
            child.cancelled_at = Some(Utc::now());
            for line in &mut child.lines {
                line.status = LineStatus::Cancelled;
            }
            tx.put_supplier_order(&child).await?;
            auto_cancelled += 1;
        }

        tx.append_audit(&AuditEntry::new(
            id,
            "CUSTOMER_ORDER_CANCELLED",
            serde_json::json!({
                "order_no": cancelled.order_no,
                "reason": reason,
                "auto_cancelled": auto_cancelled,
            }),
            actor,
        ))
        .await?;
        tx.commit().await?;

        tracing::info!(
            order_no = %cancelled.order_no,
            auto_cancelled,
            "customer order cancelled"
        );
        Ok((cancelled, auto_cancelled))
    }

    // --- supplier orders ---

    /// Transition: Draft → Pending
    pub async fn submit_supplier_order(&self, id: Uuid, actor: &str) -> CoreResult<SupplierOrder> {
        self.supplier_transition(
            id,
            SupplierOrderStatus::Draft,
            SupplierOrderStatus::Pending,
            "SUPPLIER_ORDER_SUBMITTED",
            actor,
        )
        .await
    }

    /// Transition: Pending → Confirmed
    pub async fn confirm_supplier_order(&self, id: Uuid, actor: &str) -> CoreResult<SupplierOrder> {
        self.supplier_transition(
            id,
            SupplierOrderStatus::Pending,
            SupplierOrderStatus::Confirmed,
            "SUPPLIER_ORDER_CONFIRMED",
            actor,
        )
        .await
    }

    /// Transition: Confirmed → InProgress
    pub async fn start_supplier_order(&self, id: Uuid, actor: &str) -> CoreResult<SupplierOrder> {
        self.supplier_transition(
            id,
            SupplierOrderStatus::Confirmed,
            SupplierOrderStatus::InProgress,
            "SUPPLIER_ORDER_STARTED",
            actor,
        )
        .await
    }

    /// Cancel a supplier order from any non-terminal state.
    pub async fn cancel_supplier_order(
        &self,
        id: Uuid,
        reason: Option<String>,
        actor: &str,
    ) -> CoreResult<SupplierOrder> {
        with_tx_retry(self.max_tx_attempts, || {
            self.try_cancel_supplier_order(id, reason.clone(), actor)
        })
        .await
    }

    async fn try_cancel_supplier_order(
        &self,
        id: Uuid,
        reason: Option<String>,
        actor: &str,
    ) -> CoreResult<SupplierOrder> {
        let mut tx = self.ledger.begin().await?;

        let order = tx
            .supplier_order(id)
            .await?
            .ok_or_else(|| CoreError::not_found("supplier order", id))?;
        match order.status {
            SupplierOrderStatus::Cancelled => {
                return Err(CoreError::AlreadyProcessed(format!(
                    "supplier order {} is already cancelled",
                    order.order_no
                )));
            }
            SupplierOrderStatus::Completed => {
                return Err(CoreError::invalid_state(
                    "Completed",
                    "Draft|Pending|Confirmed|InProgress",
                ));
            }
            _ => {}
        }

        let applied = tx
            .update_supplier_order_status(id, order.status.clone(), SupplierOrderStatus::Cancelled)
            .await?;
        if !applied {
            return Err(CoreError::ledger_retryable(
                "supplier order status changed during cancellation",
            ));
        }

        let mut cancelled = tx
            .supplier_order(id)
            .await?
            .ok_or_else(|| CoreError::not_found("supplier order", id))?;
        cancelled.cancel_reason = reason.clone();
        cancelled.cancelled_at = Some(Utc::now());
        for line in &mut cancelled.lines {
            line.status = LineStatus::Cancelled;
        }
        tx.put_supplier_order(&cancelled).await?;

        tx.append_audit(&AuditEntry::new(
            id,
            "SUPPLIER_ORDER_CANCELLED",
            serde_json::json!({ "order_no": cancelled.order_no, "reason": reason }),
            actor,
        ))
        .await?;
        tx.commit().await?;

        tracing::info!(order_no = %cancelled.order_no, "supplier order cancelled");
        Ok(cancelled)
    }

    /// Complete a supplier order: the sole path that turns completed work
    /// into gross settlement records.
    ///
    /// Requires status Confirmed or InProgress and no Draft statements.
    /// Groups lines by store, then per store resolves or creates one
    /// Revenue and one Cost record (equal amounts, current month), marks
    /// lines Completed and writes one audit entry per store. Returns the
    /// order and the number of settlement records created.
    pub async fn complete_supplier_order(
        &self,
        id: Uuid,
        actor: &str,
    ) -> CoreResult<(SupplierOrder, usize)> {
        with_tx_retry(self.max_tx_attempts, || {
            self.try_complete_supplier_order(id, actor)
        })
        .await
    }

    async fn try_complete_supplier_order(
        &self,
        id: Uuid,
        actor: &str,
    ) -> CoreResult<(SupplierOrder, usize)> {
        let mut tx = self.ledger.begin().await?;

        // 1. Guard: order exists and is Confirmed or InProgress.
        let order = tx
            .supplier_order(id)
            .await?
            .ok_or_else(|| CoreError::not_found("supplier order", id))?;
        if !matches!(
            order.status,
            SupplierOrderStatus::Confirmed | SupplierOrderStatus::InProgress
        ) {
            return Err(CoreError::invalid_state(
                format!("{:?}", order.status),
                "Confirmed|InProgress",
            ));
        }

        // 2. Guard: no statement is still Draft.
        let draft_statements: Vec<String> = tx
            .statements_for_supplier_order(id)
            .await?
            .into_iter()
            .filter(|s| s.status == StatementStatus::Draft)
            .map(|s| s.statement_no)
            .collect();
        if !draft_statements.is_empty() {
            return Err(CoreError::conflict(
                "unconfirmed statements exist",
                draft_statements,
            ));
        }

        // 3. Conditional status flip closes the double-complete race.
        let applied = tx
            .update_supplier_order_status(id, order.status.clone(), SupplierOrderStatus::Completed)
            .await?;
        if !applied {
            return Err(CoreError::AlreadyProcessed(format!(
                "supplier order {} was completed concurrently",
                order.order_no
            )));
        }

        // 4. Mark lines completed and stamp the completion time.
        let mut completed = tx
            .supplier_order(id)
            .await?
            .ok_or_else(|| CoreError::not_found("supplier order", id))?;
        completed.completed_at = Some(Utc::now());
        for line in &mut completed.lines {
            if line.status == LineStatus::Active {
                line.status = LineStatus::Completed;
            }
        }
        tx.put_supplier_order(&completed).await?;

        // 5. Paired Revenue/Cost records per store, settlement month = now.
        let month = SettlementMonth::current();
        let mut created = 0;
        for store in completion_amounts(&completed) {
            for direction in [SettlementDirection::Revenue, SettlementDirection::Cost] {
                created += upsert_gross_settlement(
                    tx.as_mut(),
                    store.store_id,
                    completed.channel_id,
                    month,
                    direction,
                    store.supply_amount,
                )
                .await?;
            }
            tx.append_audit(&AuditEntry::new(
                completed.id,
                "SUPPLIER_ORDER_COMPLETED",
                serde_json::json!({
                    "order_no": completed.order_no,
                    "store_id": store.store_id,
                    "amount": store.supply_amount,
                    "settlement_month": month.to_string(),
                }),
                actor,
            ))
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            order_no = %completed.order_no,
            settlements_created = created,
            "supplier order completed"
        );
        Ok((completed, created))
    }

    // --- distribution materialization ---

    /// Turn a distribution plan into Draft supplier orders, one per channel.
    ///
    /// Capacity is re-validated against current-month commitments inside the
    /// transaction; a stale plan fails whole with no orders created.
    pub async fn materialize_distribution(
        &self,
        plan: &DistributionPlan,
        created_by: &str,
    ) -> CoreResult<Vec<Uuid>> {
        with_tx_retry(self.max_tx_attempts, || {
            self.try_materialize(plan, created_by)
        })
        .await
    }

    async fn try_materialize(
        &self,
        plan: &DistributionPlan,
        created_by: &str,
    ) -> CoreResult<Vec<Uuid>> {
        let mut tx = self.ledger.begin().await?;
        let month = SettlementMonth::current();
        let today = Utc::now().date_naive();
        let mut created_ids = Vec::with_capacity(plan.channel_plans.len());

        for channel_plan in &plan.channel_plans {
            let channel = tx
                .channel(channel_plan.channel_id)
                .await?
                .ok_or_else(|| CoreError::not_found("channel", channel_plan.channel_id))?;

            // Figures in the plan can be stale by now.
            let committed = tx.channel_committed(channel.id, month).await?;
            let available = channel.monthly_capacity - committed;
            if channel_plan.total_qty > available {
                return Err(CoreError::CapacityExceeded {
                    channel: channel.name.clone(),
                    requested: channel_plan.total_qty,
                    available,
                });
            }

            let seq = tx
                .next_sequence(&sequence_key(SUPPLIER_ORDER_PREFIX, today))
                .await?;
            let mut order = SupplierOrder::new(
                format_number(SUPPLIER_ORDER_PREFIX, today, seq),
                channel.id,
                created_by.to_string(),
            );
            for item in &channel_plan.items {
                order.add_line(SupplierOrderLine::new(
                    item.store_id,
                    item.keyword.clone(),
                    item.daily_qty,
                    item.work_days,
                    item.start_date,
                    item.end_date,
                    channel.base_price,
                ));
            }

            tx.insert_supplier_order(&order).await?;
            tx.add_channel_commitment(channel.id, month, channel_plan.total_qty)
                .await?;
            tx.append_audit(&AuditEntry::new(
                order.id,
                "SUPPLIER_ORDER_MATERIALIZED",
                serde_json::json!({
                    "order_no": order.order_no,
                    "channel_id": channel.id,
                    "total_qty": channel_plan.total_qty,
                }),
                created_by,
            ))
            .await?;
            created_ids.push(order.id);
        }

        tx.commit().await?;

        tracing::info!(orders = created_ids.len(), "distribution plan materialized");
        Ok(created_ids)
    }

    // --- shared transition plumbing ---

    async fn customer_transition(
        &self,
        id: Uuid,
        expected: CustomerOrderStatus,
        next: CustomerOrderStatus,
        change_type: &str,
        actor: &str,
    ) -> CoreResult<CustomerOrder> {
        with_tx_retry(self.max_tx_attempts, || {
            self.try_customer_transition(id, expected.clone(), next.clone(), change_type, actor)
        })
        .await
    }

    async fn try_customer_transition(
        &self,
        id: Uuid,
        expected: CustomerOrderStatus,
        next: CustomerOrderStatus,
        change_type: &str,
        actor: &str,
    ) -> CoreResult<CustomerOrder> {
        let mut tx = self.ledger.begin().await?;
        let applied = tx
            .update_customer_order_status(id, expected.clone(), next.clone())
            .await?;
        if !applied {
            let current = tx
                .customer_order(id)
                .await?
                .ok_or_else(|| CoreError::not_found("customer order", id))?;
            return Err(CoreError::invalid_state(
                format!("{:?}", current.status),
                format!("{:?}", expected),
            ));
        }
        let order = tx
            .customer_order(id)
            .await?
            .ok_or_else(|| CoreError::not_found("customer order", id))?;
        tx.append_audit(&AuditEntry::new(
            id,
            change_type,
            serde_json::json!({ "order_no": order.order_no, "to": next }),
            actor,
        ))
        .await?;
        tx.commit().await?;

        tracing::info!(order_no = %order.order_no, ?next, "customer order transition");
        Ok(order)
    }

    async fn supplier_transition(
        &self,
        id: Uuid,
        expected: SupplierOrderStatus,
        next: SupplierOrderStatus,
        change_type: &str,
        actor: &str,
    ) -> CoreResult<SupplierOrder> {
        with_tx_retry(self.max_tx_attempts, || {
            self.try_supplier_transition(id, expected.clone(), next.clone(), change_type, actor)
        })
        .await
    }

    async fn try_supplier_transition(
        &self,
        id: Uuid,
        expected: SupplierOrderStatus,
        next: SupplierOrderStatus,
        change_type: &str,
        actor: &str,
    ) -> CoreResult<SupplierOrder> {
        let mut tx = self.ledger.begin().await?;
        let applied = tx
            .update_supplier_order_status(id, expected.clone(), next.clone())
            .await?;
        if !applied {
            let current = tx
                .supplier_order(id)
                .await?
                .ok_or_else(|| CoreError::not_found("supplier order", id))?;
            return Err(CoreError::invalid_state(
                format!("{:?}", current.status),
                format!("{:?}", expected),
            ));
        }
        let order = tx
            .supplier_order(id)
            .await?
            .ok_or_else(|| CoreError::not_found("supplier order", id))?;
        tx.append_audit(&AuditEntry::new(
            id,
            change_type,
            serde_json::json!({ "order_no": order.order_no, "to": next }),
            actor,
        ))
        .await?;
        tx.commit().await?;

        tracing::info!(order_no = %order.order_no, ?next, "supplier order transition");
        Ok(order)
    }
}

/// Add a gross completion amount onto the (store, channel, month, direction)
/// record, creating it when absent. Returns 1 when a record was created.
async fn upsert_gross_settlement(
    tx: &mut dyn LedgerTx,
    store_id: Uuid,
    channel_id: Uuid,
    month: SettlementMonth,
    direction: SettlementDirection,
    amount: i64,
) -> CoreResult<usize> {
    match tx
        .find_settlement_record(store_id, channel_id, month, direction.clone())
        .await?
    {
        Some(mut record) => {
            record.amount += amount;
            record.updated_at = Utc::now();
            tx.put_settlement_record(&record).await?;
            Ok(0)
        }
        None => {
            let mut record = SettlementRecord::new(store_id, channel_id, month, direction);
            record.amount = amount;
            tx.insert_settlement_record(&record).await?;
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedger;
    use crate::models::SettlementStatus;
    use chrono::NaiveDate;
    use rankpilot_channel::Channel;
    use rankpilot_distribution::{distribute, DistributionItem, Strategy};

    fn customer_line(store_id: Uuid) -> CustomerOrderLine {
        CustomerOrderLine::new(
            store_id,
            "burr grinder".to_string(),
            10,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            30,
            100,
        )
    }

    fn supplier_line(store_id: Uuid) -> SupplierOrderLine {
        SupplierOrderLine::new(
            store_id,
            "burr grinder".to_string(),
            10,
            30,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            100,
        )
    }

    async fn seed_supplier_order(
        ledger: &MemoryLedger,
        customer_order_id: Option<Uuid>,
        status: SupplierOrderStatus,
        stores: &[Uuid],
    ) -> SupplierOrder {
        let mut order = SupplierOrder::new(
            format!("SO20250301-{}", Uuid::new_v4().simple()),
            Uuid::new_v4(),
            "system".to_string(),
        );
        order.customer_order_id = customer_order_id;
        for store in stores {
            order.add_line(supplier_line(*store));
        }
        order.status = status;
        let mut tx = ledger.begin().await.unwrap();
        tx.insert_supplier_order(&order).await.unwrap();
        tx.commit().await.unwrap();
        order
    }

    fn service(ledger: &MemoryLedger) -> LifecycleService {
        LifecycleService::new(Arc::new(ledger.clone()))
    }

    #[tokio::test]
    async fn test_customer_order_walk_through_lifecycle() {
        let ledger = MemoryLedger::new();
        let svc = service(&ledger);

        let order = svc
            .create_customer_order(Uuid::new_v4(), vec![customer_line(Uuid::new_v4())], "sales")
            .await
            .unwrap();
        assert_eq!(order.status, CustomerOrderStatus::Draft);
        assert_eq!(order.supply_amount, 30_000);
        assert_eq!(order.total_amount, 33_000);

        let order = svc.confirm_customer_order(order.id, "sales").await.unwrap();
        assert_eq!(order.status, CustomerOrderStatus::Confirmed);

        let order = svc.start_customer_order(order.id, "ops").await.unwrap();
        assert_eq!(order.status, CustomerOrderStatus::InProgress);

        let order = svc.complete_customer_order(order.id, "ops").await.unwrap();
        assert_eq!(order.status, CustomerOrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_lines() {
        let svc = service(&MemoryLedger::new());

        let mut bad = customer_line(Uuid::new_v4());
        bad.daily_qty = 0;
        let err = svc
            .create_customer_order(Uuid::new_v4(), vec![bad], "sales")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let err = svc
            .create_customer_order(Uuid::new_v4(), vec![], "sales")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_order_numbers_increment_within_day() {
        let svc = service(&MemoryLedger::new());

        let first = svc
            .create_customer_order(Uuid::new_v4(), vec![customer_line(Uuid::new_v4())], "sales")
            .await
            .unwrap();
        let second = svc
            .create_customer_order(Uuid::new_v4(), vec![customer_line(Uuid::new_v4())], "sales")
            .await
            .unwrap();

        assert!(first.order_no.ends_with("-1"));
        assert!(second.order_no.ends_with("-2"));
    }

    #[tokio::test]
    async fn test_complete_customer_order_blocked_by_open_supplier() {
        let ledger = MemoryLedger::new();
        let svc = service(&ledger);

        let order = svc
            .create_customer_order(Uuid::new_v4(), vec![customer_line(Uuid::new_v4())], "sales")
            .await
            .unwrap();
        svc.confirm_customer_order(order.id, "sales").await.unwrap();
        svc.start_customer_order(order.id, "ops").await.unwrap();
        let open = seed_supplier_order(
            &ledger,
            Some(order.id),
            SupplierOrderStatus::InProgress,
            &[Uuid::new_v4()],
        )
        .await;

        let err = svc
            .complete_customer_order(order.id, "ops")
            .await
            .unwrap_err();
        match err {
            CoreError::Conflict { blocking, .. } => {
                assert_eq!(blocking, vec![open.order_no]);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_confirmed_cascades_pending_children() {
        let ledger = MemoryLedger::new();
        let svc = service(&ledger);

        let order = svc
            .create_customer_order(Uuid::new_v4(), vec![customer_line(Uuid::new_v4())], "sales")
            .await
            .unwrap();
        svc.confirm_customer_order(order.id, "sales").await.unwrap();
        let pending = seed_supplier_order(
            &ledger,
            Some(order.id),
            SupplierOrderStatus::Pending,
            &[Uuid::new_v4()],
        )
        .await;

        let (cancelled, auto_cancelled) = svc
            .cancel_customer_order(order.id, Some("budget cut".to_string()), "sales")
            .await
            .unwrap();

        assert_eq!(cancelled.status, CustomerOrderStatus::Cancelled);
        assert_eq!(cancelled.cancel_reason.as_deref(), Some("budget cut"));
        assert_eq!(auto_cancelled, 1);

        let mut tx = ledger.begin().await.unwrap();
        let child = tx.supplier_order(pending.id).await.unwrap().unwrap();
        assert_eq!(child.status, SupplierOrderStatus::Cancelled);
        assert!(child
            .cancel_reason
            .unwrap()
            .contains(&cancelled.order_no));
    }

    #[tokio::test]
    async fn test_cancel_confirmed_blocked_by_in_progress_child() {
        let ledger = MemoryLedger::new();
        let svc = service(&ledger);

        let order = svc
            .create_customer_order(Uuid::new_v4(), vec![customer_line(Uuid::new_v4())], "sales")
            .await
            .unwrap();
        svc.confirm_customer_order(order.id, "sales").await.unwrap();
        let pending = seed_supplier_order(
            &ledger,
            Some(order.id),
            SupplierOrderStatus::Pending,
            &[Uuid::new_v4()],
        )
        .await;
        let active = seed_supplier_order(
            &ledger,
            Some(order.id),
            SupplierOrderStatus::InProgress,
            &[Uuid::new_v4()],
        )
        .await;

        let err = svc
            .cancel_customer_order(order.id, None, "sales")
            .await
            .unwrap_err();
        match err {
            CoreError::Conflict { blocking, .. } => {
                assert_eq!(blocking, vec![active.order_no]);
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        // Nothing moved.
        let mut tx = ledger.begin().await.unwrap();
        assert_eq!(
            tx.customer_order(order.id).await.unwrap().unwrap().status,
            CustomerOrderStatus::Confirmed
        );
        assert_eq!(
            tx.supplier_order(pending.id).await.unwrap().unwrap().status,
            SupplierOrderStatus::Pending
        );
        assert_eq!(
            tx.supplier_order(active.id).await.unwrap().unwrap().status,
            SupplierOrderStatus::InProgress
        );
    }

    #[tokio::test]
    async fn test_cancel_terminal_states() {
        let ledger = MemoryLedger::new();
        let svc = service(&ledger);

        let order = svc
            .create_customer_order(Uuid::new_v4(), vec![customer_line(Uuid::new_v4())], "sales")
            .await
            .unwrap();
        svc.cancel_customer_order(order.id, None, "sales")
            .await
            .unwrap();

        let err = svc
            .cancel_customer_order(order.id, None, "sales")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyProcessed(_)));

        let err = svc
            .cancel_customer_order(Uuid::new_v4(), None, "sales")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_complete_supplier_order_creates_paired_records() {
        let ledger = MemoryLedger::new();
        let svc = service(&ledger);
        let store_a = Uuid::new_v4();
        let store_b = Uuid::new_v4();
        let order = seed_supplier_order(
            &ledger,
            None,
            SupplierOrderStatus::InProgress,
            &[store_a, store_b],
        )
        .await;

        let (completed, created) = svc
            .complete_supplier_order(order.id, "ops")
            .await
            .unwrap();

        assert_eq!(completed.status, SupplierOrderStatus::Completed);
        assert!(completed.completed_at.is_some());
        assert!(completed
            .lines
            .iter()
            .all(|l| l.status == LineStatus::Completed));
        // Two stores, one Revenue + one Cost each.
        assert_eq!(created, 4);

        let month = SettlementMonth::current();
        let mut tx = ledger.begin().await.unwrap();
        for store in [store_a, store_b] {
            let revenue = tx
                .find_settlement_record(
                    store,
                    completed.channel_id,
                    month,
                    SettlementDirection::Revenue,
                )
                .await
                .unwrap()
                .unwrap();
            let cost = tx
                .find_settlement_record(
                    store,
                    completed.channel_id,
                    month,
                    SettlementDirection::Cost,
                )
                .await
                .unwrap()
                .unwrap();
            assert_eq!(revenue.amount, cost.amount);
            assert_eq!(revenue.amount, 30_000);
            assert_eq!(revenue.status, SettlementStatus::Pending);
        }
    }

    #[tokio::test]
    async fn test_complete_supplier_order_requires_confirmed_or_in_progress() {
        let ledger = MemoryLedger::new();
        let svc = service(&ledger);
        let order =
            seed_supplier_order(&ledger, None, SupplierOrderStatus::Pending, &[Uuid::new_v4()])
                .await;

        let err = svc
            .complete_supplier_order(order.id, "ops")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_complete_supplier_order_blocked_by_draft_statement() {
        let ledger = MemoryLedger::new();
        let svc = service(&ledger);
        let order = seed_supplier_order(
            &ledger,
            None,
            SupplierOrderStatus::InProgress,
            &[Uuid::new_v4()],
        )
        .await;

        let statement = crate::models::FulfillmentStatement::new(
            "FS20250301-1".to_string(),
            order.id,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        );
        let mut tx = ledger.begin().await.unwrap();
        tx.insert_statement(&statement).await.unwrap();
        tx.commit().await.unwrap();

        let err = svc
            .complete_supplier_order(order.id, "ops")
            .await
            .unwrap_err();
        match err {
            CoreError::Conflict { blocking, .. } => {
                assert_eq!(blocking, vec!["FS20250301-1".to_string()]);
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_supplier_submit_confirm_start() {
        let ledger = MemoryLedger::new();
        let svc = service(&ledger);
        let order =
            seed_supplier_order(&ledger, None, SupplierOrderStatus::Draft, &[Uuid::new_v4()])
                .await;

        let order = svc.submit_supplier_order(order.id, "ops").await.unwrap();
        assert_eq!(order.status, SupplierOrderStatus::Pending);
        let order = svc.confirm_supplier_order(order.id, "ops").await.unwrap();
        assert_eq!(order.status, SupplierOrderStatus::Confirmed);
        let order = svc.start_supplier_order(order.id, "ops").await.unwrap();
        assert_eq!(order.status, SupplierOrderStatus::InProgress);

        // Skipping a state fails.
        let err = svc.submit_supplier_order(order.id, "ops").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
    }

    async fn seed_channel(ledger: &MemoryLedger, base_price: i64, capacity: i64) -> Channel {
        let channel = Channel::new("channel".to_string(), base_price, capacity);
        let mut tx = ledger.begin().await.unwrap();
        tx.insert_channel(&channel).await.unwrap();
        tx.commit().await.unwrap();
        channel
    }

    fn plan_item(daily_qty: i64, work_days: i64) -> DistributionItem {
        DistributionItem::new(
            Uuid::new_v4(),
            "burr grinder".to_string(),
            daily_qty,
            work_days,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_materialize_creates_draft_orders_and_commitments() {
        let ledger = MemoryLedger::new();
        let svc = service(&ledger);
        let channel = seed_channel(&ledger, 80, 10_000).await;

        let capacity =
            rankpilot_channel::ChannelCapacity::new(channel.id, channel.base_price, 0, 10_000);
        let plan = distribute(
            &[plan_item(10, 30), plan_item(5, 20)],
            &[capacity],
            Strategy::LeastCostFirst,
        );
        assert!(plan.success);

        let ids = svc.materialize_distribution(&plan, "planner").await.unwrap();
        assert_eq!(ids.len(), 1);

        let mut tx = ledger.begin().await.unwrap();
        let order = tx.supplier_order(ids[0]).await.unwrap().unwrap();
        assert_eq!(order.status, SupplierOrderStatus::Draft);
        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.total_amount, 400 * 80);
        assert_eq!(
            tx.channel_committed(channel.id, SettlementMonth::current())
                .await
                .unwrap(),
            400
        );
    }

    #[tokio::test]
    async fn test_materialize_fails_whole_plan_on_stale_capacity() {
        let ledger = MemoryLedger::new();
        let svc = service(&ledger);
        let channel = seed_channel(&ledger, 80, 500).await;

        let capacity =
            rankpilot_channel::ChannelCapacity::new(channel.id, channel.base_price, 0, 500);
        let plan = distribute(&[plan_item(10, 30)], &[capacity], Strategy::LeastCostFirst);
        assert!(plan.success);

        // Concurrent materialization took most of the month before us.
        let mut tx = ledger.begin().await.unwrap();
        tx.add_channel_commitment(channel.id, SettlementMonth::current(), 400)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let err = svc
            .materialize_distribution(&plan, "planner")
            .await
            .unwrap_err();
        match err {
            CoreError::CapacityExceeded {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 300);
                assert_eq!(available, 100);
            }
            other => panic!("expected capacity exceeded, got {other:?}"),
        }

        // Nothing was committed.
        let mut tx = ledger.begin().await.unwrap();
        assert_eq!(
            tx.channel_committed(channel.id, SettlementMonth::current())
                .await
                .unwrap(),
            400
        );
    }
}
