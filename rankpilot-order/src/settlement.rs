use std::collections::HashMap;
use std::sync::Arc;

use rankpilot_core::retry::with_tx_retry;
use rankpilot_core::{CoreError, CoreResult};
use uuid::Uuid;

use crate::ledger::LedgerStore;
use crate::models::{AuditEntry, LineStatus, SettlementRecord, SettlementStatus, SupplierOrder};

/// Per-store supply total derived from a completed supplier order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreAmount {
    pub store_id: Uuid,
    pub supply_amount: i64,
}

/// Group a supplier order's non-cancelled lines by store.
///
/// A pure function: the completion handler turns each entry into a paired
/// revenue and cost record for the order's channel.
pub fn completion_amounts(order: &SupplierOrder) -> Vec<StoreAmount> {
    let mut totals: HashMap<Uuid, i64> = HashMap::new();
    let mut store_order: Vec<Uuid> = Vec::new();

    for line in &order.lines {
        if line.status == LineStatus::Cancelled {
            continue;
        }
        let entry = totals.entry(line.store_id).or_insert_with(|| {
            store_order.push(line.store_id);
            0
        });
        *entry += line.amount;
    }

    store_order
        .into_iter()
        .map(|store_id| StoreAmount {
            store_id,
            supply_amount: totals[&store_id],
        })
        .collect()
}

/// Advances settlement records through their payment states.
pub struct SettlementService {
    ledger: Arc<dyn LedgerStore>,
    max_tx_attempts: u32,
}

impl SettlementService {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self {
            ledger,
            max_tx_attempts: 3,
        }
    }

    /// Transition: Pending → Confirmed
    pub async fn confirm(&self, record_id: Uuid, actor: &str) -> CoreResult<SettlementRecord> {
        with_tx_retry(self.max_tx_attempts, || {
            self.transition(
                record_id,
                SettlementStatus::Pending,
                SettlementStatus::Confirmed,
                "SETTLEMENT_CONFIRMED",
                actor,
            )
        })
        .await
    }

    /// Transition: Confirmed → Paid
    pub async fn mark_paid(&self, record_id: Uuid, actor: &str) -> CoreResult<SettlementRecord> {
        with_tx_retry(self.max_tx_attempts, || {
            self.transition(
                record_id,
                SettlementStatus::Confirmed,
                SettlementStatus::Paid,
                "SETTLEMENT_PAID",
                actor,
            )
        })
        .await
    }

    async fn transition(
        &self,
        record_id: Uuid,
        expected: SettlementStatus,
        next: SettlementStatus,
        change_type: &str,
        actor: &str,
    ) -> CoreResult<SettlementRecord> {
        let mut tx = self.ledger.begin().await?;

        let applied = tx
            .update_settlement_status(record_id, expected.clone(), next.clone())
            .await?;
        if !applied {
            let current = tx
                .settlement_record(record_id)
                .await?
                .ok_or_else(|| CoreError::not_found("settlement record", record_id))?;
            return Err(CoreError::invalid_state(
                format!("{:?}", current.status),
                format!("{:?}", expected),
            ));
        }

        let record = tx
            .settlement_record(record_id)
            .await?
            .ok_or_else(|| CoreError::not_found("settlement record", record_id))?;

        tx.append_audit(&AuditEntry::new(
            record_id,
            change_type,
            serde_json::json!({
                "from": expected,
                "to": next,
                "amount": record.amount,
            }),
            actor,
        ))
        .await?;
        tx.commit().await?;

        tracing::info!(%record_id, ?next, "settlement status updated");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedger;
    use crate::models::{SettlementDirection, SettlementLine, SupplierOrderLine};
    use chrono::NaiveDate;
    use rankpilot_shared::SettlementMonth;

    fn guarded_line(store_id: Uuid, amount_per_unit: i64) -> SupplierOrderLine {
        SupplierOrderLine::new(
            store_id,
            "pour over kettle".to_string(),
            10,
            30,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            amount_per_unit,
        )
    }

    #[test]
    fn test_completion_amounts_groups_by_store() {
        let store_a = Uuid::new_v4();
        let store_b = Uuid::new_v4();
        let mut order = SupplierOrder::new(
            "SO20250301-1".to_string(),
            Uuid::new_v4(),
            "system".to_string(),
        );
        order.add_line(guarded_line(store_a, 100)); // 30_000
        order.add_line(guarded_line(store_b, 50)); // 15_000
        order.add_line(guarded_line(store_a, 10)); // 3_000

        let amounts = completion_amounts(&order);

        assert_eq!(amounts.len(), 2);
        assert_eq!(amounts[0].store_id, store_a);
        assert_eq!(amounts[0].supply_amount, 33_000);
        assert_eq!(amounts[1].store_id, store_b);
        assert_eq!(amounts[1].supply_amount, 15_000);
    }

    #[test]
    fn test_completion_amounts_skips_cancelled_lines() {
        let store = Uuid::new_v4();
        let mut order = SupplierOrder::new(
            "SO20250301-2".to_string(),
            Uuid::new_v4(),
            "system".to_string(),
        );
        order.add_line(guarded_line(store, 100));
        let mut dropped = guarded_line(store, 100);
        dropped.status = LineStatus::Cancelled;
        order.add_line(dropped);

        let amounts = completion_amounts(&order);
        assert_eq!(amounts.len(), 1);
        assert_eq!(amounts[0].supply_amount, 30_000);
    }

    async fn seeded_record(ledger: &MemoryLedger) -> Uuid {
        let mut record = SettlementRecord::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            SettlementMonth::new(2025, 3),
            SettlementDirection::Cost,
        );
        record.append_line(SettlementLine::new(Uuid::new_v4(), 10_000, 1_000));
        let mut tx = ledger.begin().await.unwrap();
        tx.insert_settlement_record(&record).await.unwrap();
        tx.commit().await.unwrap();
        record.id
    }

    #[tokio::test]
    async fn test_confirm_then_pay() {
        let ledger = MemoryLedger::new();
        let record_id = seeded_record(&ledger).await;
        let service = SettlementService::new(Arc::new(ledger));

        let confirmed = service.confirm(record_id, "finance").await.unwrap();
        assert_eq!(confirmed.status, SettlementStatus::Confirmed);

        let paid = service.mark_paid(record_id, "finance").await.unwrap();
        assert_eq!(paid.status, SettlementStatus::Paid);
    }

    #[tokio::test]
    async fn test_pay_requires_confirmed() {
        let ledger = MemoryLedger::new();
        let record_id = seeded_record(&ledger).await;
        let service = SettlementService::new(Arc::new(ledger));

        let err = service.mark_paid(record_id, "finance").await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_confirm_unknown_record_is_not_found() {
        let service = SettlementService::new(Arc::new(MemoryLedger::new()));
        let err = service.confirm(Uuid::new_v4(), "finance").await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }
}
