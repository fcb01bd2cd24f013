use std::sync::Arc;

use rankpilot_core::measurement::MeasurementFeed;
use rankpilot_core::retry::with_tx_retry;
use rankpilot_core::{CoreError, CoreResult};
use rankpilot_order::LedgerStore;
use rankpilot_shared::money::round_amount;
use rankpilot_shared::SettlementMonth;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calculator::calculate_line;

/// Totals for one monthly settlement batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub month: SettlementMonth,
    pub total_items: usize,
    pub processed_items: usize,
    pub total_original_amount: i64,
    pub total_deduction: i64,
    pub total_billable_amount: i64,
}

/// Monthly performance-adjustment batch.
///
/// Selects completed ranking-guarantee lines whose term ended in the target
/// month, prices each against the measurement feed and writes the outcome
/// back onto the line. Gross settlement records from completion are never
/// re-opened; downstream reconciliation applies `refund_per_day ×
/// failed_days` as a credit. Externally triggered.
pub struct BillingBatchService {
    ledger: Arc<dyn LedgerStore>,
    feed: Arc<dyn MeasurementFeed>,
    max_tx_attempts: u32,
}

impl BillingBatchService {
    pub fn new(ledger: Arc<dyn LedgerStore>, feed: Arc<dyn MeasurementFeed>) -> Self {
        Self {
            ledger,
            feed,
            max_tx_attempts: 3,
        }
    }

    /// Run the batch for the given month, defaulting to the previous
    /// calendar month. Lines that fail to price are logged and skipped;
    /// the run itself keeps going.
    pub async fn run(&self, month: Option<SettlementMonth>) -> CoreResult<BatchSummary> {
        let month = month.unwrap_or_else(|| SettlementMonth::current().previous());

        let mut tx = self.ledger.begin().await?;
        let lines = tx.completed_guarantee_lines(month).await?;
        drop(tx);

        let mut summary = BatchSummary {
            month,
            total_items: lines.len(),
            processed_items: 0,
            total_original_amount: 0,
            total_deduction: 0,
            total_billable_amount: 0,
        };

        for (order_id, line) in lines {
            let samples = match self
                .feed
                .daily_ranks(line.store_id, &line.keyword, line.start_date, line.end_date)
                .await
            {
                Ok(samples) => samples,
                Err(err) => {
                    tracing::error!(line_id = %line.id, "measurement feed failed: {}", err);
                    continue;
                }
            };
            let result = match calculate_line(&line, &samples) {
                Ok(result) => result,
                Err(err) => {
                    tracing::error!(line_id = %line.id, "billing calculation failed: {}", err);
                    continue;
                }
            };

            let refund_per_day = round_amount(line.amount as f64 / result.total_days as f64);
            with_tx_retry(self.max_tx_attempts, || {
                self.persist_outcome(
                    order_id,
                    line.id,
                    result.achieved_days,
                    result.failed_days,
                    refund_per_day,
                )
            })
            .await?;

            summary.processed_items += 1;
            summary.total_original_amount += line.amount;
            summary.total_deduction += result.deduction_amount;
            summary.total_billable_amount += result.billable_amount;
        }

        tracing::info!(
            month = %summary.month,
            total = summary.total_items,
            processed = summary.processed_items,
            "monthly settlement batch finished"
        );
        Ok(summary)
    }

    async fn persist_outcome(
        &self,
        order_id: Uuid,
        line_id: Uuid,
        achieved_days: i64,
        failed_days: i64,
        refund_per_day: i64,
    ) -> CoreResult<()> {
        let mut tx = self.ledger.begin().await?;
        let mut order = tx
            .supplier_order(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("supplier order", order_id))?;
        let line = order
            .lines
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or_else(|| CoreError::not_found("supplier order line", line_id))?;
        line.achieved_days = Some(achieved_days);
        line.failed_days = Some(failed_days);
        line.refund_per_day = Some(refund_per_day);
        tx.put_supplier_order(&order).await?;
        tx.commit().await?;
        Ok(())
    }
}
