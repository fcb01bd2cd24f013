use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rankpilot_core::retry::with_tx_retry;
use rankpilot_core::{CoreError, CoreResult};
use rankpilot_shared::money::{tax_for, DEFAULT_TAX_RATE};
use rankpilot_shared::order_no::{format_number, sequence_key, STATEMENT_PREFIX};
use rankpilot_shared::SettlementMonth;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::{LedgerStore, LedgerTx};
use crate::models::{
    AuditEntry, FulfillmentStatement, SettlementDirection, SettlementLine, SettlementRecord,
    StatementLine, StatementStatus,
};

/// Claimed work for one supplier order line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementLineInput {
    pub supplier_order_line_id: Uuid,
    pub completed_qty: i64,
    pub amount: i64,
}

/// Manages fulfillment statements and their settlement linkage.
///
/// Confirming a statement is the only path that appends SettlementLines;
/// the conditional Draft → Confirmed flip guarantees it happens once.
pub struct StatementService {
    ledger: Arc<dyn LedgerStore>,
    tax_rate: f64,
    max_tx_attempts: u32,
}

impl StatementService {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self {
            ledger,
            tax_rate: DEFAULT_TAX_RATE,
            max_tx_attempts: 3,
        }
    }

    pub fn with_tax_rate(mut self, tax_rate: f64) -> Self {
        self.tax_rate = tax_rate;
        self
    }

    /// Create a Draft statement with a fresh `FS{date}-{seq}` number.
    pub async fn create_statement(
        &self,
        supplier_order_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
        lines: Vec<StatementLineInput>,
        actor: &str,
    ) -> CoreResult<FulfillmentStatement> {
        if period_end < period_start {
            return Err(CoreError::Validation(
                "statement period ends before it starts".into(),
            ));
        }
        for line in &lines {
            if line.completed_qty <= 0 {
                return Err(CoreError::Validation(
                    "completed_qty must be positive".into(),
                ));
            }
            if line.amount < 0 {
                return Err(CoreError::Validation(
                    "statement line amount must not be negative".into(),
                ));
            }
        }

        with_tx_retry(self.max_tx_attempts, || {
            self.try_create_statement(supplier_order_id, period_start, period_end, lines.clone(), actor)
        })
        .await
    }

    async fn try_create_statement(
        &self,
        supplier_order_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
        lines: Vec<StatementLineInput>,
        actor: &str,
    ) -> CoreResult<FulfillmentStatement> {
        let mut tx = self.ledger.begin().await?;

        let order = tx
            .supplier_order(supplier_order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("supplier order", supplier_order_id))?;

        let today = Utc::now().date_naive();
        let seq = tx
            .next_sequence(&sequence_key(STATEMENT_PREFIX, today))
            .await?;
        let mut statement = FulfillmentStatement::new(
            format_number(STATEMENT_PREFIX, today, seq),
            supplier_order_id,
            period_start,
            period_end,
        );
        for input in lines {
            let order_line = order
                .lines
                .iter()
                .find(|l| l.id == input.supplier_order_line_id)
                .ok_or_else(|| {
                    CoreError::Validation(format!(
                        "line {} does not belong to supplier order {}",
                        input.supplier_order_line_id, order.order_no
                    ))
                })?;
            statement.lines.push(StatementLine::new(
                input.supplier_order_line_id,
                order_line.store_id,
                input.completed_qty,
                input.amount,
            ));
        }

        tx.insert_statement(&statement).await?;
        tx.append_audit(&AuditEntry::new(
            statement.id,
            "STATEMENT_CREATED",
            serde_json::json!({
                "statement_no": statement.statement_no,
                "supplier_order_no": order.order_no,
                "amount": statement.total_amount(),
            }),
            actor,
        ))
        .await?;
        tx.commit().await?;

        tracing::info!(statement_no = %statement.statement_no, "statement created");
        Ok(statement)
    }

    /// Replace a Draft statement's lines. Blocked once any settlement line
    /// references the statement.
    pub async fn update_statement(
        &self,
        statement_id: Uuid,
        lines: Vec<StatementLineInput>,
        actor: &str,
    ) -> CoreResult<FulfillmentStatement> {
        with_tx_retry(self.max_tx_attempts, || {
            self.try_update_statement(statement_id, lines.clone(), actor)
        })
        .await
    }

    async fn try_update_statement(
        &self,
        statement_id: Uuid,
        lines: Vec<StatementLineInput>,
        actor: &str,
    ) -> CoreResult<FulfillmentStatement> {
        let mut tx = self.ledger.begin().await?;

        let mut statement = tx
            .statement(statement_id)
            .await?
            .ok_or_else(|| CoreError::not_found("statement", statement_id))?;
        self.guard_mutable(tx.as_mut(), &statement).await?;

        let order = tx
            .supplier_order(statement.supplier_order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("supplier order", statement.supplier_order_id))?;

        statement.lines.clear();
        for input in lines {
            let order_line = order
                .lines
                .iter()
                .find(|l| l.id == input.supplier_order_line_id)
                .ok_or_else(|| {
                    CoreError::Validation(format!(
                        "line {} does not belong to supplier order {}",
                        input.supplier_order_line_id, order.order_no
                    ))
                })?;
            statement.lines.push(StatementLine::new(
                input.supplier_order_line_id,
                order_line.store_id,
                input.completed_qty,
                input.amount,
            ));
        }
        statement.updated_at = Utc::now();
        tx.put_statement(&statement).await?;

        tx.append_audit(&AuditEntry::new(
            statement.id,
            "STATEMENT_UPDATED",
            serde_json::json!({
                "statement_no": statement.statement_no,
                "amount": statement.total_amount(),
            }),
            actor,
        ))
        .await?;
        tx.commit().await?;
        Ok(statement)
    }

    /// Delete a Draft statement. Blocked once any settlement line
    /// references the statement.
    pub async fn delete_statement(&self, statement_id: Uuid, actor: &str) -> CoreResult<()> {
        with_tx_retry(self.max_tx_attempts, || {
            self.try_delete_statement(statement_id, actor)
        })
        .await
    }

    async fn try_delete_statement(&self, statement_id: Uuid, actor: &str) -> CoreResult<()> {
        let mut tx = self.ledger.begin().await?;

        let statement = tx
            .statement(statement_id)
            .await?
            .ok_or_else(|| CoreError::not_found("statement", statement_id))?;
        self.guard_mutable(tx.as_mut(), &statement).await?;

        tx.delete_statement(statement_id).await?;
        tx.append_audit(&AuditEntry::new(
            statement_id,
            "STATEMENT_DELETED",
            serde_json::json!({ "statement_no": statement.statement_no }),
            actor,
        ))
        .await?;
        tx.commit().await?;

        tracing::info!(statement_no = %statement.statement_no, "statement deleted");
        Ok(())
    }

    /// Confirm a statement and append its amounts to the monthly cost
    /// ledger.
    ///
    /// For every line the (store, channel, month-of-period-end, Cost)
    /// record is resolved or created, one SettlementLine appended and the
    /// record amount recomputed. Returns the statement and the number of
    /// settlement lines created.
    pub async fn confirm_statement(
        &self,
        statement_id: Uuid,
        actor: &str,
    ) -> CoreResult<(FulfillmentStatement, usize)> {
        with_tx_retry(self.max_tx_attempts, || {
            self.try_confirm_statement(statement_id, actor)
        })
        .await
    }

    async fn try_confirm_statement(
        &self,
        statement_id: Uuid,
        actor: &str,
    ) -> CoreResult<(FulfillmentStatement, usize)> {
        let mut tx = self.ledger.begin().await?;

        // 1. Guards: statement exists and carries at least one line.
        let statement = tx
            .statement(statement_id)
            .await?
            .ok_or_else(|| CoreError::not_found("statement", statement_id))?;
        if statement.lines.is_empty() {
            return Err(CoreError::EmptyStatement(statement.statement_no.clone()));
        }

        // 2. Conditional flip closes the double-confirm race.
        let applied = tx
            .update_statement_status(
                statement_id,
                StatementStatus::Draft,
                StatementStatus::Confirmed,
            )
            .await?;
        if !applied {
            return Err(CoreError::AlreadyProcessed(format!(
                "statement {} is not draft",
                statement.statement_no
            )));
        }

        let mut statement = tx
            .statement(statement_id)
            .await?
            .ok_or_else(|| CoreError::not_found("statement", statement_id))?;
        statement.confirmed_at = Some(Utc::now());
        tx.put_statement(&statement).await?;

        // 3. Append one settlement line per statement line.
        let order = tx
            .supplier_order(statement.supplier_order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("supplier order", statement.supplier_order_id))?;
        let month = SettlementMonth::from_date(statement.period_end);
        let mut created = 0;
        for line in &statement.lines {
            let mut record = match tx
                .find_settlement_record(
                    line.store_id,
                    order.channel_id,
                    month,
                    SettlementDirection::Cost,
                )
                .await?
            {
                Some(record) => record,
                None => {
                    let record = SettlementRecord::new(
                        line.store_id,
                        order.channel_id,
                        month,
                        SettlementDirection::Cost,
                    );
                    tx.insert_settlement_record(&record).await?;
                    record
                }
            };
            record.append_line(SettlementLine::new(
                statement.id,
                line.amount,
                tax_for(line.amount, self.tax_rate),
            ));
            tx.put_settlement_record(&record).await?;
            created += 1;
        }

        tx.append_audit(&AuditEntry::new(
            statement.id,
            "STATEMENT_CONFIRMED",
            serde_json::json!({
                "statement_no": statement.statement_no,
                "settlement_month": month.to_string(),
                "settlement_lines": created,
            }),
            actor,
        ))
        .await?;
        tx.commit().await?;

        tracing::info!(
            statement_no = %statement.statement_no,
            settlement_lines = created,
            "statement confirmed"
        );
        Ok((statement, created))
    }

    /// Transition: Confirmed → Locked. Terminal, no further linkage.
    pub async fn lock_statement(
        &self,
        statement_id: Uuid,
        actor: &str,
    ) -> CoreResult<FulfillmentStatement> {
        with_tx_retry(self.max_tx_attempts, || {
            self.try_lock_statement(statement_id, actor)
        })
        .await
    }

    async fn try_lock_statement(
        &self,
        statement_id: Uuid,
        actor: &str,
    ) -> CoreResult<FulfillmentStatement> {
        let mut tx = self.ledger.begin().await?;

        let applied = tx
            .update_statement_status(
                statement_id,
                StatementStatus::Confirmed,
                StatementStatus::Locked,
            )
            .await?;
        if !applied {
            let current = tx
                .statement(statement_id)
                .await?
                .ok_or_else(|| CoreError::not_found("statement", statement_id))?;
            return Err(CoreError::invalid_state(
                format!("{:?}", current.status),
                "Confirmed",
            ));
        }

        let statement = tx
            .statement(statement_id)
            .await?
            .ok_or_else(|| CoreError::not_found("statement", statement_id))?;
        tx.append_audit(&AuditEntry::new(
            statement_id,
            "STATEMENT_LOCKED",
            serde_json::json!({ "statement_no": statement.statement_no }),
            actor,
        ))
        .await?;
        tx.commit().await?;

        tracing::info!(statement_no = %statement.statement_no, "statement locked");
        Ok(statement)
    }

    async fn guard_mutable(
        &self,
        tx: &mut dyn LedgerTx,
        statement: &FulfillmentStatement,
    ) -> CoreResult<()> {
        if statement.status != StatementStatus::Draft {
            return Err(CoreError::invalid_state(
                format!("{:?}", statement.status),
                "Draft",
            ));
        }
        if tx.statement_is_settled(statement.id).await? {
            return Err(CoreError::conflict(
                "statement already feeds settlement records",
                vec![statement.statement_no.clone()],
            ));
        }
        Ok(())
    }
}
