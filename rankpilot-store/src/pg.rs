use async_trait::async_trait;
use chrono::NaiveDate;
use rankpilot_channel::Channel;
use rankpilot_core::{CoreError, CoreResult};
use rankpilot_order::{
    AuditEntry, CustomerOrder, CustomerOrderStatus, FulfillmentStatement, LedgerStore, LedgerTx,
    ProposalStatus, RenewalProposal, SettlementDirection, SettlementRecord, SettlementStatus,
    StatementStatus, SupplierOrder, SupplierOrderLine, SupplierOrderStatus,
};
use rankpilot_shared::SettlementMonth;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Postgres-backed ledger. Entities live as JSONB documents with the
/// columns the queries filter on extracted beside them; the document is
/// the source of truth and the columns must be rewritten on every put.
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedger {
    async fn begin(&self) -> CoreResult<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await.map_err(map_sqlx)?;
        Ok(Box::new(PgLedgerTx { tx }))
    }
}

pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

pub(crate) fn map_sqlx(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &err {
        // 40001 serialization_failure, 40P01 deadlock_detected
        if let Some(code) = db.code() {
            if code == "40001" || code == "40P01" {
                return CoreError::ledger_retryable(err.to_string());
            }
        }
    }
    CoreError::ledger(err.to_string())
}

fn to_doc<T: Serialize>(value: &T) -> CoreResult<Value> {
    serde_json::to_value(value).map_err(|err| CoreError::ledger(err.to_string()))
}

fn from_doc<T: DeserializeOwned>(doc: Value) -> CoreResult<T> {
    serde_json::from_value(doc).map_err(|err| CoreError::ledger(err.to_string()))
}

/// Wire form of a status enum, e.g. `IN_PROGRESS`.
fn status_str<T: Serialize>(status: &T) -> CoreResult<String> {
    match serde_json::to_value(status) {
        Ok(Value::String(s)) => Ok(s),
        Ok(other) => Err(CoreError::ledger(format!(
            "status did not serialize to a string: {}",
            other
        ))),
        Err(err) => Err(CoreError::ledger(err.to_string())),
    }
}

fn term_end(order: &SupplierOrder) -> Option<NaiveDate> {
    order.lines.iter().map(|l| l.end_date).max()
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn next_sequence(&mut self, key: &str) -> CoreResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO sequences (key, value) VALUES ($1, 1)
             ON CONFLICT (key) DO UPDATE SET value = sequences.value + 1
             RETURNING value",
        )
        .bind(key)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)
    }

    async fn channel(&mut self, id: Uuid) -> CoreResult<Option<Channel>> {
        let doc = sqlx::query_scalar::<_, Value>("SELECT doc FROM channels WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        doc.map(from_doc).transpose()
    }

    async fn active_channels(&mut self) -> CoreResult<Vec<Channel>> {
        let docs = sqlx::query_scalar::<_, Value>(
            "SELECT doc FROM channels WHERE active ORDER BY created_at",
        )
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        docs.into_iter().map(from_doc).collect()
    }

    async fn insert_channel(&mut self, channel: &Channel) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO channels (id, name, active, doc, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(channel.id)
        .bind(&channel.name)
        .bind(channel.active)
        .bind(to_doc(channel)?)
        .bind(channel.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn channel_committed(
        &mut self,
        channel_id: Uuid,
        month: SettlementMonth,
    ) -> CoreResult<i64> {
        let qty = sqlx::query_scalar::<_, i64>(
            "SELECT qty FROM channel_commitments WHERE channel_id = $1 AND month = $2",
        )
        .bind(channel_id)
        .bind(month.to_string())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(qty.unwrap_or(0))
    }

    async fn add_channel_commitment(
        &mut self,
        channel_id: Uuid,
        month: SettlementMonth,
        qty: i64,
    ) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO channel_commitments (channel_id, month, qty) VALUES ($1, $2, $3)
             ON CONFLICT (channel_id, month)
             DO UPDATE SET qty = channel_commitments.qty + EXCLUDED.qty",
        )
        .bind(channel_id)
        .bind(month.to_string())
        .bind(qty)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn customer_order(&mut self, id: Uuid) -> CoreResult<Option<CustomerOrder>> {
        let doc = sqlx::query_scalar::<_, Value>("SELECT doc FROM customer_orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        doc.map(from_doc).transpose()
    }

    async fn insert_customer_order(&mut self, order: &CustomerOrder) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO customer_orders (id, status, doc, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(order.id)
        .bind(status_str(&order.status)?)
        .bind(to_doc(order)?)
        .bind(order.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn put_customer_order(&mut self, order: &CustomerOrder) -> CoreResult<()> {
        sqlx::query("UPDATE customer_orders SET status = $2, doc = $3 WHERE id = $1")
            .bind(order.id)
            .bind(status_str(&order.status)?)
            .bind(to_doc(order)?)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn update_customer_order_status(
        &mut self,
        id: Uuid,
        expected: CustomerOrderStatus,
        next: CustomerOrderStatus,
    ) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE customer_orders
             SET status = $3,
                 doc = jsonb_set(jsonb_set(doc, '{status}', to_jsonb($3::text)),
                                 '{updated_at}', to_jsonb(NOW()))
             WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(status_str(&expected)?)
        .bind(status_str(&next)?)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn supplier_order(&mut self, id: Uuid) -> CoreResult<Option<SupplierOrder>> {
        let doc = sqlx::query_scalar::<_, Value>("SELECT doc FROM supplier_orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        doc.map(from_doc).transpose()
    }

    async fn supplier_orders_for_customer(
        &mut self,
        customer_order_id: Uuid,
    ) -> CoreResult<Vec<SupplierOrder>> {
        let docs = sqlx::query_scalar::<_, Value>(
            "SELECT doc FROM supplier_orders WHERE customer_order_id = $1 ORDER BY created_at",
        )
        .bind(customer_order_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        docs.into_iter().map(from_doc).collect()
    }

    async fn insert_supplier_order(&mut self, order: &SupplierOrder) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO supplier_orders
                 (id, customer_order_id, status, settlement_month, term_end, doc, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(order.id)
        .bind(order.customer_order_id)
        .bind(status_str(&order.status)?)
        .bind(order.settlement_month().map(|m| m.to_string()))
        .bind(term_end(order))
        .bind(to_doc(order)?)
        .bind(order.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn put_supplier_order(&mut self, order: &SupplierOrder) -> CoreResult<()> {
        sqlx::query(
            "UPDATE supplier_orders
             SET status = $2, settlement_month = $3, term_end = $4, doc = $5
             WHERE id = $1",
        )
        .bind(order.id)
        .bind(status_str(&order.status)?)
        .bind(order.settlement_month().map(|m| m.to_string()))
        .bind(term_end(order))
        .bind(to_doc(order)?)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn update_supplier_order_status(
        &mut self,
        id: Uuid,
        expected: SupplierOrderStatus,
        next: SupplierOrderStatus,
    ) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE supplier_orders
             SET status = $3,
                 doc = jsonb_set(jsonb_set(doc, '{status}', to_jsonb($3::text)),
                                 '{updated_at}', to_jsonb(NOW()))
             WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(status_str(&expected)?)
        .bind(status_str(&next)?)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn supplier_line(
        &mut self,
        line_id: Uuid,
    ) -> CoreResult<Option<(SupplierOrder, SupplierOrderLine)>> {
        let doc = sqlx::query_scalar::<_, Value>(
            "SELECT doc FROM supplier_orders WHERE doc->'lines' @> $1",
        )
        .bind(serde_json::json!([{ "id": line_id }]))
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        let Some(doc) = doc else {
            return Ok(None);
        };
        let order: SupplierOrder = from_doc(doc)?;
        let line = order.lines.iter().find(|l| l.id == line_id).cloned();
        Ok(line.map(|line| (order, line)))
    }

    async fn completed_guarantee_lines(
        &mut self,
        month: SettlementMonth,
    ) -> CoreResult<Vec<(Uuid, SupplierOrderLine)>> {
        let docs = sqlx::query_scalar::<_, Value>(
            "SELECT doc FROM supplier_orders
             WHERE status = $1 AND settlement_month = $2
             ORDER BY created_at",
        )
        .bind(status_str(&SupplierOrderStatus::Completed)?)
        .bind(month.to_string())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        let mut result = Vec::new();
        for doc in docs {
            let order: SupplierOrder = from_doc(doc)?;
            for line in &order.lines {
                if line.goal_type == rankpilot_order::GoalType::RankingGuarantee
                    && month.contains(line.end_date)
                {
                    result.push((order.id, line.clone()));
                }
            }
        }
        result.sort_by_key(|(_, line)| line.id);
        Ok(result)
    }

    async fn supplier_orders_ending_by(
        &mut self,
        cutoff: NaiveDate,
    ) -> CoreResult<Vec<SupplierOrder>> {
        let docs = sqlx::query_scalar::<_, Value>(
            "SELECT doc FROM supplier_orders
             WHERE status = $1 AND term_end IS NOT NULL AND term_end <= $2
             ORDER BY created_at",
        )
        .bind(status_str(&SupplierOrderStatus::InProgress)?)
        .bind(cutoff)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        docs.into_iter().map(from_doc).collect()
    }

    async fn statement(&mut self, id: Uuid) -> CoreResult<Option<FulfillmentStatement>> {
        let doc = sqlx::query_scalar::<_, Value>("SELECT doc FROM statements WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        doc.map(from_doc).transpose()
    }

    async fn statements_for_supplier_order(
        &mut self,
        supplier_order_id: Uuid,
    ) -> CoreResult<Vec<FulfillmentStatement>> {
        let docs = sqlx::query_scalar::<_, Value>(
            "SELECT doc FROM statements WHERE supplier_order_id = $1 ORDER BY created_at",
        )
        .bind(supplier_order_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        docs.into_iter().map(from_doc).collect()
    }

    async fn insert_statement(&mut self, statement: &FulfillmentStatement) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO statements (id, supplier_order_id, status, doc, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(statement.id)
        .bind(statement.supplier_order_id)
        .bind(status_str(&statement.status)?)
        .bind(to_doc(statement)?)
        .bind(statement.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn put_statement(&mut self, statement: &FulfillmentStatement) -> CoreResult<()> {
        sqlx::query("UPDATE statements SET status = $2, doc = $3 WHERE id = $1")
            .bind(statement.id)
            .bind(status_str(&statement.status)?)
            .bind(to_doc(statement)?)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn delete_statement(&mut self, id: Uuid) -> CoreResult<()> {
        sqlx::query("DELETE FROM statements WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn update_statement_status(
        &mut self,
        id: Uuid,
        expected: StatementStatus,
        next: StatementStatus,
    ) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE statements
             SET status = $3,
                 doc = jsonb_set(jsonb_set(doc, '{status}', to_jsonb($3::text)),
                                 '{updated_at}', to_jsonb(NOW()))
             WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(status_str(&expected)?)
        .bind(status_str(&next)?)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn statement_is_settled(&mut self, id: Uuid) -> CoreResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM settlement_records WHERE doc->'lines' @> $1)",
        )
        .bind(serde_json::json!([{ "statement_id": id }]))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_sqlx)
    }

    async fn settlement_record(&mut self, id: Uuid) -> CoreResult<Option<SettlementRecord>> {
        let doc = sqlx::query_scalar::<_, Value>("SELECT doc FROM settlement_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        doc.map(from_doc).transpose()
    }

    async fn find_settlement_record(
        &mut self,
        store_id: Uuid,
        channel_id: Uuid,
        month: SettlementMonth,
        direction: SettlementDirection,
    ) -> CoreResult<Option<SettlementRecord>> {
        let doc = sqlx::query_scalar::<_, Value>(
            "SELECT doc FROM settlement_records
             WHERE store_id = $1 AND channel_id = $2 AND month = $3 AND direction = $4",
        )
        .bind(store_id)
        .bind(channel_id)
        .bind(month.to_string())
        .bind(status_str(&direction)?)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        doc.map(from_doc).transpose()
    }

    async fn insert_settlement_record(&mut self, record: &SettlementRecord) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO settlement_records
                 (id, store_id, channel_id, month, direction, status, doc, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record.id)
        .bind(record.store_id)
        .bind(record.channel_id)
        .bind(record.settlement_month.to_string())
        .bind(status_str(&record.direction)?)
        .bind(status_str(&record.status)?)
        .bind(to_doc(record)?)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn put_settlement_record(&mut self, record: &SettlementRecord) -> CoreResult<()> {
        sqlx::query("UPDATE settlement_records SET status = $2, doc = $3 WHERE id = $1")
            .bind(record.id)
            .bind(status_str(&record.status)?)
            .bind(to_doc(record)?)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn update_settlement_status(
        &mut self,
        id: Uuid,
        expected: SettlementStatus,
        next: SettlementStatus,
    ) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE settlement_records
             SET status = $3,
                 doc = jsonb_set(jsonb_set(doc, '{status}', to_jsonb($3::text)),
                                 '{updated_at}', to_jsonb(NOW()))
             WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(status_str(&expected)?)
        .bind(status_str(&next)?)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn proposal(&mut self, id: Uuid) -> CoreResult<Option<RenewalProposal>> {
        let doc = sqlx::query_scalar::<_, Value>("SELECT doc FROM renewal_proposals WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        doc.map(from_doc).transpose()
    }

    async fn pending_proposal_for(
        &mut self,
        supplier_order_id: Uuid,
    ) -> CoreResult<Option<RenewalProposal>> {
        let doc = sqlx::query_scalar::<_, Value>(
            "SELECT doc FROM renewal_proposals
             WHERE supplier_order_id = $1 AND status = $2
             ORDER BY created_at LIMIT 1",
        )
        .bind(supplier_order_id)
        .bind(status_str(&ProposalStatus::Pending)?)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        doc.map(from_doc).transpose()
    }

    async fn insert_proposal(&mut self, proposal: &RenewalProposal) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO renewal_proposals (id, supplier_order_id, status, doc, created_at)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(proposal.id)
        .bind(proposal.supplier_order_id)
        .bind(status_str(&proposal.status)?)
        .bind(to_doc(proposal)?)
        .bind(proposal.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn put_proposal(&mut self, proposal: &RenewalProposal) -> CoreResult<()> {
        sqlx::query("UPDATE renewal_proposals SET status = $2, doc = $3 WHERE id = $1")
            .bind(proposal.id)
            .bind(status_str(&proposal.status)?)
            .bind(to_doc(proposal)?)
            .execute(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }

    async fn update_proposal_status(
        &mut self,
        id: Uuid,
        expected: ProposalStatus,
        next: ProposalStatus,
    ) -> CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE renewal_proposals
             SET status = $3,
                 doc = jsonb_set(jsonb_set(doc, '{status}', to_jsonb($3::text)),
                                 '{decided_at}', to_jsonb(NOW()))
             WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(status_str(&expected)?)
        .bind(status_str(&next)?)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO audit_log (id, entity_id, change_type, detail, actor, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.id)
        .bind(entry.entity_id)
        .bind(&entry.change_type)
        .bind(&entry.detail)
        .bind(&entry.actor)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        self.tx.commit().await.map_err(map_sqlx)
    }
}
