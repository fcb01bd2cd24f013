use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rankpilot_channel::Channel;
use rankpilot_core::CoreResult;
use rankpilot_shared::SettlementMonth;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::ledger::{LedgerStore, LedgerTx};
use crate::models::{
    AuditEntry, CustomerOrder, CustomerOrderStatus, FulfillmentStatement, GoalType,
    ProposalStatus, RenewalProposal, SettlementDirection, SettlementRecord, SettlementStatus,
    StatementStatus, SupplierOrder, SupplierOrderLine, SupplierOrderStatus,
};

#[derive(Debug, Default, Clone)]
struct LedgerState {
    sequences: HashMap<String, i64>,
    channels: HashMap<Uuid, Channel>,
    commitments: HashMap<(Uuid, SettlementMonth), i64>,
    customer_orders: HashMap<Uuid, CustomerOrder>,
    supplier_orders: HashMap<Uuid, SupplierOrder>,
    statements: HashMap<Uuid, FulfillmentStatement>,
    settlements: HashMap<Uuid, SettlementRecord>,
    proposals: HashMap<Uuid, RenewalProposal>,
    audit: Vec<AuditEntry>,
}

/// In-memory ledger backend. Transactions take the single state lock for
/// their whole lifetime and work on a copy, so concurrent transactions
/// serialize and an uncommitted transaction leaves no trace.
#[derive(Clone)]
pub struct MemoryLedger {
    state: Arc<Mutex<LedgerState>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn begin(&self) -> CoreResult<Box<dyn LedgerTx>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryLedgerTx { guard, work }))
    }
}

struct MemoryLedgerTx {
    guard: OwnedMutexGuard<LedgerState>,
    work: LedgerState,
}

#[async_trait]
impl LedgerTx for MemoryLedgerTx {
    async fn next_sequence(&mut self, key: &str) -> CoreResult<i64> {
        let counter = self.work.sequences.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn channel(&mut self, id: Uuid) -> CoreResult<Option<Channel>> {
        Ok(self.work.channels.get(&id).cloned())
    }

    async fn active_channels(&mut self) -> CoreResult<Vec<Channel>> {
        let mut channels: Vec<Channel> = self
            .work
            .channels
            .values()
            .filter(|c| c.active)
            .cloned()
            .collect();
        channels.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(channels)
    }

    async fn insert_channel(&mut self, channel: &Channel) -> CoreResult<()> {
        self.work.channels.insert(channel.id, channel.clone());
        Ok(())
    }

    async fn channel_committed(
        &mut self,
        channel_id: Uuid,
        month: SettlementMonth,
    ) -> CoreResult<i64> {
        Ok(self
            .work
            .commitments
            .get(&(channel_id, month))
            .copied()
            .unwrap_or(0))
    }

    async fn add_channel_commitment(
        &mut self,
        channel_id: Uuid,
        month: SettlementMonth,
        qty: i64,
    ) -> CoreResult<()> {
        *self.work.commitments.entry((channel_id, month)).or_insert(0) += qty;
        Ok(())
    }

    async fn customer_order(&mut self, id: Uuid) -> CoreResult<Option<CustomerOrder>> {
        Ok(self.work.customer_orders.get(&id).cloned())
    }

    async fn insert_customer_order(&mut self, order: &CustomerOrder) -> CoreResult<()> {
        self.work.customer_orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn put_customer_order(&mut self, order: &CustomerOrder) -> CoreResult<()> {
        self.work.customer_orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_customer_order_status(
        &mut self,
        id: Uuid,
        expected: CustomerOrderStatus,
        next: CustomerOrderStatus,
    ) -> CoreResult<bool> {
        match self.work.customer_orders.get_mut(&id) {
            Some(order) if order.status == expected => {
                order.update_status(next);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn supplier_order(&mut self, id: Uuid) -> CoreResult<Option<SupplierOrder>> {
        Ok(self.work.supplier_orders.get(&id).cloned())
    }

    async fn supplier_orders_for_customer(
        &mut self,
        customer_order_id: Uuid,
    ) -> CoreResult<Vec<SupplierOrder>> {
        let mut orders: Vec<SupplierOrder> = self
            .work
            .supplier_orders
            .values()
            .filter(|o| o.customer_order_id == Some(customer_order_id))
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn insert_supplier_order(&mut self, order: &SupplierOrder) -> CoreResult<()> {
        self.work.supplier_orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn put_supplier_order(&mut self, order: &SupplierOrder) -> CoreResult<()> {
        self.work.supplier_orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn update_supplier_order_status(
        &mut self,
        id: Uuid,
        expected: SupplierOrderStatus,
        next: SupplierOrderStatus,
    ) -> CoreResult<bool> {
        match self.work.supplier_orders.get_mut(&id) {
            Some(order) if order.status == expected => {
                order.update_status(next);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn supplier_line(
        &mut self,
        line_id: Uuid,
    ) -> CoreResult<Option<(SupplierOrder, SupplierOrderLine)>> {
        for order in self.work.supplier_orders.values() {
            if let Some(line) = order.lines.iter().find(|l| l.id == line_id) {
                return Ok(Some((order.clone(), line.clone())));
            }
        }
        Ok(None)
    }

    async fn completed_guarantee_lines(
        &mut self,
        month: SettlementMonth,
    ) -> CoreResult<Vec<(Uuid, SupplierOrderLine)>> {
        let mut lines = Vec::new();
        for order in self.work.supplier_orders.values() {
            if order.status != SupplierOrderStatus::Completed {
                continue;
            }
            for line in &order.lines {
                if line.goal_type == GoalType::RankingGuarantee && month.contains(line.end_date) {
                    lines.push((order.id, line.clone()));
                }
            }
        }
        lines.sort_by_key(|(_, l)| l.id);
        Ok(lines)
    }

    async fn supplier_orders_ending_by(
        &mut self,
        cutoff: NaiveDate,
    ) -> CoreResult<Vec<SupplierOrder>> {
        let mut orders: Vec<SupplierOrder> = self
            .work
            .supplier_orders
            .values()
            .filter(|o| o.status == SupplierOrderStatus::InProgress)
            .filter(|o| {
                o.lines
                    .iter()
                    .map(|l| l.end_date)
                    .max()
                    .is_some_and(|end| end <= cutoff)
            })
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn statement(&mut self, id: Uuid) -> CoreResult<Option<FulfillmentStatement>> {
        Ok(self.work.statements.get(&id).cloned())
    }

    async fn statements_for_supplier_order(
        &mut self,
        supplier_order_id: Uuid,
    ) -> CoreResult<Vec<FulfillmentStatement>> {
        let mut statements: Vec<FulfillmentStatement> = self
            .work
            .statements
            .values()
            .filter(|s| s.supplier_order_id == supplier_order_id)
            .cloned()
            .collect();
        statements.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(statements)
    }

    async fn insert_statement(&mut self, statement: &FulfillmentStatement) -> CoreResult<()> {
        self.work.statements.insert(statement.id, statement.clone());
        Ok(())
    }

    async fn put_statement(&mut self, statement: &FulfillmentStatement) -> CoreResult<()> {
        self.work.statements.insert(statement.id, statement.clone());
        Ok(())
    }

    async fn delete_statement(&mut self, id: Uuid) -> CoreResult<()> {
        self.work.statements.remove(&id);
        Ok(())
    }

    async fn update_statement_status(
        &mut self,
        id: Uuid,
        expected: StatementStatus,
        next: StatementStatus,
    ) -> CoreResult<bool> {
        match self.work.statements.get_mut(&id) {
            Some(statement) if statement.status == expected => {
                statement.update_status(next);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn statement_is_settled(&mut self, id: Uuid) -> CoreResult<bool> {
        Ok(self
            .work
            .settlements
            .values()
            .any(|r| r.lines.iter().any(|l| l.statement_id == id)))
    }

    async fn settlement_record(&mut self, id: Uuid) -> CoreResult<Option<SettlementRecord>> {
        Ok(self.work.settlements.get(&id).cloned())
    }

    async fn find_settlement_record(
        &mut self,
        store_id: Uuid,
        channel_id: Uuid,
        month: SettlementMonth,
        direction: SettlementDirection,
    ) -> CoreResult<Option<SettlementRecord>> {
        Ok(self
            .work
            .settlements
            .values()
            .find(|r| {
                r.store_id == store_id
                    && r.channel_id == channel_id
                    && r.settlement_month == month
                    && r.direction == direction
            })
            .cloned())
    }

    async fn insert_settlement_record(&mut self, record: &SettlementRecord) -> CoreResult<()> {
        self.work.settlements.insert(record.id, record.clone());
        Ok(())
    }

    async fn put_settlement_record(&mut self, record: &SettlementRecord) -> CoreResult<()> {
        self.work.settlements.insert(record.id, record.clone());
        Ok(())
    }

    async fn update_settlement_status(
        &mut self,
        id: Uuid,
        expected: SettlementStatus,
        next: SettlementStatus,
    ) -> CoreResult<bool> {
        match self.work.settlements.get_mut(&id) {
            Some(record) if record.status == expected => {
                record.update_status(next);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn proposal(&mut self, id: Uuid) -> CoreResult<Option<RenewalProposal>> {
        Ok(self.work.proposals.get(&id).cloned())
    }

    async fn pending_proposal_for(
        &mut self,
        supplier_order_id: Uuid,
    ) -> CoreResult<Option<RenewalProposal>> {
        Ok(self
            .work
            .proposals
            .values()
            .find(|p| {
                p.supplier_order_id == supplier_order_id && p.status == ProposalStatus::Pending
            })
            .cloned())
    }

    async fn insert_proposal(&mut self, proposal: &RenewalProposal) -> CoreResult<()> {
        self.work.proposals.insert(proposal.id, proposal.clone());
        Ok(())
    }

    async fn put_proposal(&mut self, proposal: &RenewalProposal) -> CoreResult<()> {
        self.work.proposals.insert(proposal.id, proposal.clone());
        Ok(())
    }

    async fn update_proposal_status(
        &mut self,
        id: Uuid,
        expected: ProposalStatus,
        next: ProposalStatus,
    ) -> CoreResult<bool> {
        match self.work.proposals.get_mut(&id) {
            Some(proposal) if proposal.status == expected => {
                proposal.status = next;
                proposal.decided_at = Some(chrono::Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> CoreResult<()> {
        self.work.audit.push(entry.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> CoreResult<()> {
        *self.guard = self.work;
        Ok(())
    }
}
