use async_trait::async_trait;
use chrono::NaiveDate;
use rankpilot_channel::Channel;
use rankpilot_core::CoreResult;
use rankpilot_shared::SettlementMonth;
use uuid::Uuid;

use crate::models::{
    AuditEntry, CustomerOrder, CustomerOrderStatus, FulfillmentStatement, RenewalProposal,
    ProposalStatus, SettlementDirection, SettlementRecord, SettlementStatus, StatementStatus,
    SupplierOrder, SupplierOrderLine, SupplierOrderStatus,
};

/// Handle to the persistent ledger. All mutation happens inside a
/// transaction obtained from `begin`.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> CoreResult<Box<dyn LedgerTx>>;
}

/// One unit of atomic work against the ledger. Dropping a transaction
/// without calling `commit` rolls it back.
///
/// The `update_*_status` methods are conditional writes: they only apply
/// when the stored status still matches `expected`, and report whether a
/// row changed. A `false` return means another writer got there first.
#[async_trait]
pub trait LedgerTx: Send {
    // --- sequences ---

    /// Next value of a named counter, starting at 1.
    async fn next_sequence(&mut self, key: &str) -> CoreResult<i64>;

    // --- channels ---

    async fn channel(&mut self, id: Uuid) -> CoreResult<Option<Channel>>;
    async fn active_channels(&mut self) -> CoreResult<Vec<Channel>>;
    async fn insert_channel(&mut self, channel: &Channel) -> CoreResult<()>;
    async fn channel_committed(
        &mut self,
        channel_id: Uuid,
        month: SettlementMonth,
    ) -> CoreResult<i64>;
    async fn add_channel_commitment(
        &mut self,
        channel_id: Uuid,
        month: SettlementMonth,
        qty: i64,
    ) -> CoreResult<()>;

    // --- customer orders ---

    async fn customer_order(&mut self, id: Uuid) -> CoreResult<Option<CustomerOrder>>;
    async fn insert_customer_order(&mut self, order: &CustomerOrder) -> CoreResult<()>;
    async fn put_customer_order(&mut self, order: &CustomerOrder) -> CoreResult<()>;
    async fn update_customer_order_status(
        &mut self,
        id: Uuid,
        expected: CustomerOrderStatus,
        next: CustomerOrderStatus,
    ) -> CoreResult<bool>;

    // --- supplier orders ---

    async fn supplier_order(&mut self, id: Uuid) -> CoreResult<Option<SupplierOrder>>;
    async fn supplier_orders_for_customer(
        &mut self,
        customer_order_id: Uuid,
    ) -> CoreResult<Vec<SupplierOrder>>;
    async fn insert_supplier_order(&mut self, order: &SupplierOrder) -> CoreResult<()>;
    async fn put_supplier_order(&mut self, order: &SupplierOrder) -> CoreResult<()>;
    async fn update_supplier_order_status(
        &mut self,
        id: Uuid,
        expected: SupplierOrderStatus,
        next: SupplierOrderStatus,
    ) -> CoreResult<bool>;
    /// Look a line up together with its owning order.
    async fn supplier_line(
        &mut self,
        line_id: Uuid,
    ) -> CoreResult<Option<(SupplierOrder, SupplierOrderLine)>>;
    /// Ranking-guarantee lines on completed orders whose term ended in
    /// the given month. Input to the monthly billing batch.
    async fn completed_guarantee_lines(
        &mut self,
        month: SettlementMonth,
    ) -> CoreResult<Vec<(Uuid, SupplierOrderLine)>>;
    /// In-progress orders whose latest line end date falls on or before
    /// the cutoff.
    async fn supplier_orders_ending_by(
        &mut self,
        cutoff: NaiveDate,
    ) -> CoreResult<Vec<SupplierOrder>>;

    // --- fulfillment statements ---

    async fn statement(&mut self, id: Uuid) -> CoreResult<Option<FulfillmentStatement>>;
    async fn statements_for_supplier_order(
        &mut self,
        supplier_order_id: Uuid,
    ) -> CoreResult<Vec<FulfillmentStatement>>;
    async fn insert_statement(&mut self, statement: &FulfillmentStatement) -> CoreResult<()>;
    async fn put_statement(&mut self, statement: &FulfillmentStatement) -> CoreResult<()>;
    async fn delete_statement(&mut self, id: Uuid) -> CoreResult<()>;
    async fn update_statement_status(
        &mut self,
        id: Uuid,
        expected: StatementStatus,
        next: StatementStatus,
    ) -> CoreResult<bool>;
    /// Whether any settlement record already carries a line for this
    /// statement.
    async fn statement_is_settled(&mut self, id: Uuid) -> CoreResult<bool>;

    // --- settlement records ---

    async fn settlement_record(&mut self, id: Uuid) -> CoreResult<Option<SettlementRecord>>;
    async fn find_settlement_record(
        &mut self,
        store_id: Uuid,
        channel_id: Uuid,
        month: SettlementMonth,
        direction: SettlementDirection,
    ) -> CoreResult<Option<SettlementRecord>>;
    async fn insert_settlement_record(&mut self, record: &SettlementRecord) -> CoreResult<()>;
    async fn put_settlement_record(&mut self, record: &SettlementRecord) -> CoreResult<()>;
    async fn update_settlement_status(
        &mut self,
        id: Uuid,
        expected: SettlementStatus,
        next: SettlementStatus,
    ) -> CoreResult<bool>;

    // --- renewal proposals ---

    async fn proposal(&mut self, id: Uuid) -> CoreResult<Option<RenewalProposal>>;
    async fn pending_proposal_for(
        &mut self,
        supplier_order_id: Uuid,
    ) -> CoreResult<Option<RenewalProposal>>;
    async fn insert_proposal(&mut self, proposal: &RenewalProposal) -> CoreResult<()>;
    async fn put_proposal(&mut self, proposal: &RenewalProposal) -> CoreResult<()>;
    async fn update_proposal_status(
        &mut self,
        id: Uuid,
        expected: ProposalStatus,
        next: ProposalStatus,
    ) -> CoreResult<bool>;

    // --- audit ---

    async fn append_audit(&mut self, entry: &AuditEntry) -> CoreResult<()>;

    // --- lifecycle ---

    async fn commit(self: Box<Self>) -> CoreResult<()>;
}
