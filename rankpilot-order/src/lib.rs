pub mod ledger;
pub mod lifecycle;
pub mod memory;
pub mod models;
pub mod renewal;
pub mod settlement;
pub mod statements;

pub use ledger::{LedgerStore, LedgerTx};
pub use lifecycle::LifecycleService;
pub use memory::MemoryLedger;
pub use models::{
    AuditEntry, CustomerOrder, CustomerOrderLine, CustomerOrderStatus, FulfillmentStatement,
    GoalType, LineStatus, ProposalStatus, RefundPolicy, RenewalProposal, SettlementDirection,
    SettlementLine, SettlementRecord, SettlementStatus, StatementLine, StatementStatus,
    SupplierOrder, SupplierOrderLine, SupplierOrderStatus,
};
pub use renewal::{RenewalOutcome, RenewalService};
pub use settlement::{completion_amounts, SettlementService, StoreAmount};
pub use statements::{StatementLineInput, StatementService};
