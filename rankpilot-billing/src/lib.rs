pub mod batch;
pub mod calculator;

pub use batch::{BatchSummary, BillingBatchService};
pub use calculator::{calculate_line, BillingResult, DayDetail};
