pub mod money;
pub mod month;
pub mod order_no;

pub use money::{tax_for, DEFAULT_TAX_RATE};
pub use month::SettlementMonth;
