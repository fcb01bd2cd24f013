pub mod engine;
pub mod models;

pub use engine::distribute;
pub use models::{ChannelPlan, DistributionItem, DistributionPlan, Strategy};
