use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Allocation strategy for a distribution run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    /// Cheapest channel first, largest items first.
    LeastCostFirst,
    /// Channel with the lowest load ratio first.
    LoadBalanced,
}

/// One unassigned line-item handed to the distribution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionItem {
    pub id: Uuid,
    pub store_id: Uuid,
    pub keyword: String,
    pub daily_qty: i64,
    pub work_days: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub quantity: i64,
}

impl DistributionItem {
    pub fn new(
        store_id: Uuid,
        keyword: String,
        daily_qty: i64,
        work_days: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            store_id,
            keyword,
            daily_qty,
            work_days,
            start_date,
            end_date,
            quantity: daily_qty * work_days,
        }
    }
}

/// Lines assigned to a single channel plus the running cost of placing them
/// there at the channel's base price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelPlan {
    pub channel_id: Uuid,
    pub base_price: i64,
    pub items: Vec<DistributionItem>,
    pub total_qty: i64,
    pub estimated_cost: i64,
}

impl ChannelPlan {
    pub fn new(channel_id: Uuid, base_price: i64) -> Self {
        Self {
            channel_id,
            base_price,
            items: Vec::new(),
            total_qty: 0,
            estimated_cost: 0,
        }
    }

    pub fn assign(&mut self, item: DistributionItem) {
        self.total_qty += item.quantity;
        self.estimated_cost += item.quantity * self.base_price;
        self.items.push(item);
    }
}

/// Result of one distribution run. Pure data: nothing is persisted until the
/// plan is materialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionPlan {
    pub channel_plans: Vec<ChannelPlan>,
    pub unassigned: Vec<DistributionItem>,
    pub success: bool,
    pub estimated_cost: i64,
}
