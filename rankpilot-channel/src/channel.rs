use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An external supply source that fulfills order lines at a base unit price
/// under a monthly capacity ceiling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub base_price: i64,
    pub monthly_capacity: i64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    pub fn new(name: String, base_price: i64, monthly_capacity: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            base_price,
            monthly_capacity,
            active: true,
            created_at: Utc::now(),
        }
    }
}
