use rankpilot_shared::SettlementMonth;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Point-in-time view of one channel's monthly headroom, as fed to the
/// distribution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelCapacity {
    pub channel_id: Uuid,
    pub base_price: i64,
    pub committed_qty: i64,
    pub max_qty: i64,
}

impl ChannelCapacity {
    pub fn new(channel_id: Uuid, base_price: i64, committed_qty: i64, max_qty: i64) -> Self {
        Self {
            channel_id,
            base_price,
            committed_qty,
            max_qty,
        }
    }

    pub fn remaining(&self) -> i64 {
        (self.max_qty - self.committed_qty).max(0)
    }

    /// Committed share of the ceiling, 0.0 for a zero-capacity channel.
    pub fn load_ratio(&self) -> f64 {
        if self.max_qty == 0 {
            0.0
        } else {
            self.committed_qty as f64 / self.max_qty as f64
        }
    }
}

/// Tracks committed quantity per (channel, month).
pub struct CapacityTracker {
    commitments: HashMap<(Uuid, SettlementMonth), i64>,
}

impl CapacityTracker {
    pub fn new() -> Self {
        Self {
            commitments: HashMap::new(),
        }
    }

    pub fn committed(&self, channel_id: Uuid, month: SettlementMonth) -> i64 {
        *self.commitments.get(&(channel_id, month)).unwrap_or(&0)
    }

    /// Commit quantity against a channel's monthly ceiling.
    pub fn commit(
        &mut self,
        channel_id: Uuid,
        month: SettlementMonth,
        quantity: i64,
        max_qty: i64,
    ) -> Result<(), CapacityError> {
        let current = self.committed(channel_id, month);
        if current + quantity > max_qty {
            return Err(CapacityError::Exceeded {
                channel_id,
                requested: quantity,
                available: max_qty - current,
            });
        }
        *self.commitments.entry((channel_id, month)).or_insert(0) += quantity;
        Ok(())
    }

    /// Release quantity, e.g. when a draft order is cancelled.
    pub fn release(&mut self, channel_id: Uuid, month: SettlementMonth, quantity: i64) {
        let entry = self.commitments.entry((channel_id, month)).or_insert(0);
        *entry = (*entry - quantity).max(0);
    }
}

impl Default for CapacityTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CapacityError {
    #[error("channel {channel_id} capacity exceeded: requested {requested}, available {available}")]
    Exceeded {
        channel_id: Uuid,
        requested: i64,
        available: i64,
    },
}
