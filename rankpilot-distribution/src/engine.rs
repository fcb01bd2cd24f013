use crate::models::{ChannelPlan, DistributionItem, DistributionPlan, Strategy};
use rankpilot_channel::ChannelCapacity;
use std::collections::HashMap;
use uuid::Uuid;

struct ChannelState {
    capacity: ChannelCapacity,
    assigned_qty: i64,
}

impl ChannelState {
    fn remaining(&self) -> i64 {
        self.capacity.remaining() - self.assigned_qty
    }

    fn load_ratio(&self) -> f64 {
        if self.capacity.max_qty == 0 {
            // Zero-ceiling channels sort last and never fit anything
            f64::MAX
        } else {
            (self.capacity.committed_qty + self.assigned_qty) as f64
                / self.capacity.max_qty as f64
        }
    }
}

/// Assign items to channels under their remaining monthly capacity.
///
/// A pure function of its inputs: the same items, capacities and strategy
/// always produce the same plan.
pub fn distribute(
    items: &[DistributionItem],
    capacities: &[ChannelCapacity],
    strategy: Strategy,
) -> DistributionPlan {
    let mut states: Vec<ChannelState> = capacities
        .iter()
        .map(|c| ChannelState {
            capacity: c.clone(),
            assigned_qty: 0,
        })
        .collect();

    // Largest demand first; sort is stable so ties keep input order.
    let mut ordered: Vec<DistributionItem> = items.to_vec();
    ordered.sort_by(|a, b| b.quantity.cmp(&a.quantity));

    let mut plans: HashMap<Uuid, ChannelPlan> = HashMap::new();
    let mut plan_order: Vec<Uuid> = Vec::new();
    let mut unassigned = Vec::new();

    // Price order is fixed for the whole run under least-cost.
    let mut scan_order: Vec<usize> = (0..states.len()).collect();
    if strategy == Strategy::LeastCostFirst {
        scan_order.sort_by_key(|&i| states[i].capacity.base_price);
    }

    for item in ordered {
        if strategy == Strategy::LoadBalanced {
            scan_order.sort_by(|&a, &b| {
                states[a]
                    .load_ratio()
                    .partial_cmp(&states[b].load_ratio())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        let slot = scan_order
            .iter()
            .copied()
            .find(|&i| states[i].remaining() >= item.quantity);

        match slot {
            Some(i) => {
                states[i].assigned_qty += item.quantity;
                let channel_id = states[i].capacity.channel_id;
                let base_price = states[i].capacity.base_price;
                let plan = plans.entry(channel_id).or_insert_with(|| {
                    plan_order.push(channel_id);
                    ChannelPlan::new(channel_id, base_price)
                });
                plan.assign(item);
            }
            None => unassigned.push(item),
        }
    }

    let channel_plans: Vec<ChannelPlan> = plan_order
        .into_iter()
        .filter_map(|id| plans.remove(&id))
        .collect();
    let estimated_cost = channel_plans.iter().map(|p| p.estimated_cost).sum();
    let success = unassigned.is_empty();

    DistributionPlan {
        channel_plans,
        unassigned,
        success,
        estimated_cost,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn item(daily_qty: i64, work_days: i64) -> DistributionItem {
        DistributionItem::new(
            Uuid::new_v4(),
            "coffee grinder".to_string(),
            daily_qty,
            work_days,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
        )
    }

    fn capacity(base_price: i64, committed: i64, max: i64) -> ChannelCapacity {
        ChannelCapacity::new(Uuid::new_v4(), base_price, committed, max)
    }

    #[test]
    fn test_least_cost_prefers_cheapest_channel() {
        let cheap = capacity(50, 0, 10_000);
        let pricey = capacity(120, 0, 10_000);
        let cheap_id = cheap.channel_id;

        let plan = distribute(&[item(10, 30)], &[pricey, cheap], Strategy::LeastCostFirst);

        assert!(plan.success);
        assert_eq!(plan.channel_plans.len(), 1);
        assert_eq!(plan.channel_plans[0].channel_id, cheap_id);
        assert_eq!(plan.estimated_cost, 300 * 50);
    }

    #[test]
    fn test_least_cost_overflows_to_next_channel() {
        let cheap = capacity(50, 900, 1000); // only 100 left
        let pricey = capacity(120, 0, 10_000);
        let pricey_id = pricey.channel_id;

        let plan = distribute(&[item(10, 30)], &[cheap, pricey], Strategy::LeastCostFirst);

        assert!(plan.success);
        assert_eq!(plan.channel_plans[0].channel_id, pricey_id);
    }

    #[test]
    fn test_never_exceeds_remaining_capacity() {
        let caps = vec![capacity(50, 400, 1000), capacity(80, 0, 500)];
        let items = vec![item(10, 30), item(20, 20), item(5, 40), item(30, 10)];

        let plan = distribute(&items, &caps, Strategy::LeastCostFirst);

        for channel_plan in &plan.channel_plans {
            let cap = caps
                .iter()
                .find(|c| c.channel_id == channel_plan.channel_id)
                .unwrap();
            assert!(channel_plan.total_qty <= cap.max_qty - cap.committed_qty);
        }
        let assigned: i64 = plan.channel_plans.iter().map(|p| p.total_qty).sum();
        let residual: i64 = plan.unassigned.iter().map(|i| i.quantity).sum();
        let total: i64 = items.iter().map(|i| i.quantity).sum();
        assert_eq!(assigned + residual, total);
    }

    #[test]
    fn test_largest_items_placed_first() {
        // 600 then 300: the 600 takes the cheap channel, the 300 overflows.
        let cheap = capacity(50, 0, 700);
        let pricey = capacity(120, 0, 700);
        let cheap_id = cheap.channel_id;

        let small = item(10, 30);
        let large = item(20, 30);
        let plan = distribute(
            &[small, large],
            &[cheap, pricey],
            Strategy::LeastCostFirst,
        );

        assert!(plan.success);
        let cheap_plan = plan
            .channel_plans
            .iter()
            .find(|p| p.channel_id == cheap_id)
            .unwrap();
        assert_eq!(cheap_plan.total_qty, 600);
    }

    #[test]
    fn test_unassignable_item_lands_in_residual() {
        let plan = distribute(
            &[item(100, 100)],
            &[capacity(50, 0, 500)],
            Strategy::LeastCostFirst,
        );

        assert!(!plan.success);
        assert_eq!(plan.channel_plans.len(), 0);
        assert_eq!(plan.unassigned.len(), 1);
        assert_eq!(plan.estimated_cost, 0);
    }

    #[test]
    fn test_load_balanced_spreads_across_channels() {
        let a = capacity(50, 0, 1000);
        let b = capacity(120, 0, 1000);
        let items = vec![item(10, 30), item(10, 30)];

        let plan = distribute(&items, &[a, b], Strategy::LoadBalanced);

        assert!(plan.success);
        // Least-cost would stack both on the cheap channel; balanced splits.
        assert_eq!(plan.channel_plans.len(), 2);
        assert!(plan.channel_plans.iter().all(|p| p.total_qty == 300));
    }

    #[test]
    fn test_load_balanced_counts_preexisting_commitment() {
        let loaded = capacity(50, 800, 1000);
        let idle = capacity(120, 0, 1000);
        let idle_id = idle.channel_id;

        let plan = distribute(&[item(10, 30)], &[loaded, idle], Strategy::LoadBalanced);

        assert_eq!(plan.channel_plans[0].channel_id, idle_id);
    }

    #[test]
    fn test_zero_capacity_channel_never_selected() {
        let dead = capacity(10, 0, 0);
        let live = capacity(120, 0, 1000);
        let live_id = live.channel_id;

        for strategy in [Strategy::LeastCostFirst, Strategy::LoadBalanced] {
            let plan = distribute(&[item(10, 30)], &[dead.clone(), live.clone()], strategy);
            assert!(plan.success);
            assert_eq!(plan.channel_plans[0].channel_id, live_id);
        }
    }
}
