use chrono::NaiveDate;
use rankpilot_core::measurement::RankSample;
use rankpilot_core::{CoreError, CoreResult};
use rankpilot_order::{GoalType, RefundPolicy, SupplierOrderLine};
use rankpilot_shared::money::round_amount;
use serde::{Deserialize, Serialize};

/// One measured day and whether it met the guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayDetail {
    pub date: NaiveDate,
    pub rank: i32,
    pub achieved: bool,
}

/// Outcome of pricing one ranking-guarantee line against its measurements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingResult {
    pub achieved_days: i64,
    pub failed_days: i64,
    pub total_days: i64,
    pub deduction_amount: i64,
    pub billable_amount: i64,
    pub daily_details: Vec<DayDetail>,
}

/// Price a ranking-guarantee line against its daily measurements.
///
/// A measured day is achieved when its rank is at or under the target
/// (lower is better). Days without a measurement count as neither achieved
/// nor failed. A pure function of the line and the sample series.
pub fn calculate_line(line: &SupplierOrderLine, samples: &[RankSample]) -> CoreResult<BillingResult> {
    if line.goal_type != GoalType::RankingGuarantee {
        return Err(CoreError::Validation(format!(
            "line {} is not a ranking-guarantee line",
            line.id
        )));
    }
    let target_rank = line.target_rank.ok_or_else(|| {
        CoreError::Validation(format!("line {} has no target rank", line.id))
    })?;
    let total_days = line.total_days();
    if total_days <= 0 {
        return Err(CoreError::Validation(format!(
            "line {} has no billable days",
            line.id
        )));
    }

    let mut daily_details: Vec<DayDetail> = samples
        .iter()
        .filter(|s| s.date >= line.start_date && s.date <= line.end_date)
        .map(|s| DayDetail {
            date: s.date,
            rank: s.rank,
            achieved: s.rank <= target_rank,
        })
        .collect();
    daily_details.sort_by_key(|d| d.date);

    let achieved_days = daily_details.iter().filter(|d| d.achieved).count() as i64;
    let failed_days = daily_details.len() as i64 - achieved_days;

    let daily_rate = line.amount as f64 / total_days as f64;
    let deduction_amount = match line.refund_policy {
        RefundPolicy::DailyProrated => {
            round_amount(daily_rate * failed_days as f64 * line.refund_rate)
        }
        RefundPolicy::FullRefund => {
            if achieved_days < line.guarantee_days.unwrap_or(0) {
                round_amount(line.amount as f64 * line.refund_rate)
            } else {
                0
            }
        }
        RefundPolicy::NoRefund => 0,
    };

    Ok(BillingResult {
        achieved_days,
        failed_days,
        total_days,
        deduction_amount,
        billable_amount: line.amount - deduction_amount,
        daily_details,
    })
}
