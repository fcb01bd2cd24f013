use chrono::{DateTime, NaiveDate, Utc};
use rankpilot_shared::money::{tax_for, DEFAULT_TAX_RATE};
use rankpilot_shared::SettlementMonth;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Customer order status in the lifecycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomerOrderStatus {
    Draft,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

/// Supplier order status in the lifecycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupplierOrderStatus {
    Draft,
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

/// Line status on a supplier order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineStatus {
    Active,
    Completed,
    Cancelled,
}

/// What the line promises: volume delivery or a ranking outcome
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalType {
    Completion,
    RankingGuarantee,
}

/// How missed guarantee days are compensated
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundPolicy {
    DailyProrated,
    FullRefund,
    NoRefund,
}

/// Fulfillment statement status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatementStatus {
    Draft,
    Confirmed,
    Locked,
}

/// Which side of the ledger a settlement record sits on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementDirection {
    Revenue,
    Cost,
}

/// Settlement record status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Pending,
    Confirmed,
    Paid,
}

/// Renewal proposal status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalStatus {
    Pending,
    Accepted,
    Declined,
}

/// The single source of truth for a customer's purchase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerOrder {
    pub id: Uuid,
    pub order_no: String,
    pub customer_id: Uuid,
    pub supply_amount: i64,
    pub tax_amount: i64,
    pub total_amount: i64,
    pub status: CustomerOrderStatus,
    pub lines: Vec<CustomerOrderLine>,
    pub cancel_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustomerOrder {
    pub fn new(order_no: String, customer_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_no,
            customer_id,
            supply_amount: 0,
            tax_amount: 0,
            total_amount: 0,
            status: CustomerOrderStatus::Draft,
            lines: Vec::new(),
            cancel_reason: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a line and recompute supply, tax and total
    pub fn add_line(&mut self, line: CustomerOrderLine) {
        self.lines.push(line);
        self.supply_amount = self.lines.iter().map(|l| l.amount).sum();
        self.tax_amount = tax_for(self.supply_amount, DEFAULT_TAX_RATE);
        self.total_amount = self.supply_amount + self.tax_amount;
        self.updated_at = Utc::now();
    }

    /// Update order status
    pub fn update_status(&mut self, new_status: CustomerOrderStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }
}

/// One keyword campaign on a customer order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerOrderLine {
    pub id: Uuid,
    pub store_id: Uuid,
    pub keyword: String,
    pub daily_qty: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub work_days: i64,
    pub unit_price: i64,
    pub amount: i64,
}

impl CustomerOrderLine {
    pub fn new(
        store_id: Uuid,
        keyword: String,
        daily_qty: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
        work_days: i64,
        unit_price: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            store_id,
            keyword,
            daily_qty,
            start_date,
            end_date,
            work_days,
            unit_price,
            amount: daily_qty * work_days * unit_price,
        }
    }
}

/// Placement of work onto a channel, downstream of a customer order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierOrder {
    pub id: Uuid,
    pub order_no: String,
    pub channel_id: Uuid,
    pub customer_order_id: Option<Uuid>,
    pub status: SupplierOrderStatus,
    pub total_amount: i64,
    pub lines: Vec<SupplierOrderLine>,
    pub renewed_from: Option<Uuid>,
    pub cancel_reason: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SupplierOrder {
    pub fn new(order_no: String, channel_id: Uuid, created_by: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            order_no,
            channel_id,
            customer_order_id: None,
            status: SupplierOrderStatus::Draft,
            total_amount: 0,
            lines: Vec::new(),
            renewed_from: None,
            cancel_reason: None,
            cancelled_at: None,
            completed_at: None,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a line and recompute the order total
    pub fn add_line(&mut self, line: SupplierOrderLine) {
        self.lines.push(line);
        self.total_amount = self.lines.iter().map(|l| l.amount).sum();
        self.updated_at = Utc::now();
    }

    /// Update order status
    pub fn update_status(&mut self, new_status: SupplierOrderStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }

    /// Settlement month this order's work lands in, taken from its latest
    /// line end date.
    pub fn settlement_month(&self) -> Option<SettlementMonth> {
        self.lines
            .iter()
            .map(|l| l.end_date)
            .max()
            .map(SettlementMonth::from_date)
    }
}

/// One keyword campaign placed on a channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplierOrderLine {
    pub id: Uuid,
    pub store_id: Uuid,
    pub keyword: String,
    pub daily_qty: i64,
    pub work_days: i64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_qty: i64,
    pub unit_price: i64,
    pub amount: i64,
    pub status: LineStatus,
    pub goal_type: GoalType,
    pub target_rank: Option<i32>,
    pub guarantee_days: Option<i64>,
    pub refund_policy: RefundPolicy,
    pub refund_rate: f64,
    pub achieved_days: Option<i64>,
    pub failed_days: Option<i64>,
    pub refund_per_day: Option<i64>,
}

impl SupplierOrderLine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store_id: Uuid,
        keyword: String,
        daily_qty: i64,
        work_days: i64,
        start_date: NaiveDate,
        end_date: NaiveDate,
        unit_price: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            store_id,
            keyword,
            daily_qty,
            work_days,
            start_date,
            end_date,
            total_qty: daily_qty * work_days,
            unit_price,
            amount: daily_qty * work_days * unit_price,
            status: LineStatus::Active,
            goal_type: GoalType::Completion,
            target_rank: None,
            guarantee_days: None,
            refund_policy: RefundPolicy::NoRefund,
            refund_rate: 0.0,
            achieved_days: None,
            failed_days: None,
            refund_per_day: None,
        }
    }

    /// Contract length in days. Falls back to the calendar span when
    /// work_days was never set.
    pub fn total_days(&self) -> i64 {
        if self.work_days > 0 {
            self.work_days
        } else {
            (self.end_date - self.start_date).num_days()
        }
    }
}

/// Monthly record of delivered work against a supplier order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentStatement {
    pub id: Uuid,
    pub statement_no: String,
    pub supplier_order_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub status: StatementStatus,
    pub lines: Vec<StatementLine>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FulfillmentStatement {
    pub fn new(
        statement_no: String,
        supplier_order_id: Uuid,
        period_start: NaiveDate,
        period_end: NaiveDate,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            statement_no,
            supplier_order_id,
            period_start,
            period_end,
            status: StatementStatus::Draft,
            lines: Vec::new(),
            confirmed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Total delivered amount across all lines
    pub fn total_amount(&self) -> i64 {
        self.lines.iter().map(|l| l.amount).sum()
    }

    /// Update statement status
    pub fn update_status(&mut self, new_status: StatementStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }
}

/// Delivered quantity and amount for one supplier order line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementLine {
    pub id: Uuid,
    pub supplier_order_line_id: Uuid,
    pub store_id: Uuid,
    pub completed_qty: i64,
    pub amount: i64,
}

impl StatementLine {
    pub fn new(supplier_order_line_id: Uuid, store_id: Uuid, completed_qty: i64, amount: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            supplier_order_line_id,
            store_id,
            completed_qty,
            amount,
        }
    }
}

/// Aggregated money movement for one store/channel/month, one direction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub id: Uuid,
    pub store_id: Uuid,
    pub channel_id: Uuid,
    pub settlement_month: SettlementMonth,
    pub direction: SettlementDirection,
    pub amount: i64,
    pub status: SettlementStatus,
    pub lines: Vec<SettlementLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SettlementRecord {
    pub fn new(
        store_id: Uuid,
        channel_id: Uuid,
        settlement_month: SettlementMonth,
        direction: SettlementDirection,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            store_id,
            channel_id,
            settlement_month,
            direction,
            amount: 0,
            status: SettlementStatus::Pending,
            lines: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a line and recompute the record amount
    pub fn append_line(&mut self, line: SettlementLine) {
        self.lines.push(line);
        self.amount = self.lines.iter().map(|l| l.total_amount).sum();
        self.updated_at = Utc::now();
    }

    /// Update settlement status
    pub fn update_status(&mut self, new_status: SettlementStatus) {
        self.status = new_status;
        self.updated_at = Utc::now();
    }
}

/// One statement's contribution to a settlement record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementLine {
    pub id: Uuid,
    pub statement_id: Uuid,
    pub supply_amount: i64,
    pub tax_amount: i64,
    pub total_amount: i64,
}

impl SettlementLine {
    pub fn new(statement_id: Uuid, supply_amount: i64, tax_amount: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            statement_id,
            supply_amount,
            tax_amount,
            total_amount: supply_amount + tax_amount,
        }
    }
}

/// Offer to extend an expiring supplier order for another term
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalProposal {
    pub id: Uuid,
    pub supplier_order_id: Uuid,
    pub proposed_start: NaiveDate,
    pub proposed_end: NaiveDate,
    pub proposed_amount: i64,
    pub status: ProposalStatus,
    pub accepted_order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl RenewalProposal {
    pub fn new(
        supplier_order_id: Uuid,
        proposed_start: NaiveDate,
        proposed_end: NaiveDate,
        proposed_amount: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            supplier_order_id,
            proposed_start,
            proposed_end,
            proposed_amount,
            status: ProposalStatus::Pending,
            accepted_order_id: None,
            created_at: Utc::now(),
            decided_at: None,
        }
    }
}

/// Append-only record of a state change (never delete)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub change_type: String,
    pub detail: serde_json::Value,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(entity_id: Uuid, change_type: &str, detail: serde_json::Value, actor: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_id,
            change_type: change_type.to_string(),
            detail,
            actor: actor.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(daily_qty: i64, work_days: i64, unit_price: i64) -> CustomerOrderLine {
        CustomerOrderLine::new(
            Uuid::new_v4(),
            "espresso machine".to_string(),
            daily_qty,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            work_days,
            unit_price,
        )
    }

    #[test]
    fn test_customer_order_totals_include_tax() {
        let mut order = CustomerOrder::new("CO20250301-1".to_string(), Uuid::new_v4());
        order.add_line(line(10, 30, 100)); // 30_000
        order.add_line(line(5, 20, 200)); // 20_000

        assert_eq!(order.supply_amount, 50_000);
        assert_eq!(order.tax_amount, 5_000);
        assert_eq!(order.total_amount, 55_000);
    }

    #[test]
    fn test_supplier_line_total_days_falls_back_to_span() {
        let mut l = SupplierOrderLine::new(
            Uuid::new_v4(),
            "espresso machine".to_string(),
            10,
            0,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 21).unwrap(),
            100,
        );
        assert_eq!(l.total_days(), 20);

        l.work_days = 15;
        assert_eq!(l.total_days(), 15);
    }

    #[test]
    fn test_settlement_record_amount_tracks_lines() {
        let mut record = SettlementRecord::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            SettlementMonth::new(2025, 3),
            SettlementDirection::Cost,
        );
        record.append_line(SettlementLine::new(Uuid::new_v4(), 10_000, 1_000));
        record.append_line(SettlementLine::new(Uuid::new_v4(), 5_000, 500));

        assert_eq!(record.amount, 16_500);
        assert_eq!(record.status, SettlementStatus::Pending);
    }

    #[test]
    fn test_supplier_order_settlement_month_uses_latest_line() {
        let mut order = SupplierOrder::new(
            "SO20250301-1".to_string(),
            Uuid::new_v4(),
            "system".to_string(),
        );
        assert!(order.settlement_month().is_none());

        let mut early = SupplierOrderLine::new(
            Uuid::new_v4(),
            "espresso machine".to_string(),
            10,
            30,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            100,
        );
        early.end_date = NaiveDate::from_ymd_opt(2025, 3, 31).unwrap();
        let mut late = early.clone();
        late.end_date = NaiveDate::from_ymd_opt(2025, 4, 15).unwrap();

        order.add_line(early);
        order.add_line(late);
        assert_eq!(order.settlement_month(), Some(SettlementMonth::new(2025, 4)));
    }
}
