use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use rankpilot_core::retry::with_tx_retry;
use rankpilot_core::{CoreError, CoreResult};
use rankpilot_shared::order_no::{format_number, sequence_key, SUPPLIER_ORDER_PREFIX};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::LedgerStore;
use crate::models::{
    AuditEntry, LineStatus, ProposalStatus, RenewalProposal, SupplierOrder, SupplierOrderStatus,
};

/// What an accepted renewal produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalOutcome {
    pub new_order_id: Uuid,
    pub new_order_no: String,
    pub item_count: usize,
    pub total_amount: i64,
}

/// Proposes and settles contract extensions for expiring supplier orders.
pub struct RenewalService {
    ledger: Arc<dyn LedgerStore>,
    max_tx_attempts: u32,
}

impl RenewalService {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self {
            ledger,
            max_tx_attempts: 3,
        }
    }

    /// Create a Pending proposal for a supplier order. At most one pending
    /// proposal may exist per order.
    pub async fn create_proposal(
        &self,
        supplier_order_id: Uuid,
        proposed_start: NaiveDate,
        proposed_end: NaiveDate,
        proposed_amount: i64,
        actor: &str,
    ) -> CoreResult<RenewalProposal> {
        if proposed_end < proposed_start {
            return Err(CoreError::Validation(
                "proposal period ends before it starts".into(),
            ));
        }
        if proposed_amount < 0 {
            return Err(CoreError::Validation(
                "proposed amount must not be negative".into(),
            ));
        }

        with_tx_retry(self.max_tx_attempts, || {
            self.try_create_proposal(
                supplier_order_id,
                proposed_start,
                proposed_end,
                proposed_amount,
                actor,
            )
        })
        .await
    }

    async fn try_create_proposal(
        &self,
        supplier_order_id: Uuid,
        proposed_start: NaiveDate,
        proposed_end: NaiveDate,
        proposed_amount: i64,
        actor: &str,
    ) -> CoreResult<RenewalProposal> {
        let mut tx = self.ledger.begin().await?;

        let order = tx
            .supplier_order(supplier_order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("supplier order", supplier_order_id))?;
        if let Some(existing) = tx.pending_proposal_for(supplier_order_id).await? {
            return Err(CoreError::conflict(
                format!("order {} already has a pending proposal", order.order_no),
                vec![existing.id.to_string()],
            ));
        }

        let proposal = RenewalProposal::new(
            supplier_order_id,
            proposed_start,
            proposed_end,
            proposed_amount,
        );
        tx.insert_proposal(&proposal).await?;
        tx.append_audit(&AuditEntry::new(
            proposal.id,
            "RENEWAL_PROPOSED",
            serde_json::json!({
                "order_no": order.order_no,
                "proposed_amount": proposed_amount,
            }),
            actor,
        ))
        .await?;
        tx.commit().await?;

        tracing::info!(order_no = %order.order_no, "renewal proposed");
        Ok(proposal)
    }

    /// Accept a proposal: clones the parent order's lines into a new
    /// Confirmed supplier order covering the proposed range, with line
    /// amounts scaled so their sum equals the proposed amount.
    pub async fn accept(&self, proposal_id: Uuid, actor: &str) -> CoreResult<RenewalOutcome> {
        with_tx_retry(self.max_tx_attempts, || self.try_accept(proposal_id, actor)).await
    }

    async fn try_accept(&self, proposal_id: Uuid, actor: &str) -> CoreResult<RenewalOutcome> {
        let mut tx = self.ledger.begin().await?;

        let proposal = tx
            .proposal(proposal_id)
            .await?
            .ok_or_else(|| CoreError::not_found("renewal proposal", proposal_id))?;

        let applied = tx
            .update_proposal_status(proposal_id, ProposalStatus::Pending, ProposalStatus::Accepted)
            .await?;
        if !applied {
            return Err(CoreError::AlreadyProcessed(format!(
                "renewal proposal {} was already decided",
                proposal_id
            )));
        }

        let parent = tx
            .supplier_order(proposal.supplier_order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("supplier order", proposal.supplier_order_id))?;

        let today = Utc::now().date_naive();
        let seq = tx
            .next_sequence(&sequence_key(SUPPLIER_ORDER_PREFIX, today))
            .await?;
        let mut renewed = SupplierOrder::new(
            format_number(SUPPLIER_ORDER_PREFIX, today, seq),
            parent.channel_id,
            actor.to_string(),
        );
        renewed.customer_order_id = parent.customer_order_id;
        renewed.renewed_from = Some(parent.id);
        renewed.status = SupplierOrderStatus::Confirmed;

        // Scale line amounts so they sum exactly to the proposed amount;
        // the last line absorbs the rounding remainder.
        let parent_total: i64 = parent.lines.iter().map(|l| l.amount).sum();
        let mut allocated = 0;
        let line_count = parent.lines.len();
        for (idx, source) in parent.lines.iter().enumerate() {
            let amount = if idx + 1 == line_count {
                proposal.proposed_amount - allocated
            } else if parent_total > 0 {
                proposal.proposed_amount * source.amount / parent_total
            } else {
                0
            };
            allocated += amount;

            let mut line = source.clone();
            line.id = Uuid::new_v4();
            line.start_date = proposal.proposed_start;
            line.end_date = proposal.proposed_end;
            line.amount = amount;
            line.status = LineStatus::Active;
            line.achieved_days = None;
            line.failed_days = None;
            line.refund_per_day = None;
            renewed.add_line(line);
        }

        tx.insert_supplier_order(&renewed).await?;

        let mut decided = tx
            .proposal(proposal_id)
            .await?
            .ok_or_else(|| CoreError::not_found("renewal proposal", proposal_id))?;
        decided.accepted_order_id = Some(renewed.id);
        tx.put_proposal(&decided).await?;

        tx.append_audit(&AuditEntry::new(
            proposal_id,
            "RENEWAL_ACCEPTED",
            serde_json::json!({
                "parent_order_no": parent.order_no,
                "new_order_no": renewed.order_no,
                "total_amount": renewed.total_amount,
            }),
            actor,
        ))
        .await?;
        tx.commit().await?;

        tracing::info!(
            parent = %parent.order_no,
            renewed = %renewed.order_no,
            "renewal accepted"
        );
        Ok(RenewalOutcome {
            new_order_id: renewed.id,
            new_order_no: renewed.order_no.clone(),
            item_count: renewed.lines.len(),
            total_amount: renewed.total_amount,
        })
    }

    /// Decline a pending proposal.
    pub async fn decline(&self, proposal_id: Uuid, actor: &str) -> CoreResult<RenewalProposal> {
        with_tx_retry(self.max_tx_attempts, || self.try_decline(proposal_id, actor)).await
    }

    async fn try_decline(&self, proposal_id: Uuid, actor: &str) -> CoreResult<RenewalProposal> {
        let mut tx = self.ledger.begin().await?;

        let applied = tx
            .update_proposal_status(proposal_id, ProposalStatus::Pending, ProposalStatus::Declined)
            .await?;
        if !applied {
            tx.proposal(proposal_id)
                .await?
                .ok_or_else(|| CoreError::not_found("renewal proposal", proposal_id))?;
            return Err(CoreError::AlreadyProcessed(format!(
                "renewal proposal {} was already decided",
                proposal_id
            )));
        }

        let proposal = tx
            .proposal(proposal_id)
            .await?
            .ok_or_else(|| CoreError::not_found("renewal proposal", proposal_id))?;
        tx.append_audit(&AuditEntry::new(
            proposal_id,
            "RENEWAL_DECLINED",
            serde_json::json!({ "supplier_order_id": proposal.supplier_order_id }),
            actor,
        ))
        .await?;
        tx.commit().await?;

        tracing::info!(%proposal_id, "renewal declined");
        Ok(proposal)
    }

    /// Propose renewals for every InProgress supplier order ending within
    /// the notice window that has no pending proposal yet. Externally
    /// triggered; returns the proposals created.
    pub async fn scan_expiring(
        &self,
        notice_days: i64,
        actor: &str,
    ) -> CoreResult<Vec<RenewalProposal>> {
        with_tx_retry(self.max_tx_attempts, || {
            self.try_scan_expiring(notice_days, actor)
        })
        .await
    }

    async fn try_scan_expiring(
        &self,
        notice_days: i64,
        actor: &str,
    ) -> CoreResult<Vec<RenewalProposal>> {
        let mut tx = self.ledger.begin().await?;

        let today = Utc::now().date_naive();
        let cutoff = today + Duration::days(notice_days);
        let expiring = tx.supplier_orders_ending_by(cutoff).await?;

        let mut created = Vec::new();
        for order in expiring {
            if tx.pending_proposal_for(order.id).await?.is_some() {
                continue;
            }
            let Some(term_end) = order.lines.iter().map(|l| l.end_date).max() else {
                continue;
            };
            let Some(term_start) = order.lines.iter().map(|l| l.start_date).min() else {
                continue;
            };
            let term = term_end - term_start;
            let proposed_start = term_end + Duration::days(1);
            let proposal = RenewalProposal::new(
                order.id,
                proposed_start,
                proposed_start + term,
                order.total_amount,
            );
            tx.insert_proposal(&proposal).await?;
            tx.append_audit(&AuditEntry::new(
                proposal.id,
                "RENEWAL_PROPOSED",
                serde_json::json!({
                    "order_no": order.order_no,
                    "proposed_amount": proposal.proposed_amount,
                }),
                actor,
            ))
            .await?;
            created.push(proposal);
        }

        tx.commit().await?;

        tracing::info!(proposals = created.len(), "renewal expiry scan finished");
        Ok(created)
    }
}
