use std::sync::Arc;

use rankpilot_billing::BillingBatchService;
use rankpilot_core::measurement::MeasurementFeed;
use rankpilot_order::{
    LedgerStore, LifecycleService, RenewalService, SettlementService, StatementService,
};
use rankpilot_store::BusinessRules;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub feed: Arc<dyn MeasurementFeed>,
    pub business_rules: BusinessRules,
}

impl AppState {
    pub fn lifecycle(&self) -> LifecycleService {
        LifecycleService::new(self.ledger.clone())
    }

    pub fn statements(&self) -> StatementService {
        StatementService::new(self.ledger.clone()).with_tax_rate(self.business_rules.tax_rate)
    }

    pub fn settlements(&self) -> SettlementService {
        SettlementService::new(self.ledger.clone())
    }

    pub fn renewals(&self) -> RenewalService {
        RenewalService::new(self.ledger.clone())
    }

    pub fn billing(&self) -> BillingBatchService {
        BillingBatchService::new(self.ledger.clone(), self.feed.clone())
    }
}
