use crate::CoreResult;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One observed ranking value for a tracked keyword on a given day.
///
/// The feed guarantees at most one sample per (store, keyword, date); a day
/// with no sample is simply absent from the returned series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankSample {
    pub store_id: Uuid,
    pub keyword: String,
    pub date: NaiveDate,
    pub rank: i32,
}

/// External collaborator providing daily performance samples.
#[async_trait]
pub trait MeasurementFeed: Send + Sync {
    /// Samples for the inclusive `[start, end]` window, ordered by date.
    async fn daily_ranks(
        &self,
        store_id: Uuid,
        keyword: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CoreResult<Vec<RankSample>>;
}
