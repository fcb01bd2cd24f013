use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rankpilot_core::measurement::{MeasurementFeed, RankSample};
use rankpilot_core::CoreResult;
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::pg::map_sqlx;

/// Daily rank observations in Postgres. One row per (store, keyword,
/// date); re-recording a day overwrites the earlier observation.
pub struct PgMeasurementFeed {
    pool: PgPool,
}

impl PgMeasurementFeed {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, sample: &RankSample) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO rank_samples (store_id, keyword, date, rank) VALUES ($1, $2, $3, $4)
             ON CONFLICT (store_id, keyword, date) DO UPDATE SET rank = EXCLUDED.rank",
        )
        .bind(sample.store_id)
        .bind(&sample.keyword)
        .bind(sample.date)
        .bind(sample.rank)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }
}

#[async_trait]
impl MeasurementFeed for PgMeasurementFeed {
    async fn daily_ranks(
        &self,
        store_id: Uuid,
        keyword: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CoreResult<Vec<RankSample>> {
        let rows: Vec<(NaiveDate, i32)> = sqlx::query_as(
            "SELECT date, rank FROM rank_samples
             WHERE store_id = $1 AND keyword = $2 AND date BETWEEN $3 AND $4
             ORDER BY date",
        )
        .bind(store_id)
        .bind(keyword)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(rows
            .into_iter()
            .map(|(date, rank)| RankSample {
                store_id,
                keyword: keyword.to_string(),
                date,
                rank,
            })
            .collect())
    }
}

/// In-memory feed with the same last-write-wins contract as the
/// Postgres table.
#[derive(Clone)]
pub struct MemoryMeasurementFeed {
    samples: Arc<Mutex<HashMap<(Uuid, String, NaiveDate), i32>>>,
}

impl MemoryMeasurementFeed {
    pub fn new() -> Self {
        Self {
            samples: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn record(&self, sample: &RankSample) {
        let mut samples = self.samples.lock().await;
        samples.insert(
            (sample.store_id, sample.keyword.clone(), sample.date),
            sample.rank,
        );
    }
}

impl Default for MemoryMeasurementFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MeasurementFeed for MemoryMeasurementFeed {
    async fn daily_ranks(
        &self,
        store_id: Uuid,
        keyword: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> CoreResult<Vec<RankSample>> {
        let samples = self.samples.lock().await;
        let mut result: Vec<RankSample> = samples
            .iter()
            .filter(|((sid, kw, date), _)| {
                *sid == store_id && kw == keyword && *date >= start && *date <= end
            })
            .map(|((sid, kw, date), rank)| RankSample {
                store_id: *sid,
                keyword: kw.clone(),
                date: *date,
                rank: *rank,
            })
            .collect();
        result.sort_by_key(|s| s.date);
        Ok(result)
    }
}
