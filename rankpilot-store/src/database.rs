use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;
use serde_json::Value;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay DB-managed rule overrides onto the file-based defaults.
    /// Expected row format: {"value": <number>}
    pub async fn fetch_business_rules(
        &self,
        defaults: crate::app_config::BusinessRules,
    ) -> Result<crate::app_config::BusinessRules, sqlx::Error> {
        let rows: Vec<(String, Value)> =
            sqlx::query_as("SELECT rule_key, rule_value FROM business_rules")
                .fetch_all(&self.pool)
                .await?;

        let mut rules = defaults;

        for (rule_key, rule_value) in rows {
            if let Some(v) = rule_value.get("value") {
                match rule_key.as_str() {
                    "tax_rate" => {
                        if let Some(f) = Value::as_f64(v) {
                            rules.tax_rate = f;
                        }
                    }
                    "renewal_notice_days" => {
                        if let Some(i) = Value::as_i64(v) {
                            rules.renewal_notice_days = i;
                        }
                    }
                    "settlement_retry_max" => {
                        if let Some(u) = Value::as_u64(v) {
                            rules.settlement_retry_max = u as u32;
                        }
                    }
                    _ => {}
                }
            }
        }

        Ok(rules)
    }
}
