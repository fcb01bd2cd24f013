pub mod app_config;
pub mod database;
pub mod measurement;
pub mod pg;

pub use app_config::{BusinessRules, Config};
pub use database::DbClient;
pub use measurement::{MemoryMeasurementFeed, PgMeasurementFeed};
pub use pg::PgLedger;
