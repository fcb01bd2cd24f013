use std::net::SocketAddr;
use std::sync::Arc;

use rankpilot_api::{app, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rankpilot_api=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = rankpilot_store::Config::load().expect("Failed to load config");
    tracing::info!("Starting RankPilot API on port {}", config.server.port);

    let db = rankpilot_store::DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let business_rules = db
        .fetch_business_rules(config.business_rules.clone())
        .await
        .expect("Failed to load business rules");

    let app_state = AppState {
        ledger: Arc::new(rankpilot_store::PgLedger::new(db.pool.clone())),
        feed: Arc::new(rankpilot_store::PgMeasurementFeed::new(db.pool.clone())),
        business_rules,
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
