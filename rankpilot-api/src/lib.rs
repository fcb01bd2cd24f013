use axum::{http::Method, Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod billing;
pub mod channels;
pub mod customer_orders;
pub mod distribution;
pub mod error;
pub mod renewals;
pub mod settlements;
pub mod state;
pub mod statements;
pub mod supplier_orders;

pub use state::AppState;

/// Optional body for transition endpoints that only need to know who
/// triggered them.
#[derive(Debug, Deserialize)]
pub struct ActorRequest {
    pub actor: Option<String>,
}

pub(crate) fn actor_of(body: &Option<Json<ActorRequest>>) -> String {
    body.as_ref()
        .and_then(|Json(req)| req.actor.clone())
        .unwrap_or_else(|| "api".to_string())
}

pub fn app(state: AppState) -> Router {
    // CORS Middleware
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    Router::new()
        .merge(channels::routes())
        .merge(customer_orders::routes())
        .merge(supplier_orders::routes())
        .merge(statements::routes())
        .merge(settlements::routes())
        .merge(renewals::routes())
        .merge(distribution::routes())
        .merge(billing::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
