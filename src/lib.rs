use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

pub mod db;
pub mod error;
pub mod funds;
pub mod payments;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub db: db::DbPool,
    pub provider: Arc<dyn payments::PaymentProvider>,
    pub admin_token: String,
}

pub async fn health_check() -> &'static str {
    "OK"
}

async fn fund_catalog() -> Json<Vec<funds::FundInfo>> {
    Json(funds::catalog())
}

/// Guards the admin reporting routes with a shared bearer token. Interactive
/// login is handled by an external identity provider, not here.
async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| !state.admin_token.is_empty() && token == state.admin_token)
        .unwrap_or(false);
    if authorized {
        next.run(req).await
    } else {
        (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
    }
}

/// The API surface without the outer middleware stack (CORS, rate limiting,
/// security headers live in `main`). Integration tests drive this directly.
pub fn api_router(state: AppState) -> Router {
    let admin = Router::new()
        .route("/donations", get(routes::reports::list_donations))
        .route("/donations/stats", get(routes::reports::donation_stats))
        .route("/donations/export", get(routes::reports::export_csv))
        .route("/subscriptions", get(routes::reports::list_subscriptions))
        .route_layer(from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/funds", get(fund_catalog))
        .route(
            "/api/donations/create-checkout-session",
            post(routes::checkout::create_checkout_session),
        )
        .route(
            "/api/webhooks/stripe",
            post(routes::webhook::handle_stripe_webhook),
        )
        .nest("/api/admin", admin)
        .with_state(state)
}
