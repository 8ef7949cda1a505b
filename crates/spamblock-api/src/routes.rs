//! API routes

use axum::{
    routing::{get, post},
    Router,
};
use spamblock_core::SpamChecker;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{checks, health, policy, tickets};

/// Shared handler state
pub struct AppState {
    pub checker: Arc<SpamChecker>,
}

/// Create the API router
pub fn create_router(checker: Arc<SpamChecker>) -> Router {
    let state = Arc::new(AppState { checker });

    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/ready", get(health::readiness));

    let ticket_routes = Router::new()
        .route("/:ticket_id/created", post(tickets::ticket_created))
        .route(
            "/:ticket_id/spam",
            get(tickets::get_ticket_spam).post(tickets::mark_ticket_spam),
        );

    let api_v1 = Router::new()
        .route("/checks", post(checks::create_check))
        .route("/policy", get(policy::get_policy).put(policy::update_policy))
        .nest("/tickets", ticket_routes);

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
