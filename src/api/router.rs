use axum::{
    Router, middleware,
    routing::{delete, get, post},
};

use crate::api::{
    ApiState,
    error::error_envelope_mw,
    handlers::{completed_delete, events, health, status, transfers_control, transfers_create},
};

pub(crate) fn build_app(state: ApiState) -> Router<()> {
    let v1 = Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/events", get(events))
        .route("/transfers", post(transfers_create))
        .route("/transfers/:id/:action", post(transfers_control))
        .route("/completed/:name", delete(completed_delete));

    Router::new()
        .nest("/api/v1", v1)
        .layer(middleware::from_fn(error_envelope_mw))
        .with_state(state)
}
