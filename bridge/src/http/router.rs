use core::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    routing,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::{
    app::AppState,
    http::{api, middleware::LevelAdjustingOnFailure},
};

/// Upper bound for one request; a device action finishes well within it.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the application router with tracing and timeout layers.
pub fn create_app(app_state: AppState) -> Router {
    Router::new()
        .nest("/api", api::routes())
        .with_state(app_state)
        .fallback(routing::any(|req: Request<Body>| async move {
            tracing::warn!(method = %req.method(), uri = %req.uri(), "Unhandled request");
            StatusCode::NOT_FOUND
        }))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(TraceLayer::new_for_http().on_failure(LevelAdjustingOnFailure))
}
