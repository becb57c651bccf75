use axum::http::StatusCode;
use tower_http::{
    classify::ServerErrorsFailureClass,
    trace::{DefaultOnFailure, OnFailure},
};

/// Custom failure handling for the trace layer. A device that cannot be reached is
/// answered with 502, which is logged at `WARN` instead of `ERROR`.
#[derive(Clone, Copy)]
pub(crate) struct LevelAdjustingOnFailure;

impl OnFailure<ServerErrorsFailureClass> for LevelAdjustingOnFailure {
    fn on_failure(
        &mut self,
        failure_classification: ServerErrorsFailureClass,
        latency: core::time::Duration,
        span: &tracing::Span,
    ) {
        match failure_classification {
            ServerErrorsFailureClass::StatusCode(StatusCode::BAD_GATEWAY) => {
                tracing::warn!(classification = %ServerErrorsFailureClass::StatusCode(StatusCode::BAD_GATEWAY), latency = %format!("{} ms", latency.as_millis()), "response failed (downgraded)");
            }
            value => {
                DefaultOnFailure::default().on_failure(value, latency, span);
            }
        }
    }
}
