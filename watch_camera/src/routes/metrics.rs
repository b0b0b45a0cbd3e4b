use crate::server::SharedState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use prometheus::{Encoder, TextEncoder};

pub async fn metrics_handler(State(state): State<SharedState>) -> Response {
    let metric_families = state.metrics.registry.gather();

    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {:?}", e);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        [(axum::http::header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
