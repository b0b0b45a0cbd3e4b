use crate::{server::SharedState, view::ViewError};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::instrument;

#[derive(Debug, Serialize)]
pub struct SnapshotStatus {
    pub sampled: bool,
}

impl IntoResponse for ViewError {
    fn into_response(self) -> Response {
        let status = match self {
            ViewError::Sampler(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ViewError::Worker(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, format!("Something went wrong: {}", self)).into_response()
    }
}

/// Samples the current preview frame and posts it for detection. The
/// result shows up on `/overlay` once the worker answers.
#[instrument(skip(state))]
pub async fn snapshot(State(state): State<SharedState>) -> Result<Json<SnapshotStatus>, ViewError> {
    let sampled = state.view.snapshot().await.map_err(|e| {
        tracing::error!("Snapshot failed: {:?}", e);
        e
    })?;

    Ok(Json(SnapshotStatus { sampled }))
}
