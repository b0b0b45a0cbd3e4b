use crate::{overlay::OverlayBox, server::SharedState};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct OverlayState {
    pub worker: &'static str,
    pub image_seq: u64,
    pub boxes: Vec<OverlayBox>,
}

pub async fn overlay(State(state): State<SharedState>) -> Json<OverlayState> {
    Json(OverlayState {
        worker: state.view.worker_state().as_str(),
        image_seq: state.view.image_seq(),
        boxes: state.view.overlay_boxes(),
    })
}

/// Latest sampled frame, or 404 before the first snapshot.
pub async fn latest_image(State(state): State<SharedState>) -> Response {
    let Some(payload) = state.view.image() else {
        return (StatusCode::NOT_FOUND, "No frame sampled yet").into_response();
    };

    let media_type = payload.media_type().unwrap_or("image/png").to_string();
    match payload.decode() {
        Ok(bytes) => ([(header::CONTENT_TYPE, media_type)], bytes).into_response(),
        Err(e) => {
            tracing::error!("Failed to decode sampled frame: {:?}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
