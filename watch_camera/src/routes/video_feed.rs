use crate::{
    preview::{PreviewError, CONTENT_TYPE},
    server::SharedState,
};
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::instrument;

#[instrument(skip(state))]
pub async fn video_feed(State(state): State<SharedState>) -> Result<Response, PreviewError> {
    let stream = state.preview.generate_stream();

    let body = Body::from_stream(stream);

    let response = Response::builder()
        .header(header::CONTENT_TYPE, CONTENT_TYPE)
        .body(body)
        .map_err(|e| PreviewError::HttpBuilderError(e.to_string()))?;

    Ok(response)
}

impl IntoResponse for PreviewError {
    fn into_response(self) -> Response {
        let status = match self {
            PreviewError::Camera(_) => StatusCode::SERVICE_UNAVAILABLE,
            PreviewError::EncodeFrameFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PreviewError::HttpBuilderError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
