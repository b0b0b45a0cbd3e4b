use crate::{
    device::{CameraError, Device},
    server::SharedState,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

#[derive(Debug, Deserialize)]
pub struct SelectDevice {
    pub device_id: String,
}

#[derive(Debug, Serialize)]
pub struct Selected {
    pub source: String,
}

impl IntoResponse for CameraError {
    fn into_response(self) -> Response {
        let status = match self {
            CameraError::PermissionDenied => StatusCode::FORBIDDEN,
            CameraError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

pub async fn list_devices(State(state): State<SharedState>) -> Json<Vec<Device>> {
    Json(state.view.controller().list_devices())
}

#[instrument(skip(state))]
pub async fn refresh_devices(
    State(state): State<SharedState>,
) -> Result<Json<Vec<Device>>, CameraError> {
    let devices = state.view.controller().refresh_devices().await.map_err(|e| {
        tracing::error!("Failed to enumerate devices: {:?}", e);
        e
    })?;
    Ok(Json(devices))
}

#[instrument(skip(state))]
pub async fn select_device(
    State(state): State<SharedState>,
    Json(body): Json<SelectDevice>,
) -> Result<Json<Selected>, CameraError> {
    let source = state
        .view
        .select_device(&body.device_id)
        .await
        .map_err(|e| {
            tracing::error!("Failed to attach preview to {:?}: {:?}", body.device_id, e);
            e
        })?;

    Ok(Json(Selected {
        source: source.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{device::PermissionState, routes::tests::test_state};

    #[tokio::test]
    async fn test_list_devices() {
        let (state, _worker, _requests) = test_state(&["0", "1"], PermissionState::Granted).await;

        let Json(devices) = list_devices(State(state)).await;
        let ids: Vec<_> = devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1"]);
    }

    #[tokio::test]
    async fn test_select_unknown_device_uses_default() {
        let (state, _worker, _requests) = test_state(&["0"], PermissionState::Granted).await;

        let Json(selected) = select_device(
            State(state.clone()),
            Json(SelectDevice {
                device_id: "missing".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(selected.source, "default");

        let Json(selected) = select_device(
            State(state),
            Json(SelectDevice {
                device_id: "0".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(selected.source, "0");
    }

    #[test]
    fn test_permission_denied_maps_to_forbidden() {
        let response = CameraError::PermissionDenied.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
