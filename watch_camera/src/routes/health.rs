use crate::{device::PermissionState, server::SharedState};
use axum::{extract::State, response::IntoResponse, response::Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct Status {
    status: String,
    permission: PermissionState,
    worker: &'static str,
}

pub async fn healthcheck(State(state): State<SharedState>) -> impl IntoResponse {
    Json(Status {
        status: "Available".into(),
        permission: state.permission,
        worker: state.view.worker_state().as_str(),
    })
}
