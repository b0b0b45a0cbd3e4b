mod devices;
mod health;
mod metrics;
mod overlay;
mod page;
mod snapshot;
mod video_feed;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(page::index))
        .route("/devices", get(devices::list_devices))
        .route("/devices/refresh", post(devices::refresh_devices))
        .route("/devices/select", post(devices::select_device))
        .route("/video_feed", get(video_feed::video_feed))
        .route("/snapshot", post(snapshot::snapshot))
        .route("/overlay", get(overlay::overlay))
        .route("/image", get(overlay::latest_image))
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
}
