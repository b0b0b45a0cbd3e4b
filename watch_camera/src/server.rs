use crate::{
    config::Config, device::PermissionState, preview::LivePreview, routes::api_routes,
    telemetry::Metrics, view::CameraView,
};
use axum::Router;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};

#[derive(Clone)]
pub struct SharedState {
    pub view: Arc<CameraView>,
    pub preview: LivePreview,
    pub permission: PermissionState,
    pub metrics: Arc<Metrics>,
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new(
        view: Arc<CameraView>,
        permission: PermissionState,
        metrics: Arc<Metrics>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let addr = config.server.get_address();

        let preview = LivePreview::new(
            view.controller().clone(),
            config.camera.get_stream_delay_ms(),
        );
        let app_state = SharedState {
            view,
            preview,
            permission,
            metrics,
        };

        let router = Router::new().merge(api_routes()).with_state(app_state);

        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}
