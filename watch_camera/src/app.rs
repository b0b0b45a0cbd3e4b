use crate::config::Config;
use crate::device::CaptureController;
use crate::opencv_backend::OpenCvBackend;
use crate::server::HttpServer;
use crate::telemetry::Metrics;
use crate::view::{CameraView, ViewSettings};

use std::{error::Error, sync::Arc, time::Duration};
use tokio::{signal, sync::broadcast};
use watch_worker::{InferenceWorker, OnnxLoader};

pub async fn start_app(config: Config) -> Result<(), Box<dyn Error>> {
    let controller = Arc::new(CaptureController::new(Arc::new(OpenCvBackend::new(
        config.camera.max_probe,
    ))));

    let permission = controller.probe_permission().await;
    if let Err(e) = controller.refresh_devices().await {
        tracing::error!("Failed to enumerate cameras: {:?}", e);
    }

    let metrics = match Metrics::new() {
        Ok(metrics) => Arc::new(metrics),
        Err(e) => {
            tracing::error!("Failed to initialize metrics: {:?}", e);
            return Err(Box::new(e));
        }
    };

    let (shutdown_tx, _) = broadcast::channel(1);
    let worker_shutdown_rx = shutdown_tx.subscribe();
    let server_shutdown_rx = shutdown_tx.subscribe();

    let (worker, worker_handle) =
        InferenceWorker::new(OnnxLoader::new(config.model.clone()), &config.worker);
    let worker_join = worker.spawn(worker_shutdown_rx);

    let view = CameraView::mount(
        controller,
        worker_handle,
        metrics.clone(),
        ViewSettings {
            sample_mode: config.camera.sample_mode,
            sample_interval: Duration::from_millis(config.camera.sample_interval_ms),
            overlay_mode: config.overlay.mode,
        },
    );

    if permission.allows_camera() {
        if let Some(device_id) = &config.camera.default_device {
            if let Err(e) = view.select_device(device_id).await {
                tracing::error!("Failed to attach preview to {:?}: {:?}", device_id, e);
            }
        }
    }

    let server = HttpServer::new(view.clone(), permission, metrics, &config).await?;
    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    view.shutdown().await;
    let _ = shutdown_tx.send(());
    let _ = server_handle.await;
    let _ = worker_join.await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {:?}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {:?}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
