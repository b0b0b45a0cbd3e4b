use crate::{
    device::{CameraError, CaptureController, VideoSource},
    overlay::{Overlay, OverlayBox, OverlayMode},
    sampler::{FrameSampler, SampleMode, SampleTimer, SamplerError},
    telemetry::Metrics,
};
use parking_lot::{Mutex, RwLock};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Weak,
    },
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::instrument;
use watch_proto::{FramePayload, WorkerMessage};
use watch_worker::{WorkerError, WorkerHandle, WorkerState};

#[derive(Error, Debug)]
pub enum ViewError {
    #[error("Sampler error: {0}")]
    Sampler(#[from] SamplerError),
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

#[derive(Debug, Clone, Copy)]
pub struct ViewSettings {
    pub sample_mode: SampleMode,
    pub sample_interval: Duration,
    pub overlay_mode: OverlayMode,
}

/// The mounted camera page: live preview, sampling, and the overlay fed by
/// worker responses.
///
/// The overlay shows whichever `complete` message arrived last, which is not
/// necessarily the answer to the most recent frame.
pub struct CameraView {
    controller: Arc<CaptureController>,
    sampler: FrameSampler,
    worker: WorkerHandle,
    metrics: Arc<Metrics>,
    settings: ViewSettings,
    overlay: Arc<RwLock<Overlay>>,
    image: RwLock<Option<FramePayload>>,
    image_seq: AtomicU64,
    timer: Mutex<Option<SampleTimer>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl CameraView {
    pub fn mount(
        controller: Arc<CaptureController>,
        worker: WorkerHandle,
        metrics: Arc<Metrics>,
        settings: ViewSettings,
    ) -> Arc<Self> {
        let overlay = Arc::new(RwLock::new(Overlay::new(settings.overlay_mode)));
        let listener = tokio::spawn(Self::listen(
            worker.subscribe(),
            overlay.clone(),
            metrics.clone(),
        ));

        Arc::new(Self {
            controller,
            sampler: FrameSampler::new(),
            worker,
            metrics,
            settings,
            overlay,
            image: RwLock::new(None),
            image_seq: AtomicU64::new(0),
            timer: Mutex::new(None),
            listener: Mutex::new(Some(listener)),
        })
    }

    async fn listen(
        mut responses: broadcast::Receiver<WorkerMessage>,
        overlay: Arc<RwLock<Overlay>>,
        metrics: Arc<Metrics>,
    ) {
        loop {
            match responses.recv().await {
                Ok(WorkerMessage::Complete { output }) => {
                    let detections = output.flatten();
                    tracing::debug!("Applying {} detections to the overlay", detections.len());
                    metrics.record_detection(detections.len());
                    overlay.write().apply(&detections);
                }
                Ok(WorkerMessage::Initialized) => {
                    tracing::debug!("Inference worker initialized");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Overlay listener skipped {} worker messages", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    pub fn controller(&self) -> &Arc<CaptureController> {
        &self.controller
    }

    pub fn settings(&self) -> ViewSettings {
        self.settings
    }

    /// Attaches the preview to `device_id` and, in periodic mode, restarts
    /// the sampling timer. A failed selection leaves both the preview and the
    /// timer running.
    #[instrument(skip(self))]
    pub async fn select_device(self: &Arc<Self>, device_id: &str) -> Result<VideoSource, CameraError> {
        let source = self.controller.select_device(device_id).await?;
        self.stop_timer();

        if self.settings.sample_mode == SampleMode::Periodic {
            let view = Arc::downgrade(self);
            let timer = SampleTimer::start(self.settings.sample_interval, move || {
                Self::periodic_tick(view.clone())
            });
            *self.timer.lock() = Some(timer);
        }

        Ok(source)
    }

    async fn periodic_tick(view: Weak<Self>) {
        let Some(view) = view.upgrade() else {
            return;
        };
        if let Err(e) = view.snapshot().await {
            tracing::debug!("Periodic sample aborted: {}", e);
        }
    }

    /// Samples the current frame and posts it to the worker. Returns `false`
    /// when no frame was available.
    #[instrument(skip(self))]
    pub async fn snapshot(&self) -> Result<bool, ViewError> {
        let started = Instant::now();
        let Some(payload) = self.sampler.sample(&self.controller).await? else {
            tracing::debug!("No frame available, skipping sample");
            self.metrics.record_skipped_sample();
            return Ok(false);
        };
        self.metrics
            .record_sample(started.elapsed().as_millis() as u64);

        *self.image.write() = Some(payload.clone());
        self.image_seq.fetch_add(1, Ordering::SeqCst);
        self.worker.post(payload).await?;
        Ok(true)
    }

    pub fn overlay_boxes(&self) -> Vec<OverlayBox> {
        self.overlay.read().boxes().to_vec()
    }

    pub fn overlay_html(&self) -> String {
        self.overlay.read().render_html()
    }

    pub fn image(&self) -> Option<FramePayload> {
        self.image.read().clone()
    }

    /// Bumped every time a new frame is sampled.
    pub fn image_seq(&self) -> u64 {
        self.image_seq.load(Ordering::SeqCst)
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker.state()
    }

    pub fn timer_active(&self) -> bool {
        self.timer.lock().is_some()
    }

    fn stop_timer(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.stop();
        }
    }

    /// Tears the view down: stops the timer, the overlay listener, and the
    /// preview stream.
    pub async fn shutdown(&self) {
        self.stop_timer();
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
        self.controller.stop().await;
        tracing::info!("Camera view shut down");
    }
}
