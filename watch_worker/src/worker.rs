use crate::{
    config::{DetectOptions, WorkerConfig},
    pipeline::{LazyPipeline, Pipeline, PipelineLoader, WorkerState},
};
use std::sync::Arc;
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tracing::instrument;
use watch_proto::{DetectionRequest, FramePayload, WorkerMessage};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Inference worker is no longer running")]
    Closed,
}

/// Camera-side end of the worker channel.
#[derive(Clone)]
pub struct WorkerHandle {
    requests: mpsc::Sender<DetectionRequest>,
    responses: broadcast::Sender<WorkerMessage>,
    state: watch::Receiver<WorkerState>,
}

impl WorkerHandle {
    /// Creates a handle with no worker attached. Requests land in the returned
    /// receiver and answers are published with [`WorkerHandle::publish`].
    pub fn channel(config: &WorkerConfig) -> (Self, mpsc::Receiver<DetectionRequest>) {
        let (request_tx, request_rx) = mpsc::channel(config.queue_size.max(1));
        let (response_tx, _) = broadcast::channel(config.response_capacity.max(1));
        let (_, state) = watch::channel(WorkerState::Uninitialized);

        let handle = Self {
            requests: request_tx,
            responses: response_tx,
            state,
        };
        (handle, request_rx)
    }

    /// Sends `message` to every subscriber and returns how many received it.
    pub fn publish(&self, message: WorkerMessage) -> usize {
        self.responses.send(message).unwrap_or(0)
    }

    pub async fn post(&self, input: FramePayload) -> Result<(), WorkerError> {
        self.requests
            .send(DetectionRequest::new(input))
            .await
            .map_err(|_| WorkerError::Closed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerMessage> {
        self.responses.subscribe()
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }
}

/// Owns the lazily constructed pipeline and answers detection requests.
///
/// Every request runs on its own task, so overlapping requests may complete in
/// any order.
pub struct InferenceWorker<L: PipelineLoader> {
    pipeline: Arc<LazyPipeline<L>>,
    options: DetectOptions,
    requests: mpsc::Receiver<DetectionRequest>,
    responses: broadcast::Sender<WorkerMessage>,
}

impl<L: PipelineLoader> InferenceWorker<L> {
    pub fn new(loader: L, config: &WorkerConfig) -> (Self, WorkerHandle) {
        let pipeline = Arc::new(LazyPipeline::new(loader));
        let (mut handle, requests) = WorkerHandle::channel(config);
        handle.state = pipeline.subscribe_state();

        let worker = Self {
            pipeline,
            options: config.detection,
            requests,
            responses: handle.responses.clone(),
        };

        (worker, handle)
    }

    pub fn spawn(self, shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown_rx))
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                request = self.requests.recv() => {
                    let Some(request) = request else {
                        break;
                    };
                    tokio::spawn(Self::process(
                        self.pipeline.clone(),
                        self.options,
                        self.responses.clone(),
                        request,
                    ));
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Inference worker received shutdown signal");
                    break;
                }
            }
        }
        tracing::info!("Inference worker stopped");
    }

    #[instrument(skip_all, fields(payload_len = request.input.len()))]
    async fn process(
        pipeline: Arc<LazyPipeline<L>>,
        options: DetectOptions,
        responses: broadcast::Sender<WorkerMessage>,
        request: DetectionRequest,
    ) {
        let detector = match pipeline.get().await {
            Ok(detector) => detector,
            Err(e) => {
                tracing::error!("Failed to get detection pipeline: {:?}", e);
                return;
            }
        };
        let _ = responses.send(WorkerMessage::Initialized);

        match detector.detect(&request.input, &options).await {
            Ok(output) => {
                tracing::debug!("Returning {} detections", output.len());
                let _ = responses.send(WorkerMessage::Complete { output });
            }
            Err(e) => {
                tracing::error!("Detection failed: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::MockLoader;
    use crate::pipeline::{Pipeline, PipelineError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;
    use watch_proto::{BoundingBox, DetectionOutput, DetectionResult};

    fn payload() -> FramePayload {
        FramePayload::from_png(&[0u8; 16])
    }

    async fn next(rx: &mut broadcast::Receiver<WorkerMessage>) -> WorkerMessage {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("worker did not answer")
            .expect("response channel closed")
    }

    #[tokio::test]
    async fn test_initialized_then_complete() {
        let (worker, handle) = InferenceWorker::new(MockLoader::default(), &WorkerConfig::default());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let join = worker.spawn(shutdown_rx);
        let mut responses = handle.subscribe();

        assert_eq!(handle.state(), WorkerState::Uninitialized);
        handle.post(payload()).await.unwrap();

        assert_eq!(next(&mut responses).await, WorkerMessage::Initialized);
        let WorkerMessage::Complete { output } = next(&mut responses).await else {
            panic!("expected complete message");
        };
        let results = output.flatten();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].label, "cat");
        assert_eq!(handle.state(), WorkerState::Ready);

        let _ = shutdown_tx.send(());
        join.await.unwrap();
        assert!(matches!(handle.post(payload()).await, Err(WorkerError::Closed)));
    }

    #[tokio::test]
    async fn test_detached_handle() {
        let (handle, mut requests) = WorkerHandle::channel(&WorkerConfig::default());
        let mut responses = handle.subscribe();

        handle.post(payload()).await.unwrap();
        assert_eq!(requests.recv().await.unwrap().input, payload());

        assert_eq!(handle.publish(WorkerMessage::Initialized), 1);
        assert_eq!(next(&mut responses).await, WorkerMessage::Initialized);
        assert_eq!(handle.state(), WorkerState::Uninitialized);

        drop(responses);
        assert_eq!(handle.publish(WorkerMessage::Initialized), 0);
    }

    #[tokio::test]
    async fn test_pipeline_built_once_for_many_requests() {
        let loader = MockLoader {
            delay_ms: 10,
            ..Default::default()
        };
        let loads = loader.loads.clone();
        let (worker, handle) = InferenceWorker::new(loader, &WorkerConfig::default());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        worker.spawn(shutdown_rx);
        let mut responses = handle.subscribe();

        for _ in 0..3 {
            handle.post(payload()).await.unwrap();
        }

        let mut completed = 0;
        while completed < 3 {
            if let WorkerMessage::Complete { .. } = next(&mut responses).await {
                completed += 1;
            }
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_load_sends_nothing() {
        let loader = MockLoader {
            failures_left: Arc::new(AtomicUsize::new(1)),
            ..Default::default()
        };
        let (worker, handle) = InferenceWorker::new(loader, &WorkerConfig::default());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        worker.spawn(shutdown_rx);
        let mut responses = handle.subscribe();

        handle.post(payload()).await.unwrap();
        assert!(timeout(Duration::from_millis(100), responses.recv())
            .await
            .is_err());

        handle.post(payload()).await.unwrap();
        assert_eq!(next(&mut responses).await, WorkerMessage::Initialized);
        assert!(matches!(
            next(&mut responses).await,
            WorkerMessage::Complete { .. }
        ));
    }

    struct SlowFirstPipeline {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Pipeline for SlowFirstPipeline {
        async fn detect(
            &self,
            _payload: &FramePayload,
            _options: &DetectOptions,
        ) -> Result<DetectionOutput, PipelineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            let label = if call == 0 { "first" } else { "second" };
            Ok(vec![DetectionResult::new(label, BoundingBox::new(0.0, 0.0, 1.0, 1.0))].into())
        }
    }

    struct SlowFirstLoader;

    #[async_trait]
    impl PipelineLoader for SlowFirstLoader {
        type Pipeline = SlowFirstPipeline;

        async fn load(&self) -> Result<SlowFirstPipeline, PipelineError> {
            Ok(SlowFirstPipeline {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[tokio::test]
    async fn test_overlapping_requests_complete_out_of_order() {
        let (worker, handle) = InferenceWorker::new(SlowFirstLoader, &WorkerConfig::default());
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        worker.spawn(shutdown_rx);
        let mut responses = handle.subscribe();

        handle.post(payload()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.post(payload()).await.unwrap();

        let mut labels = Vec::new();
        while labels.len() < 2 {
            if let WorkerMessage::Complete { output } = next(&mut responses).await {
                labels.extend(output.flatten().into_iter().map(|r| r.label));
            }
        }
        assert_eq!(labels, vec!["second", "first"]);
    }
}
