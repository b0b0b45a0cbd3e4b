use crate::config::DetectOptions;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, OnceCell};
use watch_proto::{DetectionOutput, FramePayload, PayloadError};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to load pipeline: {0}")]
    Load(String),
    #[error("Invalid payload: {0}")]
    Payload(#[from] PayloadError),
    #[error("Image transformation error: {0}")]
    Image(String),
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Maps one encoded frame to the objects detected in it.
#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    async fn detect(
        &self,
        payload: &FramePayload,
        options: &DetectOptions,
    ) -> Result<DetectionOutput, PipelineError>;
}

/// Builds the pipeline. Called at most once per successful construction.
#[async_trait]
pub trait PipelineLoader: Send + Sync + 'static {
    type Pipeline: Pipeline;

    async fn load(&self) -> Result<Self::Pipeline, PipelineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Uninitialized,
    Initializing,
    Ready,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Uninitialized => "uninitialized",
            WorkerState::Initializing => "initializing",
            WorkerState::Ready => "ready",
        }
    }
}

/// Pipeline constructed on first use and shared by every later caller.
///
/// Callers arriving while construction is in progress wait for the same
/// construction. A failed construction leaves the cell empty, so the next
/// caller tries again.
pub struct LazyPipeline<L: PipelineLoader> {
    loader: L,
    instance: OnceCell<Arc<L::Pipeline>>,
    state: watch::Sender<WorkerState>,
}

impl<L: PipelineLoader> LazyPipeline<L> {
    pub fn new(loader: L) -> Self {
        let (state, _) = watch::channel(WorkerState::Uninitialized);
        Self {
            loader,
            instance: OnceCell::new(),
            state,
        }
    }

    pub async fn get(&self) -> Result<Arc<L::Pipeline>, PipelineError> {
        let instance = self
            .instance
            .get_or_try_init(|| async {
                self.state.send_replace(WorkerState::Initializing);
                tracing::info!("Constructing detection pipeline");

                match self.loader.load().await {
                    Ok(pipeline) => {
                        self.state.send_replace(WorkerState::Ready);
                        tracing::info!("Detection pipeline ready");
                        Ok(Arc::new(pipeline))
                    }
                    Err(e) => {
                        self.state.send_replace(WorkerState::Uninitialized);
                        Err(e)
                    }
                }
            })
            .await?;

        Ok(instance.clone())
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use watch_proto::{BoundingBox, DetectionResult};

    pub struct MockPipeline {
        pub results: Vec<DetectionResult>,
    }

    #[async_trait]
    impl Pipeline for MockPipeline {
        async fn detect(
            &self,
            _payload: &FramePayload,
            _options: &DetectOptions,
        ) -> Result<DetectionOutput, PipelineError> {
            Ok(self.results.clone().into())
        }
    }

    #[derive(Clone, Default)]
    pub struct MockLoader {
        pub loads: Arc<AtomicUsize>,
        pub failures_left: Arc<AtomicUsize>,
        pub delay_ms: u64,
    }

    #[async_trait]
    impl PipelineLoader for MockLoader {
        type Pipeline = MockPipeline;

        async fn load(&self) -> Result<MockPipeline, PipelineError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;

            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(PipelineError::Load("model unavailable".into()));
            }

            Ok(MockPipeline {
                results: vec![DetectionResult::new(
                    "cat",
                    BoundingBox::new(0.1, 0.2, 0.5, 0.6),
                )],
            })
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_construction() {
        let loader = MockLoader {
            delay_ms: 20,
            ..Default::default()
        };
        let loads = loader.loads.clone();
        let lazy = Arc::new(LazyPipeline::new(loader));
        assert_eq!(lazy.state(), WorkerState::Uninitialized);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let lazy = lazy.clone();
                tokio::spawn(async move { lazy.get().await.map(|_| ()) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.state(), WorkerState::Ready);

        let first = lazy.get().await.unwrap();
        let second = lazy.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_state_is_initializing_while_loading() {
        let loader = MockLoader {
            delay_ms: 50,
            ..Default::default()
        };
        let lazy = Arc::new(LazyPipeline::new(loader));
        let mut states = lazy.subscribe_state();

        let task = {
            let lazy = lazy.clone();
            tokio::spawn(async move { lazy.get().await.map(|_| ()) })
        };

        states.changed().await.unwrap();
        assert_eq!(*states.borrow_and_update(), WorkerState::Initializing);

        task.await.unwrap().unwrap();
        assert_eq!(lazy.state(), WorkerState::Ready);
    }

    #[tokio::test]
    async fn test_failed_construction_is_retried() {
        let loader = MockLoader {
            failures_left: Arc::new(AtomicUsize::new(1)),
            ..Default::default()
        };
        let loads = loader.loads.clone();
        let lazy = LazyPipeline::new(loader);

        assert!(matches!(lazy.get().await, Err(PipelineError::Load(_))));
        assert_eq!(lazy.state(), WorkerState::Uninitialized);

        assert!(lazy.get().await.is_ok());
        assert_eq!(lazy.state(), WorkerState::Ready);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }
}
