mod labels;
mod onnx;

pub mod config;
pub mod pipeline;
pub mod worker;

pub use config::{DetectOptions, ModelConfig, WorkerConfig};
pub use onnx::{OnnxLoader, OnnxPipeline};
pub use pipeline::{LazyPipeline, Pipeline, PipelineError, PipelineLoader, WorkerState};
pub use worker::{InferenceWorker, WorkerError, WorkerHandle};
