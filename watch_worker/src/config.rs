use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub onnx_file: String,
    pub model_dir: PathBuf,
    pub labels_file: String,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
}

fn default_input_size() -> u32 {
    640
}

fn default_iou_threshold() -> f32 {
    0.7
}

pub trait Validatable {
    fn get_path(&self) -> PathBuf;

    fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("File not found: {:?}", self.get_path()));
        }
        Ok(())
    }
}

impl Validatable for ModelConfig {
    fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }
}

impl ModelConfig {
    pub fn get_labels_path(&self) -> PathBuf {
        self.model_dir.join(&self.labels_file)
    }
}

/// Options forwarded to the pipeline with every request.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct DetectOptions {
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Report boxes normalized to `[0, 1]` instead of pixels.
    #[serde(default = "default_percentage")]
    pub percentage: bool,
}

fn default_threshold() -> f32 {
    0.5
}

fn default_percentage() -> bool {
    true
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            percentage: default_percentage(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    #[serde(default = "default_response_capacity")]
    pub response_capacity: usize,
    #[serde(default)]
    pub detection: DetectOptions,
}

fn default_queue_size() -> usize {
    16
}

fn default_response_capacity() -> usize {
    64
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_size: default_queue_size(),
            response_capacity: default_response_capacity(),
            detection: DetectOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_paths() {
        let config = ModelConfig {
            onnx_file: "yolov8n.onnx".into(),
            model_dir: PathBuf::from("models"),
            labels_file: "labels.txt".into(),
            input_size: default_input_size(),
            iou_threshold: default_iou_threshold(),
        };

        assert_eq!(config.get_path(), PathBuf::from("models/yolov8n.onnx"));
        assert_eq!(config.get_labels_path(), PathBuf::from("models/labels.txt"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_detect_options_default() {
        let options = DetectOptions::default();
        assert_eq!(options.threshold, 0.5);
        assert!(options.percentage);
    }
}
