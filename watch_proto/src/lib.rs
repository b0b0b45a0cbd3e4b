//! Message shapes exchanged between the camera side and the inference worker.
//!
//! A request carries one [`FramePayload`]. The worker answers with a
//! [`WorkerMessage::Initialized`] notification once its pipeline is available,
//! followed by a [`WorkerMessage::Complete`] carrying the detections.

mod payload;

pub use payload::{FramePayload, PayloadError};

use serde::{Deserialize, Serialize};

/// Bounding box with coordinates normalized to `[0, 1]` of the frame size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BoundingBox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub label: String,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl DetectionResult {
    pub fn new(label: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            bbox,
            score: None,
        }
    }

    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }
}

/// Detector output as it travels on the wire: a list of results, a single
/// result, or one list per input image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetectionOutput {
    List(Vec<DetectionResult>),
    Batch(Vec<Vec<DetectionResult>>),
    Single(DetectionResult),
}

impl DetectionOutput {
    pub fn flatten(self) -> Vec<DetectionResult> {
        match self {
            DetectionOutput::List(results) => results,
            DetectionOutput::Batch(batches) => batches.into_iter().flatten().collect(),
            DetectionOutput::Single(result) => vec![result],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            DetectionOutput::List(results) => results.len(),
            DetectionOutput::Batch(batches) => batches.iter().map(Vec::len).sum(),
            DetectionOutput::Single(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<DetectionResult>> for DetectionOutput {
    fn from(results: Vec<DetectionResult>) -> Self {
        DetectionOutput::List(results)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRequest {
    pub input: FramePayload,
}

impl DetectionRequest {
    pub fn new(input: FramePayload) -> Self {
        Self { input }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WorkerMessage {
    Initialized,
    Complete { output: DetectionOutput },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cat() -> DetectionResult {
        DetectionResult::new("cat", BoundingBox::new(0.1, 0.2, 0.5, 0.6))
    }

    #[test]
    fn test_request_shape() {
        let request = DetectionRequest::new(FramePayload::new("data:image/png;base64,AAAA"));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({ "input": "data:image/png;base64,AAAA" }));
    }

    #[test]
    fn test_initialized_shape() {
        let value = serde_json::to_value(WorkerMessage::Initialized).unwrap();
        assert_eq!(value, json!({ "status": "initialized" }));
    }

    #[test]
    fn test_complete_shape() {
        let message = WorkerMessage::Complete {
            output: vec![cat()].into(),
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "complete",
                "output": [{
                    "label": "cat",
                    "box": { "xmin": 0.1f32, "ymin": 0.2f32, "xmax": 0.5f32, "ymax": 0.6f32 }
                }]
            })
        );
    }

    #[test]
    fn test_complete_accepts_every_output_form() {
        let single: WorkerMessage = serde_json::from_value(json!({
            "status": "complete",
            "output": { "label": "dog", "box": { "xmin": 0.0, "ymin": 0.0, "xmax": 1.0, "ymax": 1.0 } }
        }))
        .unwrap();
        let nested: WorkerMessage = serde_json::from_value(json!({
            "status": "complete",
            "output": [
                [{ "label": "dog", "score": 0.9, "box": { "xmin": 0.0, "ymin": 0.0, "xmax": 1.0, "ymax": 1.0 } }],
                [],
                [{ "label": "cat", "box": { "xmin": 0.1, "ymin": 0.1, "xmax": 0.2, "ymax": 0.2 } }]
            ]
        }))
        .unwrap();
        let empty: WorkerMessage =
            serde_json::from_value(json!({ "status": "complete", "output": [] })).unwrap();

        let WorkerMessage::Complete { output } = single else {
            panic!("expected complete message");
        };
        assert!(matches!(output, DetectionOutput::Single(_)));
        assert_eq!(output.flatten().len(), 1);

        let WorkerMessage::Complete { output } = nested else {
            panic!("expected complete message");
        };
        assert_eq!(output.len(), 2);
        let flat = output.flatten();
        assert_eq!(flat[0].label, "dog");
        assert_eq!(flat[0].score, Some(0.9));
        assert_eq!(flat[1].label, "cat");

        let WorkerMessage::Complete { output } = empty else {
            panic!("expected complete message");
        };
        assert!(output.is_empty());
    }

    #[test]
    fn test_box_geometry() {
        let bbox = BoundingBox::new(0.25, 0.5, 0.75, 0.75);
        assert_eq!(bbox.width(), 0.5);
        assert_eq!(bbox.height(), 0.25);
        assert_eq!(bbox.area(), 0.125);
        assert_eq!(BoundingBox::new(0.5, 0.5, 0.4, 0.6).area(), 0.0);
    }
}
