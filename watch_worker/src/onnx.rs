use crate::{
    config::{DetectOptions, ModelConfig, Validatable},
    labels::load_labels,
    pipeline::{Pipeline, PipelineError, PipelineLoader},
};
use async_trait::async_trait;
use image::{imageops::FilterType, GenericImageView};
use ndarray::{Array, ArrayD, ArrayView2, Axis, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::{path::Path, sync::Mutex};
use watch_proto::{BoundingBox, DetectionOutput, DetectionResult, FramePayload};

#[derive(Debug, Clone, Copy)]
struct Candidate {
    class_id: usize,
    score: f32,
    bbox: BoundingBox,
}

fn intersection(box1: &BoundingBox, box2: &BoundingBox) -> f32 {
    let width = box1.xmax.min(box2.xmax) - box1.xmin.max(box2.xmin);
    let height = box1.ymax.min(box2.ymax) - box1.ymin.max(box2.ymin);
    width.max(0.0) * height.max(0.0)
}

fn union(box1: &BoundingBox, box2: &BoundingBox) -> f32 {
    box1.area() + box2.area() - intersection(box1, box2)
}

fn iou(box1: &BoundingBox, box2: &BoundingBox) -> f32 {
    let union = union(box1, box2);
    if union <= 0.0 {
        return 0.0;
    }
    intersection(box1, box2) / union
}

fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept = Vec::new();

    while !candidates.is_empty() {
        let best = candidates.remove(0);
        candidates.retain(|other| iou(&best.bbox, &other.bbox) < iou_threshold);
        kept.push(best);
    }

    kept
}

/// Decodes the raw model output, one column per anchor laid out as
/// `[xc, yc, w, h, class scores...]` in input pixels.
fn decode_predictions(
    output: ArrayView2<f32>,
    labels: &[String],
    options: &DetectOptions,
    input_size: u32,
    (img_width, img_height): (u32, u32),
    iou_threshold: f32,
) -> Vec<DetectionResult> {
    let input_size = input_size as f32;
    let mut candidates = Vec::new();

    for column in output.axis_iter(Axis(1)) {
        let Some((class_id, score)) = column
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .reduce(|best, current| if current.1 > best.1 { current } else { best })
        else {
            continue;
        };

        if score < options.threshold {
            continue;
        }

        let xc = column[0] / input_size;
        let yc = column[1] / input_size;
        let w = column[2] / input_size;
        let h = column[3] / input_size;

        candidates.push(Candidate {
            class_id,
            score,
            bbox: BoundingBox::new(
                (xc - w / 2.).clamp(0.0, 1.0),
                (yc - h / 2.).clamp(0.0, 1.0),
                (xc + w / 2.).clamp(0.0, 1.0),
                (yc + h / 2.).clamp(0.0, 1.0),
            ),
        });
    }

    non_max_suppression(candidates, iou_threshold)
        .into_iter()
        .map(|candidate| {
            let label = labels
                .get(candidate.class_id)
                .cloned()
                .unwrap_or_else(|| format!("Unknown class {}", candidate.class_id));
            let bbox = if options.percentage {
                candidate.bbox
            } else {
                let (w, h) = (img_width as f32, img_height as f32);
                BoundingBox::new(
                    candidate.bbox.xmin * w,
                    candidate.bbox.ymin * h,
                    candidate.bbox.xmax * w,
                    candidate.bbox.ymax * h,
                )
            };
            DetectionResult::new(label, bbox).with_score(candidate.score)
        })
        .collect()
}

fn transform_image(image_data: &[u8], input_size: u32) -> Result<(Array<f32, Ix4>, u32, u32), String> {
    let original_img =
        image::load_from_memory(image_data).map_err(|e| format!("Error decoding image: {}", e))?;

    let (img_width, img_height) = original_img.dimensions();
    let img = original_img.resize_exact(input_size, input_size, FilterType::CatmullRom);

    let size = input_size as usize;
    let mut input = Array::zeros((1, 3, size, size));
    for pixel in img.pixels() {
        let x = pixel.0 as usize;
        let y = pixel.1 as usize;
        let [r, g, b, _] = pixel.2 .0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    Ok((input, img_width, img_height))
}

fn build_session(model_path: &Path) -> Result<Session, ort::Error> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .commit_from_file(model_path)?;
    Ok(session)
}

/// YOLO-style detector running on ONNX Runtime.
pub struct OnnxPipeline {
    session: Mutex<Session>,
    labels: Vec<String>,
    input_size: u32,
    iou_threshold: f32,
}

impl OnnxPipeline {
    pub fn new(model_config: &ModelConfig) -> Result<Self, PipelineError> {
        model_config.validate().map_err(PipelineError::Load)?;

        let labels = load_labels(&model_config.get_labels_path())
            .map_err(|e| PipelineError::Load(format!("Failed to load labels: {}", e)))?;

        let session = build_session(&model_config.get_path())
            .map_err(|e| PipelineError::Load(e.to_string()))?;

        tracing::info!(
            "Created ONNX session for {:?} with {} labels",
            model_config.get_path(),
            labels.len()
        );

        Ok(Self {
            session: Mutex::new(session),
            labels,
            input_size: model_config.input_size,
            iou_threshold: model_config.iou_threshold,
        })
    }

    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ArrayD<f32>, PipelineError> {
        let mut session = self
            .session
            .lock()
            .map_err(|e| PipelineError::Inference(format!("session mutex poisoned: {}", e)))?;

        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| PipelineError::Inference(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| PipelineError::Inference(e.to_string()))?;

        let (shape, data) = outputs["output0"]
            .try_extract_tensor::<f32>()
            .map_err(|e| PipelineError::Inference(format!("failed to extract tensor: {}", e)))?;

        ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())
            .map_err(|e| PipelineError::Inference(format!("invalid tensor shape: {}", e)))
    }
}

fn first_batch(output: &ArrayD<f32>) -> Result<ArrayView2<'_, f32>, PipelineError> {
    if output.ndim() != 3 {
        return Err(PipelineError::Inference(format!(
            "expected a 3-dimensional output, got shape {:?}",
            output.shape()
        )));
    }
    output
        .index_axis(Axis(0), 0)
        .into_dimensionality()
        .map_err(|e| PipelineError::Inference(e.to_string()))
}

#[async_trait]
impl Pipeline for OnnxPipeline {
    async fn detect(
        &self,
        payload: &FramePayload,
        options: &DetectOptions,
    ) -> Result<DetectionOutput, PipelineError> {
        let image_data = payload.decode()?;
        let (input, img_width, img_height) =
            transform_image(&image_data, self.input_size).map_err(PipelineError::Image)?;

        let outputs = self.run_inference(&input)?;
        let predictions = first_batch(&outputs)?;

        let detections = decode_predictions(
            predictions,
            &self.labels,
            options,
            self.input_size,
            (img_width, img_height),
            self.iou_threshold,
        );
        tracing::debug!("Decoded {} detections", detections.len());

        Ok(detections.into())
    }
}

/// Loads an [`OnnxPipeline`] off the async runtime.
#[derive(Debug, Clone)]
pub struct OnnxLoader {
    config: ModelConfig,
}

impl OnnxLoader {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PipelineLoader for OnnxLoader {
    type Pipeline = OnnxPipeline;

    async fn load(&self) -> Result<OnnxPipeline, PipelineError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || OnnxPipeline::new(&config))
            .await
            .map_err(|e| PipelineError::Load(e.to_string()))?
    }
}
