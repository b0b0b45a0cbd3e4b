use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::collections::HashSet;

pub struct Metrics {
    frames_sampled: IntCounter,
    frames_skipped: IntCounter,
    detections_completed: IntCounter,
    boxes_received: IntCounter,
    sample_duration: Histogram,
    pub registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("watch_camera".into()), None)?;

        let frames_sampled =
            IntCounter::new("frames_sampled_total", "Frames sent to the inference worker")?;
        let frames_skipped = IntCounter::new(
            "frames_skipped_total",
            "Sampling attempts aborted because no frame was available",
        )?;
        let detections_completed = IntCounter::new(
            "detections_completed_total",
            "Completed detection messages received from the worker",
        )?;
        let boxes_received =
            IntCounter::new("boxes_received_total", "Bounding boxes received from the worker")?;

        let boundaries = generate_boundaries((5, 25, 35, 155, 1055));
        let sample_duration = Histogram::with_opts(
            HistogramOpts::new(
                "sample_duration_ms",
                "Duration of frame rasterization and encoding in milliseconds",
            )
            .buckets(boundaries),
        )?;

        registry.register(Box::new(frames_sampled.clone()))?;
        registry.register(Box::new(frames_skipped.clone()))?;
        registry.register(Box::new(detections_completed.clone()))?;
        registry.register(Box::new(boxes_received.clone()))?;
        registry.register(Box::new(sample_duration.clone()))?;

        Ok(Metrics {
            frames_sampled,
            frames_skipped,
            detections_completed,
            boxes_received,
            sample_duration,
            registry,
        })
    }

    pub fn record_sample(&self, duration_ms: u64) {
        self.frames_sampled.inc();
        self.sample_duration.observe(duration_ms as f64);
    }

    pub fn record_skipped_sample(&self) {
        self.frames_skipped.inc();
    }

    pub fn record_detection(&self, boxes: usize) {
        self.detections_completed.inc();
        self.boxes_received.inc_by(boxes as u64);
    }
}

fn generate_boundaries(parts: (i32, i32, i32, i32, i32)) -> Vec<f64> {
    let first_step: usize = 10;
    let middle_step: usize = 2;
    let end_step: usize = 20;
    let tail_step: usize = 100;
    let first_part = (parts.0..=parts.1).step_by(first_step);
    let middle_part = (parts.1..=parts.2).step_by(middle_step);
    let end_part = (parts.2..=parts.3).step_by(end_step);
    let tail_part = (parts.3..=parts.4).step_by(tail_step);

    let mut seen = HashSet::new();
    first_part
        .chain(middle_part)
        .chain(end_part)
        .chain(tail_part)
        .filter(|&x| seen.insert(x))
        .map(|x| x as f64)
        .collect()
}
