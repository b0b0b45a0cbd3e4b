use serde::{Deserialize, Serialize};
use std::fmt::Write;
use watch_proto::DetectionResult;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverlayMode {
    /// Each result set replaces the boxes on screen.
    #[default]
    Replace,
    /// Result sets accumulate without clearing.
    Append,
}

/// One annotation, positioned in percent of the displayed frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayBox {
    pub label: String,
    pub color: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

fn percent(fraction: f64) -> f64 {
    (fraction * 100.0 * 10_000.0).round() / 10_000.0
}

pub fn random_color() -> String {
    format!("#{:06x}", rand::random::<u32>() & 0xff_ffff)
}

impl OverlayBox {
    pub fn from_detection(detection: &DetectionResult, color: String) -> Self {
        let bbox = &detection.bbox;
        let (xmin, ymin) = (f64::from(bbox.xmin), f64::from(bbox.ymin));
        let (xmax, ymax) = (f64::from(bbox.xmax), f64::from(bbox.ymax));

        Self {
            label: detection.label.clone(),
            color,
            left: percent(xmin),
            top: percent(ymin),
            width: percent(xmax - xmin),
            height: percent(ymax - ymin),
        }
    }

    pub fn style(&self) -> String {
        format!(
            "border-color: {}; left: {}%; top: {}%; width: {}%; height: {}%;",
            self.color, self.left, self.top, self.width, self.height
        )
    }
}

#[derive(Debug, Default)]
pub struct Overlay {
    mode: OverlayMode,
    boxes: Vec<OverlayBox>,
}

impl Overlay {
    pub fn new(mode: OverlayMode) -> Self {
        Self {
            mode,
            boxes: Vec::new(),
        }
    }

    pub fn apply(&mut self, detections: &[DetectionResult]) {
        let boxes = detections
            .iter()
            .map(|detection| OverlayBox::from_detection(detection, random_color()));

        match self.mode {
            OverlayMode::Replace => self.boxes = boxes.collect(),
            OverlayMode::Append => self.boxes.extend(boxes),
        }
    }

    pub fn boxes(&self) -> &[OverlayBox] {
        &self.boxes
    }

    pub fn render_html(&self) -> String {
        let mut html = String::new();
        for overlay_box in &self.boxes {
            let _ = write!(
                html,
                r#"<div class="bounding-box" style="{}"><div class="bounding-box-label" style="background-color: {}">{}</div></div>"#,
                overlay_box.style(),
                overlay_box.color,
                escape_html(&overlay_box.label)
            );
        }
        html
    }
}

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
