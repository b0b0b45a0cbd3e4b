use crate::device::{CameraBackend, CameraError, Device, DeviceId, VideoSource, VideoStream};
use image::RgbImage;
use opencv::{core::Mat, imgproc, prelude::*, videoio};
use parking_lot::Mutex;
use std::{collections::HashSet, sync::Arc};

const DEFAULT_INDEX: i32 = 0;

/// Camera access through OpenCV's `VideoCapture`.
///
/// OpenCV cannot list devices, so enumeration probes capture indices
/// `0..max_probe` and keeps the ones that open. Indices held by an open
/// stream are listed without probing.
pub struct OpenCvBackend {
    max_probe: i32,
    in_use: Arc<Mutex<HashSet<i32>>>,
}

impl OpenCvBackend {
    pub fn new(max_probe: u32) -> Self {
        Self {
            max_probe: max_probe as i32,
            in_use: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn index_of(source: &VideoSource) -> Result<i32, CameraError> {
        match source {
            VideoSource::Default => Ok(DEFAULT_INDEX),
            VideoSource::Device(id) => id
                .as_str()
                .parse()
                .map_err(|_| CameraError::Unavailable(format!("invalid device id {}", id))),
        }
    }

    fn open_index(index: i32) -> Result<videoio::VideoCapture, CameraError> {
        let capture = videoio::VideoCapture::new(index, videoio::CAP_ANY)?;
        if !capture.is_opened()? {
            return Err(CameraError::Unavailable(format!(
                "capture index {} did not open",
                index
            )));
        }
        Ok(capture)
    }
}

impl CameraBackend for OpenCvBackend {
    fn enumerate_devices(&self) -> Result<Vec<Device>, CameraError> {
        let mut devices = Vec::new();
        for index in 0..self.max_probe {
            if self.in_use.lock().contains(&index) {
                devices.push(camera_device(index));
                continue;
            }
            match Self::open_index(index) {
                Ok(mut capture) => {
                    capture.release()?;
                    devices.push(camera_device(index));
                }
                Err(e) => tracing::debug!("Skipping capture index {}: {}", index, e),
            }
        }
        Ok(devices)
    }

    fn open(&self, source: &VideoSource) -> Result<Box<dyn VideoStream>, CameraError> {
        let index = Self::index_of(source)?;
        let capture = Self::open_index(index)?;
        self.in_use.lock().insert(index);

        Ok(Box::new(OpenCvStream {
            source: source.clone(),
            index,
            capture,
            in_use: self.in_use.clone(),
        }))
    }

    fn same_device(&self, a: &VideoSource, b: &VideoSource) -> bool {
        match (Self::index_of(a), Self::index_of(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => a == b,
        }
    }
}

fn camera_device(index: i32) -> Device {
    Device {
        id: DeviceId::new(index.to_string()),
        label: format!("Camera {}", index),
    }
}

pub struct OpenCvStream {
    source: VideoSource,
    index: i32,
    capture: videoio::VideoCapture,
    in_use: Arc<Mutex<HashSet<i32>>>,
}

impl VideoStream for OpenCvStream {
    fn source(&self) -> &VideoSource {
        &self.source
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>, CameraError> {
        let mut frame = Mat::default();
        let grabbed = self
            .capture
            .read(&mut frame)
            .map_err(|e| CameraError::ReadFrameFailed(e.to_string()))?;
        if !grabbed || frame.empty() {
            return Ok(None);
        }
        mat_to_rgb(&frame).map(Some)
    }

    fn stop(&mut self) {
        if let Err(e) = self.capture.release() {
            tracing::warn!("Failed to release capture for {}: {}", self.source, e);
        }
        self.in_use.lock().remove(&self.index);
    }
}

impl Drop for OpenCvStream {
    fn drop(&mut self) {
        self.in_use.lock().remove(&self.index);
    }
}

fn mat_to_rgb(frame: &Mat) -> Result<RgbImage, CameraError> {
    let mut rgb = Mat::default();
    imgproc::cvt_color_def(frame, &mut rgb, imgproc::COLOR_BGR2RGB)?;

    let width = rgb.cols() as u32;
    let height = rgb.rows() as u32;
    let data = rgb.data_bytes()?.to_vec();

    RgbImage::from_raw(width, height, data).ok_or_else(|| {
        CameraError::ReadFrameFailed(format!(
            "frame buffer does not match {}x{} RGB",
            width, height
        ))
    })
}
