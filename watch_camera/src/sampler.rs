use crate::device::{CameraError, CaptureController};
use image::{imageops, ImageFormat, RgbImage};
use parking_lot::Mutex;
use serde::Deserialize;
use std::{future::Future, io::Cursor, time::Duration};
use thiserror::Error;
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use watch_proto::FramePayload;

#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("Failed to encode frame: {0}")]
    EncodeFrameFailed(#[from] image::ImageError),
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SampleMode {
    Manual,
    Periodic,
}

/// Copies the current preview frame into an off-screen surface and encodes it
/// as a PNG data URL.
pub struct FrameSampler {
    surface: Mutex<RgbImage>,
}

impl FrameSampler {
    pub fn new() -> Self {
        Self {
            surface: Mutex::new(RgbImage::new(0, 0)),
        }
    }

    pub async fn sample(
        &self,
        controller: &CaptureController,
    ) -> Result<Option<FramePayload>, SamplerError> {
        let Some(frame) = controller.read_frame().await? else {
            return Ok(None);
        };
        if frame.width() == 0 || frame.height() == 0 {
            return Ok(None);
        }
        self.rasterize(&frame).map(Some)
    }

    /// Draws `frame` onto the surface, resized to the frame's native
    /// resolution, then serializes the surface.
    pub fn rasterize(&self, frame: &RgbImage) -> Result<FramePayload, SamplerError> {
        let mut surface = self.surface.lock();
        if surface.dimensions() != frame.dimensions() {
            *surface = RgbImage::new(frame.width(), frame.height());
        }
        imageops::replace(&mut *surface, frame, 0, 0);

        let mut png = Vec::new();
        surface.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(FramePayload::from_png(&png))
    }
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Repeating sampling timer. The task, including a tick in progress, is
/// aborted when the timer is stopped or dropped.
///
/// A tick does not wait for the previous detection to come back, so requests
/// can pile up at the worker.
pub struct SampleTimer {
    handle: JoinHandle<()>,
}

impl SampleTimer {
    pub fn start<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick().await;
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        drop(self)
    }
}

impl Drop for SampleTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
