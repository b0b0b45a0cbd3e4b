use crate::device::{CameraError, CaptureController};
use bytes::Bytes;
use futures::stream;
use image::{codecs::jpeg::JpegEncoder, RgbImage};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::sleep;
use tracing::instrument;

const FRAME_BOUNDARY: &str = "frame";
const JPEG_QUALITY: u8 = 80;

pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("Failed to encode frame: {0}")]
    EncodeFrameFailed(#[from] image::ImageError),
    #[error("Http builder error: {0}")]
    HttpBuilderError(String),
}

/// Live video surface served as an MJPEG stream.
#[derive(Clone)]
pub struct LivePreview {
    controller: Arc<CaptureController>,
    frame_delay_ms: u64,
}

impl LivePreview {
    pub fn new(controller: Arc<CaptureController>, frame_delay_ms: u64) -> Self {
        Self {
            controller,
            frame_delay_ms,
        }
    }

    #[instrument(skip(self))]
    pub fn generate_stream(self) -> impl futures::Stream<Item = Result<Bytes, PreviewError>> {
        let delay = Duration::from_millis(self.frame_delay_ms);

        stream::unfold(self.controller, move |controller| async move {
            loop {
                sleep(delay).await;
                match controller.read_frame().await {
                    Ok(Some(frame)) => {
                        let part = encode_part(&frame).map_err(|e| {
                            tracing::error!("Error encoding frame: {:?}", e);
                            e
                        });
                        return Some((part, controller));
                    }
                    // No stream attached yet, keep the connection open.
                    Ok(None) => continue,
                    Err(e) => {
                        tracing::error!("Error getting frame: {:?}", e);
                        return Some((Err(PreviewError::from(e)), controller));
                    }
                }
            }
        })
    }
}

fn encode_part(frame: &RgbImage) -> Result<Bytes, PreviewError> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(frame)?;

    let part_header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        FRAME_BOUNDARY,
        jpeg.len()
    );
    let mut body = part_header.into_bytes();
    body.extend_from_slice(&jpeg);
    body.extend_from_slice(b"\r\n");
    Ok(Bytes::from(body))
}
