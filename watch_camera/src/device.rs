use image::RgbImage;
use parking_lot::RwLock;
use serde::Serialize;
use std::{fmt, sync::Arc};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera access denied")]
    PermissionDenied,
    #[error("Camera unavailable: {0}")]
    Unavailable(String),
    #[error("Device enumeration failed: {0}")]
    Enumeration(String),
    #[error("Failed to read frame: {0}")]
    ReadFrameFailed(String),
    #[error("OpenCV error: {0}")]
    OpenCvError(#[from] opencv::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub id: DeviceId,
    pub label: String,
}

/// What a stream was opened for: an enumerated device or whatever the
/// backend considers the default video input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoSource {
    Default,
    Device(DeviceId),
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoSource::Default => write!(f, "default"),
            VideoSource::Device(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Granted,
    Prompt,
    Denied,
}

impl PermissionState {
    /// Whether the camera view should be shown at all.
    pub fn allows_camera(&self) -> bool {
        matches!(self, PermissionState::Granted | PermissionState::Prompt)
    }
}

pub trait CameraBackend: Send + Sync {
    fn enumerate_devices(&self) -> Result<Vec<Device>, CameraError>;

    /// Opens a stream with exclusive access to `source`.
    fn open(&self, source: &VideoSource) -> Result<Box<dyn VideoStream>, CameraError>;

    /// Whether both sources resolve to the same physical device.
    fn same_device(&self, a: &VideoSource, b: &VideoSource) -> bool {
        a == b
    }
}

pub trait VideoStream: Send {
    fn source(&self) -> &VideoSource;

    /// Current frame, `None` when the device delivered nothing.
    fn read_frame(&mut self) -> Result<Option<RgbImage>, CameraError>;

    fn stop(&mut self);
}

/// Owns the live preview stream and the list of known devices.
pub struct CaptureController {
    backend: Arc<dyn CameraBackend>,
    devices: RwLock<Vec<Device>>,
    stream: Mutex<Option<Box<dyn VideoStream>>>,
}

impl CaptureController {
    pub fn new(backend: Arc<dyn CameraBackend>) -> Self {
        Self {
            backend,
            devices: RwLock::new(Vec::new()),
            stream: Mutex::new(None),
        }
    }

    /// Opens the default source only to obtain an access decision. A granted
    /// stream is stopped right away.
    pub async fn probe_permission(&self) -> PermissionState {
        match self.backend.open(&VideoSource::Default) {
            Ok(mut stream) => {
                stream.stop();
                PermissionState::Granted
            }
            Err(CameraError::PermissionDenied) => {
                tracing::warn!("Camera permission denied");
                PermissionState::Denied
            }
            Err(e) => {
                tracing::warn!("Camera permission probe failed: {}", e);
                PermissionState::Prompt
            }
        }
    }

    pub async fn refresh_devices(&self) -> Result<Vec<Device>, CameraError> {
        let devices = self.backend.enumerate_devices()?;
        tracing::info!("Found {} video input devices", devices.len());
        *self.devices.write() = devices.clone();
        Ok(devices)
    }

    pub fn list_devices(&self) -> Vec<Device> {
        self.devices.read().clone()
    }

    /// Switches the live preview to `device_id`, or to the default source when
    /// the id is not among the enumerated devices. On failure the current
    /// preview is kept.
    pub async fn select_device(&self, device_id: &str) -> Result<VideoSource, CameraError> {
        let source = match self
            .devices
            .read()
            .iter()
            .find(|device| device.id.as_str() == device_id)
        {
            Some(device) => VideoSource::Device(device.id.clone()),
            None => {
                tracing::warn!(
                    "Unknown device {:?}, falling back to the default source",
                    device_id
                );
                VideoSource::Default
            }
        };

        let mut current = self.stream.lock().await;
        if current.as_ref().map(|stream| stream.source()) == Some(&source) {
            return Ok(source);
        }

        // The device accepts a single capture, release it before reopening.
        if current
            .as_ref()
            .is_some_and(|stream| self.backend.same_device(stream.source(), &source))
        {
            if let Some(mut previous) = current.take() {
                previous.stop();
            }
        }

        let stream = self.backend.open(&source)?;
        tracing::info!("Preview attached to {}", source);
        if let Some(mut previous) = current.replace(stream) {
            previous.stop();
        }

        Ok(source)
    }

    pub async fn active_source(&self) -> Option<VideoSource> {
        self.stream
            .lock()
            .await
            .as_ref()
            .map(|stream| stream.source().clone())
    }

    pub async fn read_frame(&self) -> Result<Option<RgbImage>, CameraError> {
        match self.stream.lock().await.as_mut() {
            Some(stream) => stream.read_frame(),
            None => Ok(None),
        }
    }

    pub async fn stop(&self) {
        if let Some(mut stream) = self.stream.lock().await.take() {
            stream.stop();
        }
    }
}
