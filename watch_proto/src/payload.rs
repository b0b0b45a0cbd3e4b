use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

const DATA_URL_SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64,";
const PNG_MEDIA_TYPE: &str = "image/png";

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("Payload is not base64 encoded")]
    NotBase64,
    #[error("Failed to decode payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// One sampled frame encoded as a data URL (`data:image/png;base64,...`).
///
/// A bare base64 string is accepted as well when decoding.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FramePayload(String);

impl FramePayload {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn from_png(png: &[u8]) -> Self {
        Self(format!(
            "{DATA_URL_SCHEME}{PNG_MEDIA_TYPE}{BASE64_MARKER}{}",
            STANDARD.encode(png)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn media_type(&self) -> Option<&str> {
        let rest = self.0.strip_prefix(DATA_URL_SCHEME)?;
        let end = rest.find(BASE64_MARKER)?;
        Some(&rest[..end])
    }

    pub fn decode(&self) -> Result<Vec<u8>, PayloadError> {
        let encoded = match self.0.strip_prefix(DATA_URL_SCHEME) {
            Some(rest) => {
                let start = rest.find(BASE64_MARKER).ok_or(PayloadError::NotBase64)?;
                &rest[start + BASE64_MARKER.len()..]
            }
            None => self.0.as_str(),
        };
        Ok(STANDARD.decode(encoded.trim())?)
    }
}

impl fmt::Debug for FramePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePayload")
            .field("media_type", &self.media_type())
            .field("len", &self.0.len())
            .finish()
    }
}
