use std::time::Duration;

use anyhow::Error;
use thiserror::Error;

/// Raw frame captured from a video source.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: i32,
    pub height: i32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
}

impl FrameFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            FrameFormat::Bgr8 => 3,
        }
    }
}

impl Frame {
    /// Number of bytes a frame of this size and format must carry.
    pub fn expected_len(&self) -> usize {
        if self.width <= 0 || self.height <= 0 {
            return 0;
        }
        (self.width as usize) * (self.height as usize) * self.format.bytes_per_pixel()
    }

    /// Reject frames whose buffer does not match their declared geometry.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.width <= 0 || self.height <= 0 {
            return Err(CaptureError::Decode(format!(
                "invalid frame dimensions {}x{}",
                self.width, self.height
            )));
        }
        let expected = self.expected_len();
        if self.data.len() != expected {
            return Err(CaptureError::Decode(format!(
                "unexpected frame buffer size: got {} bytes, expected {}",
                self.data.len(),
                expected
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {uri:?}")]
    Open { uri: String },
    #[error("video source {uri:?} produced no frame within {timeout:?}")]
    OpenTimeout { uri: String, timeout: Duration },
    #[error("no frame received within {0:?}")]
    ReadTimeout(Duration),
    #[error("video source closed the stream")]
    Closed,
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error(transparent)]
    Other(#[from] Error),
}
