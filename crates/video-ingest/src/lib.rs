//! Upstream video acquisition.
//!
//! A [`VideoSource`] opens an address and hands back a [`FrameStream`] that
//! yields one raw frame per call. Every blocking operation is bounded by a
//! timeout so callers can treat a silent upstream the same as a failed one.

mod ffmpeg;
mod types;

pub use ffmpeg::{FfmpegSource, parse_device_index};
pub use types::{CaptureError, Frame, FrameFormat};

/// Opens upstream addresses.
pub trait VideoSource {
    /// Open `address` and wait until it is producing frames.
    fn open(&self, address: &str) -> Result<Box<dyn FrameStream>, CaptureError>;
}

/// A live connection to one upstream address.
///
/// Dropping the stream releases the underlying connection.
pub trait FrameStream: Send {
    /// Read the next frame. Any error means the stream is no longer usable.
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;
}
