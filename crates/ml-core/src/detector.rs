use anyhow::Result;
use video_ingest::Frame;

/// Axis-aligned box in frame pixel coordinates (corners, inclusive).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    /// Build a box from a centre point and a size, as YOLO heads emit them.
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            left: cx - width / 2.0,
            top: cy - height / 2.0,
            right: cx + width / 2.0,
            bottom: cy + height / 2.0,
        }
    }

    /// Clamp the box into a `width` x `height` frame.
    pub fn clamped(self, width: i32, height: i32) -> Self {
        let max_x = (width.max(1) - 1) as f32;
        let max_y = (height.max(1) - 1) as f32;
        Self {
            left: self.left.clamp(0.0, max_x),
            top: self.top.clamp(0.0, max_y),
            right: self.right.clamp(0.0, max_x),
            bottom: self.bottom.clamp(0.0, max_y),
        }
    }
}

/// Single classified object found in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Class name as reported by the model, e.g. `"person"`.
    pub category: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// Object detector run over raw frames.
///
/// Calls are synchronous and may be slow; callers decide how often to invoke
/// them. An empty result is a valid answer, not an error.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }
}
