use std::{convert::TryFrom, path::Path};

use anyhow::{Result, bail};
use tch::{self, Device, Kind, Tensor};
use video_ingest::{Frame, FrameFormat};

use crate::{
    detector::{BoundingBox, Detection, Detector},
    labels::coco_label,
};

const MAX_DETECTIONS: usize = 512;
const COCO_CLASSES: i64 = 80;

/// TorchScript-backed YOLO detector.
///
/// Accepts either the raw ultralytics head (`[1, 4 + classes, N]`) or a
/// post-processed `[1, 6, N]` layout of `x, y, w, h, score, class`.
pub struct TorchScriptDetector {
    module: tch::CModule,
    device: Device,
    input_size: (i64, i64),
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TorchScriptDetector {
    /// Load a TorchScript module onto `device`.
    pub fn load<P: AsRef<Path>>(
        model_path: P,
        device: Device,
        input_size: (i64, i64),
    ) -> Result<Self> {
        let module = tch::CModule::load_on_device(model_path, device)?;
        Ok(Self {
            module,
            device,
            input_size,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
        })
    }

    pub fn with_confidence_threshold(mut self, confidence: f32) -> Self {
        self.confidence_threshold = confidence;
        self
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Convert a BGR frame into a normalised RGB NCHW tensor.
    fn frame_to_tensor(&self, frame: &Frame) -> Result<Tensor> {
        if !matches!(frame.format, FrameFormat::Bgr8) {
            bail!("unsupported frame format");
        }
        frame.validate()?;

        let (in_w, in_h) = self.input_size;
        if (frame.width as i64, frame.height as i64) != (in_w, in_h) {
            bail!(
                "frame size {}x{} does not match detector input {in_w}x{in_h}",
                frame.width,
                frame.height
            );
        }

        let tensor = Tensor::from_slice(&frame.data)
            .to_device(self.device)
            .to_kind(Kind::Float)
            .view([1, in_h, in_w, 3])
            .flip([3])
            .permute([0, 3, 1, 2])
            / 255.0;

        Ok(tensor)
    }

    fn decode(&self, output: &Tensor, frame: &Frame) -> Result<Vec<Detection>> {
        let shape = output.size();
        if shape.len() != 3 {
            bail!("unexpected detector output shape: {shape:?}");
        }
        if shape[0] != 1 {
            bail!("detector expected batch=1 but received {}", shape[0]);
        }
        let channels = shape[1];
        if channels < 5 {
            bail!("detector output requires at least 5 channels, got {channels}");
        }

        let preds = output
            .to_device(Device::Cpu)
            .squeeze_dim(0)
            .permute([1, 0])
            .contiguous();
        let rows: Vec<Vec<f32>> = Vec::<Vec<f32>>::try_from(&preds)?;

        let mut candidates = Vec::new();
        for row in rows {
            let (score, class_id) = if channels == 4 + COCO_CLASSES {
                row[4..]
                    .iter()
                    .enumerate()
                    .fold((0.0f32, 0i64), |best, (idx, &score)| {
                        if score > best.0 {
                            (score, idx as i64)
                        } else {
                            best
                        }
                    })
            } else {
                let class_id = row.get(5).map(|c| *c as i64).unwrap_or(0);
                (row[4], class_id)
            };
            if score < self.confidence_threshold {
                continue;
            }
            let Some(label) = coco_label(class_id) else {
                continue;
            };
            candidates.push(Detection {
                category: label.to_string(),
                bbox: BoundingBox::from_center(row[0], row[1], row[2], row[3])
                    .clamped(frame.width, frame.height),
                confidence: score,
            });
        }

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

impl Detector for TorchScriptDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.frame_to_tensor(frame)?;
        let output = tch::no_grad(|| self.module.forward_ts(&[input]))?;
        self.decode(&output, frame)
    }
}

/// Greedy per-class suppression of overlapping boxes.
fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        let overlaps = kept.iter().any(|existing| {
            existing.category == candidate.category
                && iou(&existing.bbox, &candidate.bbox) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
            if kept.len() >= MAX_DETECTIONS {
                break;
            }
        }
    }
    kept
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let inter_w = (a.right.min(b.right) - a.left.max(b.left)).max(0.0);
    let inter_h = (a.bottom.min(b.bottom) - a.top.max(b.top)).max(0.0);
    let inter = inter_w * inter_h;
    let area_a = (a.right - a.left).max(0.0) * (a.bottom - a.top).max(0.0);
    let area_b = (b.right - b.left).max(0.0) * (b.bottom - b.top).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}
