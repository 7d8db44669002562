//! Detector loading and post-processing of detector output.

use ml_core::{Detection, Detector};
use tracing::{info, warn};

use crate::vision::{
    config::CamwatchConfig,
    data::{CategorySet, DetectionCounts},
};

/// Keep only detections whose label is in `categories` and count them.
///
/// Labels are matched exactly; an empty input yields all-zero counts.
pub(crate) fn filter_detections(
    detections: Vec<Detection>,
    categories: &CategorySet,
) -> (Vec<Detection>, DetectionCounts) {
    let mut counts = DetectionCounts::zeroed(categories);
    let kept = detections
        .into_iter()
        .filter(|detection| match categories.display_for(&detection.category) {
            Some(display) => {
                counts.increment(display);
                true
            }
            None => false,
        })
        .collect();
    (kept, counts)
}

/// Load the configured model, or `None` when detection is unavailable.
///
/// A missing or unloadable model is not fatal: the caller streams frames
/// without analysis for the rest of the run.
pub(crate) fn load_detector(config: &CamwatchConfig) -> Option<Box<dyn Detector>> {
    let Some(model_path) = config.model_path.as_ref() else {
        warn!("No detection model configured; detection disabled");
        return None;
    };
    if !model_path.exists() {
        warn!(
            "Model file {} not found; detection disabled",
            model_path.display()
        );
        return None;
    }
    load_model(config, model_path)
}

#[cfg(feature = "with-tch")]
fn load_model(config: &CamwatchConfig, model_path: &std::path::Path) -> Option<Box<dyn Detector>> {
    use ml_core::{
        tch::Device,
        torchscript::TorchScriptDetector,
    };

    let device = if config.use_cpu {
        Device::Cpu
    } else {
        Device::cuda_if_available()
    };
    match TorchScriptDetector::load(
        model_path,
        device,
        (config.width as i64, config.height as i64),
    ) {
        Ok(detector) => {
            info!(
                "Loaded model from {} on {:?}",
                model_path.display(),
                detector.device()
            );
            Some(Box::new(detector))
        }
        Err(err) => {
            warn!(
                "Failed to load model {}: {err:#}; detection disabled",
                model_path.display()
            );
            None
        }
    }
}

#[cfg(not(feature = "with-tch"))]
fn load_model(_config: &CamwatchConfig, model_path: &std::path::Path) -> Option<Box<dyn Detector>> {
    warn!(
        "Built without the `with-tch` feature; ignoring model {} and disabling detection",
        model_path.display()
    );
    info!("Rebuild with `--features with-tch` to enable TorchScript detection");
    None
}
