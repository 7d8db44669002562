//! Camera watch service: keeps one upstream camera connected, periodically
//! counts detections, and republishes the latest frame over HTTP.
//!
//! The module is split into focused submodules:
//! - `config`: CLI configuration parsing.
//! - `pipeline`: Starts the acquisition thread and the HTTP server.
//! - `acquisition`: Connection state machine and per-frame processing.
//! - `throttle`: Decides when the detector runs.
//! - `processing`: Detector loading and category filtering.
//! - `annotation`: Drawing primitives for boxes, banners and placeholders.
//! - `encoding`: JPEG encoding.
//! - `sink`: Latest-frame store shared with viewers.
//! - `stream`: Per-viewer MJPEG sessions.
//! - `status`: JSON status views.
//! - `server`: Actix Web endpoints.
//! - `data`: Shared categories, counts and frame kinds.

/// Re-export settings so callers can configure runs without reaching into
/// submodules.
pub use config::{CamwatchCliArgs, CamwatchConfig};
/// Launch the service with a ready-made configuration.
pub use pipeline::run;
pub use telemetry::init as init_telemetry;

mod acquisition;
mod annotation;
mod config;
mod data;
mod encoding;
mod pipeline;
mod processing;
mod server;
mod sink;
mod status;
mod stream;
mod telemetry;
mod throttle;
