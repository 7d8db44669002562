//! Configuration parsing.
//!
//! CLI flags (each also readable from a `CAMWATCH_*` environment variable) are
//! validated once into a [`CamwatchConfig`] that every component reads.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Result, bail};
use clap::Parser;

use crate::vision::data::{Category, CategorySet};

#[derive(Clone, Debug)]
/// Settings shared by the acquisition loop, the viewers and the server.
pub struct CamwatchConfig {
    /// Address tried first on every connection attempt.
    pub primary_uri: String,
    /// Addresses tried in order when the primary fails.
    pub fallback_uris: Vec<String>,
    /// TorchScript model; detection is disabled without one.
    pub model_path: Option<PathBuf>,
    /// Capture width requested from the upstream decoder.
    pub width: i32,
    /// Capture height requested from the upstream decoder.
    pub height: i32,
    /// Force CPU inference.
    pub use_cpu: bool,
    /// Minimum spacing between connection attempts.
    pub retry_interval: Duration,
    /// Time an address gets to deliver its first frame.
    pub open_timeout: Duration,
    /// Longest wait for a single frame once connected.
    pub read_timeout: Duration,
    pub analysis_interval: Duration,
    pub max_frames_without_analysis: u32,
    /// Pause after every acquisition iteration.
    pub frame_pause: Duration,
    /// Delay between frames sent to one viewer.
    pub viewer_interval: Duration,
    /// Sleep granularity while waiting to reconnect.
    pub idle_poll: Duration,
    pub categories: CategorySet,
    pub jpeg_quality: u8,
    pub bind: SocketAddr,
}

impl CamwatchConfig {
    /// Primary address followed by the fallbacks, in attempt order.
    pub fn addresses(&self) -> Vec<String> {
        std::iter::once(self.primary_uri.clone())
            .chain(self.fallback_uris.iter().cloned())
            .collect()
    }
}

/// Command line of the `camwatch` binary.
#[derive(Debug, Parser)]
#[command(
    name = "camwatch",
    version,
    about = "Watch a network camera, count detections, and republish the feed over HTTP"
)]
pub struct CamwatchCliArgs {
    /// Primary camera address (RTSP/HTTP URL, file path, or /dev/videoN).
    #[arg(long = "source", env = "CAMWATCH_SOURCE", value_name = "URI")]
    pub source: String,
    /// Fallback address, tried in the order given. Repeatable.
    #[arg(
        long = "fallback",
        env = "CAMWATCH_FALLBACKS",
        value_name = "URI",
        value_delimiter = ','
    )]
    pub fallbacks: Vec<String>,
    /// TorchScript detection model.
    #[arg(long = "model", env = "CAMWATCH_MODEL", value_name = "PATH")]
    pub model: Option<PathBuf>,
    /// Capture width in pixels.
    #[arg(long = "width", env = "CAMWATCH_WIDTH", default_value_t = 640)]
    pub width: i32,
    /// Capture height in pixels.
    #[arg(long = "height", env = "CAMWATCH_HEIGHT", default_value_t = 480)]
    pub height: i32,
    /// Force CPU inference.
    #[arg(long = "cpu", env = "CAMWATCH_CPU", action = clap::ArgAction::SetTrue)]
    pub use_cpu: bool,
    /// Seconds between reconnection attempts.
    #[arg(long = "retry-interval", env = "CAMWATCH_RETRY_INTERVAL", default_value_t = 30)]
    pub retry_interval_secs: u64,
    /// Seconds an address gets to produce its first frame.
    #[arg(long = "open-timeout", env = "CAMWATCH_OPEN_TIMEOUT", default_value_t = 10)]
    pub open_timeout_secs: u64,
    /// Seconds to wait for a frame before treating the stream as lost.
    #[arg(long = "read-timeout", env = "CAMWATCH_READ_TIMEOUT", default_value_t = 5)]
    pub read_timeout_secs: u64,
    /// Seconds between detector runs.
    #[arg(
        long = "analysis-interval",
        env = "CAMWATCH_ANALYSIS_INTERVAL",
        default_value_t = 60
    )]
    pub analysis_interval_secs: u64,
    /// Frames after which the detector runs even if the interval has not elapsed.
    #[arg(
        long = "max-frames-without-analysis",
        env = "CAMWATCH_MAX_FRAMES_WITHOUT_ANALYSIS",
        default_value_t = 500
    )]
    pub max_frames_without_analysis: u32,
    /// Milliseconds to pause after each acquired frame.
    #[arg(long = "frame-pause-ms", env = "CAMWATCH_FRAME_PAUSE_MS", default_value_t = 50)]
    pub frame_pause_ms: u64,
    /// Milliseconds between frames sent to each viewer.
    #[arg(
        long = "viewer-interval-ms",
        env = "CAMWATCH_VIEWER_INTERVAL_MS",
        default_value_t = 100
    )]
    pub viewer_interval_ms: u64,
    /// Milliseconds between shutdown checks while waiting to reconnect.
    #[arg(long = "idle-poll-ms", env = "CAMWATCH_IDLE_POLL_MS", default_value_t = 1000)]
    pub idle_poll_ms: u64,
    /// Counted category as `label=Display`. Repeatable; defaults to bird=Birds and person=Persons.
    #[arg(
        long = "category",
        env = "CAMWATCH_CATEGORIES",
        value_name = "LABEL=NAME",
        value_delimiter = ','
    )]
    pub categories: Vec<Category>,
    /// JPEG quality (1-100) for published frames.
    #[arg(long = "jpeg-quality", env = "CAMWATCH_JPEG_QUALITY", default_value_t = 85)]
    pub jpeg_quality: u8,
    /// Address the HTTP server listens on.
    #[arg(long = "bind", env = "CAMWATCH_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,
}

impl TryFrom<CamwatchCliArgs> for CamwatchConfig {
    type Error = anyhow::Error;

    fn try_from(args: CamwatchCliArgs) -> Result<Self> {
        if args.source.trim().is_empty() {
            bail!("--source must not be empty");
        }
        if args.fallbacks.iter().any(|uri| uri.trim().is_empty()) {
            bail!("--fallback must not be empty");
        }
        if args.width <= 0 || args.height <= 0 {
            bail!("Capture width and height must be positive integers");
        }
        if !(1..=100).contains(&args.jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }
        if args.retry_interval_secs == 0 {
            bail!("--retry-interval must be at least 1 second");
        }
        if args.open_timeout_secs == 0 || args.read_timeout_secs == 0 {
            bail!("--open-timeout and --read-timeout must be at least 1 second");
        }
        if args.max_frames_without_analysis == 0 {
            bail!("--max-frames-without-analysis must be at least 1");
        }
        if args.viewer_interval_ms == 0 {
            bail!("--viewer-interval-ms must be at least 1");
        }
        if args.idle_poll_ms == 0 {
            bail!("--idle-poll-ms must be at least 1");
        }

        let categories = if args.categories.is_empty() {
            CategorySet::default()
        } else {
            CategorySet::new(args.categories)?
        };

        Ok(Self {
            primary_uri: args.source,
            fallback_uris: args.fallbacks,
            model_path: args.model,
            width: args.width,
            height: args.height,
            use_cpu: args.use_cpu,
            retry_interval: Duration::from_secs(args.retry_interval_secs),
            open_timeout: Duration::from_secs(args.open_timeout_secs),
            read_timeout: Duration::from_secs(args.read_timeout_secs),
            analysis_interval: Duration::from_secs(args.analysis_interval_secs),
            max_frames_without_analysis: args.max_frames_without_analysis,
            frame_pause: Duration::from_millis(args.frame_pause_ms),
            viewer_interval: Duration::from_millis(args.viewer_interval_ms),
            idle_poll: Duration::from_millis(args.idle_poll_ms),
            categories,
            jpeg_quality: args.jpeg_quality,
            bind: args.bind,
        })
    }
}
