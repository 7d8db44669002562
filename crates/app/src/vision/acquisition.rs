//! Acquisition loop: keeps one upstream connection alive and publishes a
//! renderable frame for every frame read.
//!
//! The loop runs on a dedicated thread and is the only writer of the
//! [`FrameSink`](crate::vision::sink::FrameSink). Connection failures, read
//! failures and per-frame errors all lead back to `Disconnected`; nothing
//! escapes the loop except through the published frames.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use actix_web::web::Bytes;
use anyhow::{Context, Result, anyhow};
use chrono::Local;
use ml_core::Detector;
use tracing::{debug, error, info, warn};
use video_ingest::{Frame, FrameStream, VideoSource};

use crate::vision::{
    annotation::{annotate_detections, frame_to_image},
    config::CamwatchConfig,
    data::{CategorySet, FrameKind},
    encoding::{encode_frame, encode_jpeg, render_placeholder},
    processing::filter_detections,
    sink::SinkWriter,
    status::display_source,
    throttle::AnalysisThrottle,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    Disconnected,
    Connected,
}

/// Upstream connection bookkeeping.
#[derive(Debug)]
pub(crate) struct Connection {
    state: ConnectionState,
    address: Option<String>,
    last_attempt: Option<Instant>,
    retry_interval: Duration,
}

impl Connection {
    pub(crate) fn new(retry_interval: Duration) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            address: None,
            last_attempt: None,
            retry_interval,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    /// Address of the live connection.
    pub(crate) fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Whether a connection attempt may start at `now`.
    pub(crate) fn attempt_due(&self, now: Instant) -> bool {
        self.state == ConnectionState::Disconnected
            && self
                .last_attempt
                .is_none_or(|last| now.saturating_duration_since(last) > self.retry_interval)
    }

    /// Time left before the next attempt is allowed.
    pub(crate) fn until_next_attempt(&self, now: Instant) -> Duration {
        match self.last_attempt {
            Some(last) => self
                .retry_interval
                .saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    fn mark_attempt(&mut self, now: Instant) {
        self.last_attempt = Some(now);
    }

    fn mark_connected(&mut self, address: String) {
        self.state = ConnectionState::Connected;
        self.address = Some(address);
    }

    /// A dropped stream may be replaced right away; only failed attempts
    /// are rate-limited.
    fn mark_lost(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.address = None;
        self.last_attempt = None;
    }
}

/// Tunables for [`AcquisitionLoop`], taken from [`CamwatchConfig`].
#[derive(Clone, Debug)]
pub(crate) struct AcquisitionSettings {
    pub(crate) addresses: Vec<String>,
    pub(crate) retry_interval: Duration,
    pub(crate) analysis_interval: Duration,
    pub(crate) max_frames_without_analysis: u32,
    pub(crate) frame_pause: Duration,
    pub(crate) idle_poll: Duration,
    pub(crate) categories: CategorySet,
    pub(crate) jpeg_quality: u8,
    pub(crate) placeholder_size: (u32, u32),
}

impl From<&CamwatchConfig> for AcquisitionSettings {
    fn from(config: &CamwatchConfig) -> Self {
        Self {
            addresses: config.addresses(),
            retry_interval: config.retry_interval,
            analysis_interval: config.analysis_interval,
            max_frames_without_analysis: config.max_frames_without_analysis,
            frame_pause: config.frame_pause,
            idle_poll: config.idle_poll,
            categories: config.categories.clone(),
            jpeg_quality: config.jpeg_quality,
            placeholder_size: (config.width as u32, config.height as u32),
        }
    }
}

/// Outcome of one loop iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// Disconnected and still inside the retry interval.
    Waiting,
    Connected,
    /// Every address failed; a placeholder was published.
    ConnectFailed,
    Published(FrameKind),
    /// The stream failed and was dropped.
    Lost,
}

pub(crate) struct AcquisitionLoop<S: VideoSource> {
    source: S,
    detector: Option<Box<dyn Detector>>,
    settings: AcquisitionSettings,
    sink: SinkWriter,
    shutdown: Arc<AtomicBool>,
    connection: Connection,
    stream: Option<Box<dyn FrameStream>>,
    throttle: AnalysisThrottle,
    failure_frame: Option<Bytes>,
    lost_frame: Option<Bytes>,
}

impl<S: VideoSource> AcquisitionLoop<S> {
    pub(crate) fn new(
        source: S,
        detector: Option<Box<dyn Detector>>,
        settings: AcquisitionSettings,
        sink: SinkWriter,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let connection = Connection::new(settings.retry_interval);
        let throttle = AnalysisThrottle::new(
            settings.analysis_interval,
            settings.max_frames_without_analysis,
        );
        Self {
            source,
            detector,
            settings,
            sink,
            shutdown,
            connection,
            stream: None,
            throttle,
            failure_frame: None,
            lost_frame: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Run until the shutdown flag is set.
    pub(crate) fn run(mut self) {
        let span = tracing::info_span!(
            "acquisition",
            primary = %self.settings.addresses.first().map(|a| display_source(a)).unwrap_or_default(),
            fallbacks = self.settings.addresses.len().saturating_sub(1),
            detector = self.detector.is_some()
        );
        let _span_guard = span.enter();
        info!("Acquisition loop started");

        while !self.shutdown.load(Ordering::Relaxed) {
            let step = self.step(Instant::now());
            self.pause_after(step);
        }

        self.drop_stream();
        info!("Acquisition loop stopped");
    }

    /// Advance the state machine by one iteration.
    pub(crate) fn step(&mut self, now: Instant) -> Step {
        if self.stream.is_none() {
            if !self.connection.attempt_due(now) {
                return Step::Waiting;
            }
            return if self.connect(now) {
                Step::Connected
            } else {
                Step::ConnectFailed
            };
        }

        match self.process_next_frame(now) {
            Ok(kind) => Step::Published(kind),
            Err(err) => {
                warn!(
                    source = %self.connection.address().map(display_source).unwrap_or_default(),
                    "Lost upstream stream: {err:#}; will reconnect"
                );
                metrics::counter!("camwatch_stream_failures_total").increment(1);
                self.drop_stream();
                self.publish_connection_lost();
                Step::Lost
            }
        }
    }

    fn pause_after(&self, step: Step) {
        match step {
            Step::Published(_) | Step::Lost => thread::sleep(self.settings.frame_pause),
            Step::Connected => {}
            Step::Waiting | Step::ConnectFailed => {
                let wait = self
                    .connection
                    .until_next_attempt(Instant::now())
                    .max(Duration::from_millis(1))
                    .min(self.settings.idle_poll);
                thread::sleep(wait);
            }
        }
    }

    /// Try the primary then each fallback; the first to open wins.
    fn connect(&mut self, now: Instant) -> bool {
        self.connection.mark_attempt(now);
        let _connect_guard = tracing::info_span!("acquisition.connect").entered();
        info!(
            "Attempting to connect to camera at {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );

        for (index, address) in self.settings.addresses.iter().enumerate() {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested; abandoning connection attempt");
                return false;
            }
            let shown = display_source(address);
            match self.source.open(address) {
                Ok(stream) => {
                    if index == 0 {
                        info!(source = %shown, "Connected to camera stream");
                    } else {
                        info!(source = %shown, "Connected to camera stream using fallback address");
                    }
                    metrics::counter!("camwatch_connection_attempts_total", "result" => "connected")
                        .increment(1);
                    metrics::gauge!("camwatch_connected").set(1.0);
                    self.connection.mark_connected(address.clone());
                    self.sink.set_source(Some(shown));
                    self.stream = Some(stream);
                    return true;
                }
                Err(err) => {
                    warn!(source = %shown, "Could not open camera stream: {err}");
                }
            }
        }

        error!(
            "Failed to connect to any camera address; retrying in {}s",
            self.settings.retry_interval.as_secs()
        );
        metrics::counter!("camwatch_connection_attempts_total", "result" => "failed").increment(1);
        self.publish_connection_failed();
        false
    }

    fn drop_stream(&mut self) {
        self.stream = None;
        if self.connection.state() == ConnectionState::Connected {
            self.connection.mark_lost();
            self.sink.set_source(None);
            metrics::gauge!("camwatch_connected").set(0.0);
        }
    }

    fn publish_connection_failed(&mut self) {
        if self.failure_frame.is_none() {
            let lines = [
                "Camera connection failed".to_string(),
                format!("Retrying in {}s", self.settings.retry_interval.as_secs()),
            ];
            self.failure_frame = self.render_notice(&lines);
        }
        if let Some(jpeg) = self.failure_frame.clone() {
            self.publish_placeholder(jpeg);
        }
    }

    fn publish_connection_lost(&mut self) {
        if self.lost_frame.is_none() {
            let lines = [
                "Camera connection lost".to_string(),
                "Reconnecting".to_string(),
            ];
            self.lost_frame = self.render_notice(&lines);
        }
        if let Some(jpeg) = self.lost_frame.clone() {
            self.publish_placeholder(jpeg);
        }
    }

    fn render_notice(&self, lines: &[String]) -> Option<Bytes> {
        match render_placeholder(
            self.settings.placeholder_size,
            lines,
            self.settings.jpeg_quality,
        ) {
            Ok(jpeg) => Some(jpeg),
            Err(err) => {
                error!("Failed to render connection placeholder: {err:#}");
                None
            }
        }
    }

    fn publish_placeholder(&mut self, jpeg: Bytes) {
        self.sink.publish(jpeg, FrameKind::Placeholder, None, None);
        metrics::counter!("camwatch_frames_total", "kind" => "placeholder").increment(1);
    }

    /// Read one frame and publish it, analysed or not.
    fn process_next_frame(&mut self, now: Instant) -> Result<FrameKind> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("no active stream"))?;
        let frame = stream.read_frame()?;
        frame.validate()?;

        if self.detector.is_some() && self.throttle.is_due(now) {
            self.analyze(&frame, now)
        } else {
            self.throttle.record_skipped_frame();
            self.publish_passthrough(&frame)
        }
    }

    fn analyze(&mut self, frame: &Frame, now: Instant) -> Result<FrameKind> {
        let _analysis_guard = tracing::info_span!("acquisition.analysis").entered();
        debug!(
            frames_since_last = self.throttle.frames_since_last(),
            secs_since_last = ?self.throttle.since_last(now).map(|d| d.as_secs()),
            "Analyzing frame"
        );

        let detector = self
            .detector
            .as_mut()
            .ok_or_else(|| anyhow!("no detector loaded"))?;
        let started = Instant::now();
        let result = detector.detect(frame);
        metrics::histogram!("camwatch_analysis_seconds").record(started.elapsed().as_secs_f64());
        self.throttle.record_analysis(now);

        let detections = match result {
            Ok(detections) => detections,
            Err(err) => {
                warn!("Detection failed: {err:#}; publishing frame without analysis");
                metrics::counter!("camwatch_analysis_errors_total").increment(1);
                return self.publish_passthrough(frame);
            }
        };

        let (kept, counts) = filter_detections(detections, &self.settings.categories);
        let mut image = frame_to_image(frame)?;
        annotate_detections(&mut image, &kept, &counts);
        let jpeg = encode_jpeg(&image, self.settings.jpeg_quality)
            .context("Failed to encode annotated frame")?;

        info!("Detection counts updated: {}", counts.summary());
        self.sink.publish(
            jpeg,
            FrameKind::Annotated,
            Some(counts),
            Some(Local::now()),
        );
        metrics::counter!("camwatch_frames_total", "kind" => "annotated").increment(1);
        Ok(FrameKind::Annotated)
    }

    fn publish_passthrough(&mut self, frame: &Frame) -> Result<FrameKind> {
        let jpeg = encode_frame(frame, self.settings.jpeg_quality)
            .context("Failed to encode frame")?;
        self.sink.publish(jpeg, FrameKind::Live, None, None);
        metrics::counter!("camwatch_frames_total", "kind" => "live").increment(1);
        Ok(FrameKind::Live)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashSet, VecDeque},
        sync::Mutex,
    };

    use image::ImageFormat;
    use ml_core::{BoundingBox, Detection};
    use video_ingest::{CaptureError, FrameFormat};

    use super::*;
    use crate::vision::sink::{FrameSink, frame_sink};

    const PRIMARY: &str = "http://cam/livestream.cgi";
    const FALLBACK_A: &str = "rtsp://cam/live";
    const FALLBACK_B: &str = "http://cam/video";

    #[derive(Clone, Default)]
    struct FakeSource {
        reachable: Arc<Mutex<HashSet<String>>>,
        frames_per_stream: Option<usize>,
        truncated_frames: bool,
        attempts: Arc<Mutex<Vec<(String, Instant)>>>,
        shutdown_on_open: Option<Arc<AtomicBool>>,
    }

    impl FakeSource {
        fn reachable(addresses: &[&str]) -> Self {
            let source = Self::default();
            source
                .reachable
                .lock()
                .unwrap()
                .extend(addresses.iter().map(|a| a.to_string()));
            source
        }

        fn set_reachable(&self, addresses: &[&str]) {
            let mut reachable = self.reachable.lock().unwrap();
            reachable.clear();
            reachable.extend(addresses.iter().map(|a| a.to_string()));
        }

        fn attempted(&self) -> Vec<String> {
            self.attempts
                .lock()
                .unwrap()
                .iter()
                .map(|(address, _)| address.clone())
                .collect()
        }
    }

    impl VideoSource for FakeSource {
        fn open(&self, address: &str) -> Result<Box<dyn FrameStream>, CaptureError> {
            self.attempts
                .lock()
                .unwrap()
                .push((address.to_string(), Instant::now()));
            if let Some(shutdown) = &self.shutdown_on_open {
                shutdown.store(true, Ordering::SeqCst);
            }
            if self.reachable.lock().unwrap().contains(address) {
                Ok(Box::new(FakeStream {
                    remaining: self.frames_per_stream,
                    truncated: self.truncated_frames,
                }))
            } else {
                Err(CaptureError::Open {
                    uri: address.to_string(),
                })
            }
        }
    }

    struct FakeStream {
        remaining: Option<usize>,
        truncated: bool,
    }

    impl FrameStream for FakeStream {
        fn read_frame(&mut self) -> Result<Frame, CaptureError> {
            if let Some(remaining) = self.remaining.as_mut() {
                if *remaining == 0 {
                    return Err(CaptureError::Closed);
                }
                *remaining -= 1;
            }
            let len = if self.truncated { 32 * 24 } else { 32 * 24 * 3 };
            Ok(Frame {
                data: vec![90; len],
                width: 32,
                height: 24,
                timestamp_ms: 0,
                format: FrameFormat::Bgr8,
            })
        }
    }

    struct ScriptedDetector {
        responses: VecDeque<Result<Vec<Detection>>>,
        calls: Arc<Mutex<usize>>,
    }

    impl Detector for ScriptedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            *self.calls.lock().unwrap() += 1;
            self.responses.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn detection(category: &str) -> Detection {
        Detection {
            category: category.to_string(),
            bbox: BoundingBox {
                left: 2.0,
                top: 2.0,
                right: 12.0,
                bottom: 12.0,
            },
            confidence: 0.75,
        }
    }

    fn settings() -> AcquisitionSettings {
        AcquisitionSettings {
            addresses: vec![PRIMARY.into(), FALLBACK_A.into(), FALLBACK_B.into()],
            retry_interval: Duration::from_secs(30),
            analysis_interval: Duration::from_secs(60),
            max_frames_without_analysis: 500,
            frame_pause: Duration::from_millis(1),
            idle_poll: Duration::from_millis(5),
            categories: CategorySet::default(),
            jpeg_quality: 80,
            placeholder_size: (64, 48),
        }
    }

    fn build(
        source: FakeSource,
        detector: Option<Box<dyn Detector>>,
        settings: AcquisitionSettings,
    ) -> (AcquisitionLoop<FakeSource>, FrameSink, Arc<AtomicBool>) {
        let (writer, sink) = frame_sink(&settings.categories);
        let shutdown = Arc::new(AtomicBool::new(false));
        let acquisition = AcquisitionLoop::new(source, detector, settings, writer, shutdown.clone());
        (acquisition, sink, shutdown)
    }

    #[test]
    fn connection_attempts_are_rate_limited() {
        let start = Instant::now();
        let mut connection = Connection::new(Duration::from_secs(30));
        assert!(connection.attempt_due(start));

        connection.mark_attempt(start);
        assert!(!connection.attempt_due(start + Duration::from_secs(30)));
        assert_eq!(
            connection.until_next_attempt(start + Duration::from_secs(10)),
            Duration::from_secs(20)
        );
        assert!(connection.attempt_due(start + Duration::from_millis(30_001)));

        connection.mark_connected(PRIMARY.into());
        assert!(!connection.attempt_due(start + Duration::from_secs(120)));

        connection.mark_attempt(start + Duration::from_secs(120));
        connection.mark_lost();
        assert_eq!(connection.state(), ConnectionState::Disconnected);
        assert!(connection.attempt_due(start + Duration::from_secs(121)));
    }

    #[test]
    fn failed_connect_tries_every_address_and_publishes_placeholder() {
        let source = FakeSource::default();
        let (mut acquisition, sink, _) = build(source.clone(), None, settings());
        let start = Instant::now();

        assert_eq!(acquisition.step(start), Step::ConnectFailed);

        assert_eq!(source.attempted(), vec![PRIMARY, FALLBACK_A, FALLBACK_B]);
        assert_eq!(acquisition.connection().state(), ConnectionState::Disconnected);
        let snapshot = sink.snapshot();
        assert_eq!(snapshot.kind, Some(FrameKind::Placeholder));
        let jpeg = snapshot.frame.expect("placeholder frame");
        assert!(image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).is_ok());
    }

    #[test]
    fn retries_wait_for_the_retry_interval() {
        let source = FakeSource::default();
        let (mut acquisition, _sink, _) = build(source.clone(), None, settings());
        let start = Instant::now();

        assert_eq!(acquisition.step(start), Step::ConnectFailed);
        assert_eq!(acquisition.step(start + Duration::from_secs(1)), Step::Waiting);
        assert_eq!(acquisition.step(start + Duration::from_secs(29)), Step::Waiting);
        assert_eq!(source.attempted().len(), 3);

        assert_eq!(
            acquisition.step(start + Duration::from_secs(31)),
            Step::ConnectFailed
        );
        assert_eq!(source.attempted().len(), 6);
    }

    #[test]
    fn running_loop_spaces_attempts_by_retry_interval() {
        let source = FakeSource::default();
        let mut settings = settings();
        settings.addresses = vec![PRIMARY.into()];
        settings.retry_interval = Duration::from_millis(40);
        settings.idle_poll = Duration::from_millis(5);
        let (acquisition, sink, shutdown) = build(source.clone(), None, settings);

        let handle = thread::spawn(move || acquisition.run());
        thread::sleep(Duration::from_millis(220));
        shutdown.store(true, Ordering::SeqCst);
        handle.join().unwrap();

        let attempts = source.attempts.lock().unwrap().clone();
        assert!(attempts.len() >= 2, "expected repeated attempts");
        for pair in attempts.windows(2) {
            assert!(pair[1].1.duration_since(pair[0].1) >= Duration::from_millis(39));
        }
        assert_eq!(sink.snapshot().kind, Some(FrameKind::Placeholder));
    }

    #[test]
    fn first_working_fallback_is_used_and_kept() {
        let source = FakeSource::reachable(&[FALLBACK_A, FALLBACK_B]);
        let (mut acquisition, sink, _) = build(source.clone(), None, settings());
        let start = Instant::now();

        assert_eq!(acquisition.step(start), Step::Connected);
        assert_eq!(acquisition.connection().state(), ConnectionState::Connected);
        assert_eq!(acquisition.connection().address(), Some(FALLBACK_A));
        assert_eq!(sink.snapshot().source.as_deref(), Some(FALLBACK_A));

        for i in 1..=5 {
            let now = start + Duration::from_secs(40 * i);
            assert_eq!(acquisition.step(now), Step::Published(FrameKind::Live));
        }
        assert_eq!(source.attempted(), vec![PRIMARY, FALLBACK_A]);
    }

    #[test]
    fn read_failure_disconnects_and_reconnect_starts_with_primary() {
        let mut source = FakeSource::reachable(&[FALLBACK_A]);
        source.frames_per_stream = Some(1);
        let (mut acquisition, sink, _) = build(source.clone(), None, settings());
        let start = Instant::now();

        assert_eq!(acquisition.step(start), Step::Connected);
        assert_eq!(
            acquisition.step(start + Duration::from_millis(10)),
            Step::Published(FrameKind::Live)
        );
        assert_eq!(acquisition.step(start + Duration::from_millis(20)), Step::Lost);
        assert_eq!(acquisition.connection().state(), ConnectionState::Disconnected);
        assert!(sink.snapshot().source.is_none());

        assert_eq!(acquisition.step(start + Duration::from_secs(1)), Step::Connected);
        assert_eq!(
            source.attempted(),
            vec![PRIMARY, FALLBACK_A, PRIMARY, FALLBACK_A]
        );
    }

    #[test]
    fn lost_stream_replaces_the_last_frame_and_retries_at_once() {
        let mut source = FakeSource::reachable(&[PRIMARY]);
        source.frames_per_stream = Some(1);
        let (mut acquisition, sink, _) = build(source.clone(), None, settings());
        let start = Instant::now();

        acquisition.step(start);
        assert_eq!(
            acquisition.step(start + Duration::from_secs(1)),
            Step::Published(FrameKind::Live)
        );
        assert_eq!(acquisition.step(start + Duration::from_secs(5)), Step::Lost);

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.kind, Some(FrameKind::Placeholder));
        assert!(snapshot.source.is_none());
        let jpeg = snapshot.frame.expect("placeholder frame");
        assert!(image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg).is_ok());

        source.set_reachable(&[]);
        assert_eq!(
            acquisition.step(start + Duration::from_secs(6)),
            Step::ConnectFailed
        );
        assert_eq!(source.attempted().len(), 4);
        assert_eq!(acquisition.step(start + Duration::from_secs(29)), Step::Waiting);
        assert_eq!(source.attempted().len(), 4);
        assert_eq!(sink.snapshot().kind, Some(FrameKind::Placeholder));
    }

    #[test]
    fn malformed_frame_drops_the_stream() {
        let mut source = FakeSource::reachable(&[PRIMARY]);
        source.truncated_frames = true;
        let (mut acquisition, sink, _) = build(source, None, settings());
        let start = Instant::now();

        assert_eq!(acquisition.step(start), Step::Connected);
        assert_eq!(acquisition.step(start), Step::Lost);
        assert_eq!(acquisition.connection().state(), ConnectionState::Disconnected);
        assert_eq!(sink.snapshot().kind, Some(FrameKind::Placeholder));
    }

    #[test]
    fn shutdown_interrupts_a_connection_attempt() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let source = FakeSource {
            shutdown_on_open: Some(shutdown.clone()),
            ..FakeSource::default()
        };
        let settings = settings();
        let (writer, sink) = frame_sink(&settings.categories);
        let mut acquisition =
            AcquisitionLoop::new(source.clone(), None, settings, writer, shutdown);

        assert_eq!(acquisition.step(Instant::now()), Step::ConnectFailed);
        assert_eq!(source.attempted(), vec![PRIMARY]);
        assert!(sink.snapshot().frame.is_none());
    }

    #[test]
    fn analysis_runs_on_first_frame_then_waits_for_throttle() {
        let calls = Arc::new(Mutex::new(0));
        let detector = ScriptedDetector {
            responses: VecDeque::from(vec![
                Ok(vec![
                    detection("person"),
                    detection("bird"),
                    detection("bird"),
                    detection("dog"),
                ]),
                Ok(Vec::new()),
            ]),
            calls: calls.clone(),
        };
        let mut settings = settings();
        settings.max_frames_without_analysis = 3;
        let source = FakeSource::reachable(&[PRIMARY]);
        let (mut acquisition, sink, _) = build(source, Some(Box::new(detector)), settings);
        let start = Instant::now();

        assert_eq!(acquisition.step(start), Step::Connected);
        assert_eq!(acquisition.step(start), Step::Published(FrameKind::Annotated));
        let snapshot = sink.snapshot();
        assert_eq!(snapshot.counts.get("Birds"), Some(2));
        assert_eq!(snapshot.counts.get("Persons"), Some(1));
        assert!(snapshot.last_analysis.is_some());
        assert_eq!(acquisition.throttle.frames_since_last(), 0);

        for _ in 0..3 {
            assert_eq!(acquisition.step(start), Step::Published(FrameKind::Live));
        }
        let snapshot = sink.snapshot();
        assert_eq!(snapshot.kind, Some(FrameKind::Live));
        assert_eq!(snapshot.counts.get("Birds"), Some(2));
        assert_eq!(*calls.lock().unwrap(), 1);

        assert_eq!(acquisition.step(start), Step::Published(FrameKind::Annotated));
        assert_eq!(*calls.lock().unwrap(), 2);
        assert_eq!(sink.snapshot().counts.get("Birds"), Some(0));
        assert_eq!(acquisition.throttle.frames_since_last(), 0);
    }

    #[test]
    fn interval_and_frame_budget_together_run_analysis_once() {
        let calls = Arc::new(Mutex::new(0));
        let detector = ScriptedDetector {
            responses: VecDeque::new(),
            calls: calls.clone(),
        };
        let mut settings = settings();
        settings.max_frames_without_analysis = 2;
        let source = FakeSource::reachable(&[PRIMARY]);
        let (mut acquisition, _sink, _) = build(source, Some(Box::new(detector)), settings);
        let start = Instant::now();

        acquisition.step(start);
        acquisition.step(start);
        acquisition.step(start);
        acquisition.step(start);
        assert_eq!(*calls.lock().unwrap(), 1);

        let late = start + Duration::from_secs(90);
        assert_eq!(acquisition.step(late), Step::Published(FrameKind::Annotated));
        assert_eq!(acquisition.step(late), Step::Published(FrameKind::Live));
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn missing_detector_streams_raw_frames_with_zero_counts() {
        let source = FakeSource::reachable(&[PRIMARY]);
        let (mut acquisition, sink, _) = build(source, None, settings());
        let start = Instant::now();

        acquisition.step(start);
        for _ in 0..10 {
            assert_eq!(acquisition.step(start), Step::Published(FrameKind::Live));
        }
        let snapshot = sink.snapshot();
        assert_eq!(snapshot.counts.get("Birds"), Some(0));
        assert_eq!(snapshot.counts.get("Persons"), Some(0));
        assert!(snapshot.last_analysis.is_none());
    }

    #[test]
    fn detector_failure_keeps_connection_and_stale_counts() {
        let calls = Arc::new(Mutex::new(0));
        let detector = ScriptedDetector {
            responses: VecDeque::from(vec![
                Ok(vec![detection("person")]),
                Err(anyhow!("model exploded")),
            ]),
            calls: calls.clone(),
        };
        let source = FakeSource::reachable(&[PRIMARY]);
        let (mut acquisition, sink, _) = build(source, Some(Box::new(detector)), settings());
        let start = Instant::now();

        acquisition.step(start);
        acquisition.step(start);
        let analyzed_at = sink.snapshot().last_analysis;

        let late = start + Duration::from_secs(61);
        assert_eq!(acquisition.step(late), Step::Published(FrameKind::Live));
        assert_eq!(acquisition.connection().state(), ConnectionState::Connected);
        let snapshot = sink.snapshot();
        assert_eq!(snapshot.counts.get("Persons"), Some(1));
        assert_eq!(snapshot.last_analysis, analyzed_at);
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn shutdown_stops_the_loop() {
        let source = FakeSource::reachable(&[PRIMARY]);
        let (acquisition, sink, shutdown) = build(source, None, settings());

        let handle = thread::spawn(move || acquisition.run());
        thread::sleep(Duration::from_millis(30));
        shutdown.store(true, Ordering::SeqCst);
        handle.join().unwrap();

        assert_eq!(sink.snapshot().kind, Some(FrameKind::Live));
        assert!(sink.snapshot().source.is_none());
    }
}
