//! Process supervisor tying together acquisition, the frame sink, and the
//! HTTP server.
//!
//! The acquisition loop and the server each get their own thread; this thread
//! only waits for Ctrl+C (or for the server to die) and then tears both down.

use std::{
    net::TcpListener,
    sync::{
        Arc, Once,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use actix_web::web::Bytes;
use anyhow::{Context, Result, anyhow};
use tracing::{error, info, warn};
use video_ingest::FfmpegSource;

use crate::vision::{
    CamwatchConfig,
    acquisition::{AcquisitionLoop, AcquisitionSettings},
    encoding::render_placeholder,
    processing::load_detector,
    server::{ServerState, spawn_http_server},
    sink::frame_sink,
    status::{StatusReporter, display_source},
    stream::StreamPublisher,
    telemetry,
};

const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Run until Ctrl+C. Only startup failures are returned.
pub fn run(config: CamwatchConfig) -> Result<()> {
    static CTRL_HANDLER: Once = Once::new();

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler(move || {
            handler_shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    telemetry::init_metrics_recorder()?;
    let run_span = tracing::info_span!(
        "camwatch",
        source = %display_source(&config.primary_uri),
        fallbacks = config.fallback_uris.len(),
        width = config.width,
        height = config.height,
        bind = %config.bind
    );
    let _run_span_guard = run_span.enter();

    let listener = TcpListener::bind(config.bind)
        .with_context(|| format!("Failed to bind HTTP listener on {}", config.bind))?;

    let disconnected = disconnected_placeholder(&config)?;

    let (writer, sink) = frame_sink(&config.categories);
    let detector = load_detector(&config);
    let source = FfmpegSource::new((config.width, config.height))
        .with_timeouts(config.open_timeout, config.read_timeout);
    let acquisition = AcquisitionLoop::new(
        source,
        detector,
        AcquisitionSettings::from(&config),
        writer,
        shutdown.clone(),
    );
    let acquisition_handle = telemetry::spawn_thread("camwatch-acquisition", move || {
        acquisition.run()
    })
    .context("Failed to spawn acquisition thread")?;

    let state = ServerState {
        publisher: StreamPublisher::new(sink.clone(), config.viewer_interval, disconnected),
        status: StatusReporter::new(sink, config.analysis_interval),
    };
    let server = match spawn_http_server(listener, state) {
        Ok(server) => server,
        Err(err) => {
            shutdown.store(true, Ordering::SeqCst);
            let _ = acquisition_handle.join();
            return Err(err).context("Failed to start HTTP server");
        }
    };

    info!("Running camwatch; press Ctrl+C to stop");
    while !shutdown.load(Ordering::Relaxed) {
        if server.is_finished() {
            error!("HTTP server exited unexpectedly; shutting down");
            shutdown.store(true, Ordering::SeqCst);
            break;
        }
        thread::sleep(SHUTDOWN_POLL);
    }

    info!("Shutting down");
    server.stop();
    acquisition_handle
        .join()
        .map_err(|_| anyhow!("Acquisition thread panicked"))?;
    Ok(())
}

/// Frame viewers receive before the acquisition loop publishes anything.
///
/// Rendered before any thread starts so a failure leaves nothing to clean up.
fn disconnected_placeholder(config: &CamwatchConfig) -> Result<Bytes> {
    render_placeholder(
        (config.width as u32, config.height as u32),
        &["Camera disconnected".to_string()],
        config.jpeg_quality,
    )
    .context("Failed to render disconnected placeholder")
}
