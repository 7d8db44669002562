//! Actix Web server exposing the viewer page, the MJPEG feed, and the status APIs.
//!
//! The server runs on a dedicated thread so the acquisition loop never shares
//! a runtime with viewer sessions. Every handler only reads the frame sink.

use std::net::TcpListener;

use actix_web::{App, HttpResponse, HttpServer, http::header, web};
use anyhow::{Context, Result};
use chrono::Local;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::vision::{
    status::StatusReporter,
    stream::{BOUNDARY, StreamPublisher},
    telemetry,
};

/// Shared state backing HTTP handlers.
#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) publisher: StreamPublisher,
    pub(crate) status: StatusReporter,
}

/// Handle for the HTTP server thread.
pub(crate) struct HttpServerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl HttpServerHandle {
    /// Whether the server thread has exited on its own.
    pub(crate) fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .is_none_or(|handle| handle.is_finished())
    }

    /// Signal the server to stop and block until the thread exits.
    pub(crate) fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Register every route on `cfg`.
pub(crate) fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index_route))
        .route("/video_feed", web::get().to(video_feed_handler))
        .route("/frame.jpg", web::get().to(frame_handler))
        .route("/detection_data", web::get().to(detection_data_handler))
        .route("/data", web::get().to(data_handler))
        .route("/camera_status", web::get().to(camera_status_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

/// Serve on `listener` from a dedicated thread until stopped.
pub(crate) fn spawn_http_server(
    listener: TcpListener,
    state: ServerState,
) -> Result<HttpServerHandle> {
    let address = listener
        .local_addr()
        .context("Failed to read HTTP listener address")?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = telemetry::spawn_thread("camwatch-http", move || {
        if let Err(err) = actix_web::rt::System::new().block_on(async move {
            let server = HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(state.clone()))
                    .configure(routes)
            })
            .listen(listener)?
            .run();

            let srv_handle = server.handle();
            actix_web::rt::spawn(async move {
                let _ = shutdown_rx.await;
                srv_handle.stop(true).await;
            });

            info!("Serving viewers on http://{address}");
            server.await
        }) {
            error!("HTTP server error: {err}");
        }
    })
    .context("Failed to spawn HTTP server thread")?;

    Ok(HttpServerHandle {
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
    })
}

/// Serve the viewer page.
async fn index_route() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(crate::html::INDEX_HTML)
}

/// Stream the MJPEG feed over a multipart response.
async fn video_feed_handler(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((
            header::CACHE_CONTROL,
            "no-cache, no-store, must-revalidate",
        ))
        .insert_header((header::PRAGMA, "no-cache"))
        .insert_header((header::EXPIRES, "0"))
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
        ))
        .streaming(state.publisher.session())
}

/// Latest frame as a single JPEG.
async fn frame_handler(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .content_type("image/jpeg")
        .body(state.publisher.current_frame())
}

async fn detection_data_handler(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok().json(state.status.counts())
}

async fn data_handler(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok().json(state.status.report(Local::now()))
}

async fn camera_status_handler(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok().json(state.status.camera_status())
}

/// Prometheus text exposition.
async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}
