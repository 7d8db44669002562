//! Per-viewer MJPEG sessions.

use std::time::Duration;

use actix_web::web::Bytes;
use async_stream::stream;
use futures_util::Stream;

use crate::vision::sink::FrameSink;

/// Multipart boundary shared with the `Content-Type` header.
pub(crate) const BOUNDARY: &str = "frame";

/// Hands every viewer its own paced sequence of frames from the sink.
#[derive(Clone)]
pub(crate) struct StreamPublisher {
    sink: FrameSink,
    interval: Duration,
    placeholder: Bytes,
}

impl StreamPublisher {
    /// `placeholder` is sent while the sink holds no frame.
    pub(crate) fn new(sink: FrameSink, interval: Duration, placeholder: Bytes) -> Self {
        Self {
            sink,
            interval,
            placeholder,
        }
    }

    /// Latest frame, or the placeholder when there is none.
    pub(crate) fn current_frame(&self) -> Bytes {
        self.sink
            .snapshot()
            .frame
            .unwrap_or_else(|| self.placeholder.clone())
    }

    /// Endless multipart stream for one viewer; ends when the response is dropped.
    pub(crate) fn session(&self) -> impl Stream<Item = Result<Bytes, actix_web::Error>> + 'static {
        let publisher = self.clone();
        stream! {
            let _viewer = ViewerGuard::register();
            loop {
                yield Ok::<Bytes, actix_web::Error>(multipart_part(&publisher.current_frame()));
                actix_web::rt::time::sleep(publisher.interval).await;
            }
        }
    }
}

/// One complete multipart part carrying `jpeg`.
pub(crate) fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );
    let mut payload = Vec::with_capacity(header.len() + jpeg.len() + 2);
    payload.extend_from_slice(header.as_bytes());
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

struct ViewerGuard;

impl ViewerGuard {
    fn register() -> Self {
        metrics::gauge!("camwatch_viewers").increment(1.0);
        tracing::debug!("Viewer connected");
        Self
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        metrics::gauge!("camwatch_viewers").decrement(1.0);
        tracing::debug!("Viewer disconnected");
    }
}
