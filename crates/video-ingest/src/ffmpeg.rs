use std::{
    io::{self, Read},
    path::PathBuf,
    process::{Child, Command, Stdio},
    thread,
    time::Duration,
};

use anyhow::anyhow;
use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use tracing::{debug, warn};

use crate::{
    FrameStream, VideoSource,
    types::{CaptureError, Frame, FrameFormat},
};

const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);
const FRAME_QUEUE_SIZE: usize = 2;

/// [`VideoSource`] that decodes upstream addresses with an FFmpeg subprocess.
///
/// FFmpeg scales every frame to `target_size` and writes raw BGR24 to stdout,
/// which a reader thread slices into [`Frame`]s. An address only counts as
/// opened once its first frame arrives within the open timeout.
#[derive(Clone, Debug)]
pub struct FfmpegSource {
    program: PathBuf,
    target_size: (i32, i32),
    open_timeout: Duration,
    read_timeout: Duration,
}

impl FfmpegSource {
    pub fn new(target_size: (i32, i32)) -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            target_size,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Use a different FFmpeg binary.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_timeouts(mut self, open_timeout: Duration, read_timeout: Duration) -> Self {
        self.open_timeout = open_timeout;
        self.read_timeout = read_timeout;
        self
    }

    fn command(&self, address: &str) -> Command {
        let scale_arg = format!("scale={}:{}", self.target_size.0, self.target_size.1);
        let io_timeout_us = self.read_timeout.as_micros().to_string();

        let mut cmd = Command::new(&self.program);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-fflags")
            .arg("nobuffer")
            .arg("-flags")
            .arg("low_delay");

        if let Some(index) = parse_device_index(address) {
            cmd.arg("-f")
                .arg("video4linux2")
                .arg("-i")
                .arg(format!("/dev/video{index}"));
        } else if address.starts_with("rtsp://") || address.starts_with("rtsps://") {
            cmd.arg("-rtsp_transport")
                .arg("tcp")
                .arg("-timeout")
                .arg(&io_timeout_us)
                .arg("-i")
                .arg(address);
        } else if address.starts_with("http://") || address.starts_with("https://") {
            cmd.arg("-rw_timeout")
                .arg(&io_timeout_us)
                .arg("-i")
                .arg(address);
        } else {
            cmd.arg("-i").arg(address);
        }

        cmd.arg("-an")
            .arg("-vf")
            .arg(&scale_arg)
            .arg("-pix_fmt")
            .arg("bgr24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-");

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        cmd
    }
}

impl VideoSource for FfmpegSource {
    fn open(&self, address: &str) -> Result<Box<dyn FrameStream>, CaptureError> {
        let mut child = self.command(address).spawn().map_err(|err| {
            warn!("video-ingest: failed to spawn {}: {err}", self.program.display());
            CaptureError::Open {
                uri: address.to_string(),
            }
        })?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(CaptureError::Other(anyhow!("failed to capture ffmpeg stdout")));
        };

        let rx = match spawn_frame_reader(stdout, self.target_size) {
            Ok(rx) => rx,
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(err);
            }
        };

        let mut stream = FfmpegStream {
            rx,
            pending: None,
            read_timeout: self.read_timeout,
            child: Some(child),
        };

        match stream.rx.recv_timeout(self.open_timeout) {
            Ok(Ok(frame)) => {
                stream.pending = Some(frame);
                Ok(Box::new(stream))
            }
            Ok(Err(err)) => {
                debug!("video-ingest: {address} ended before its first frame: {err}");
                Err(CaptureError::Open {
                    uri: address.to_string(),
                })
            }
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::OpenTimeout {
                uri: address.to_string(),
                timeout: self.open_timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::Open {
                uri: address.to_string(),
            }),
        }
    }
}

/// Frames decoded by one FFmpeg child. Dropping the stream kills the child,
/// which closes its stdout and lets the reader thread exit.
struct FfmpegStream {
    rx: Receiver<Result<Frame, CaptureError>>,
    pending: Option<Frame>,
    read_timeout: Duration,
    child: Option<Child>,
}

impl FrameStream for FfmpegStream {
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        if let Some(frame) = self.pending.take() {
            return Ok(frame);
        }
        match self.rx.recv_timeout(self.read_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::ReadTimeout(self.read_timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::Closed),
        }
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn spawn_frame_reader(
    stdout: impl Read + Send + 'static,
    target_size: (i32, i32),
) -> Result<Receiver<Result<Frame, CaptureError>>, CaptureError> {
    let (tx, rx) = bounded(FRAME_QUEUE_SIZE);
    thread::Builder::new()
        .name("ffmpeg-reader".into())
        .spawn(move || {
            if let Err(err) = ffmpeg_loop(stdout, target_size, &tx) {
                let _ = tx.send(Err(err));
            }
        })
        .map_err(|err| CaptureError::Other(err.into()))?;
    Ok(rx)
}

/// Slice raw BGR24 output into frames until the pipe closes or the receiver
/// goes away.
fn ffmpeg_loop(
    mut stdout: impl Read,
    target_size: (i32, i32),
    tx: &Sender<Result<Frame, CaptureError>>,
) -> Result<(), CaptureError> {
    let (width, height) = target_size;
    if width <= 0 || height <= 0 {
        return Err(CaptureError::Decode(format!(
            "invalid target size {width}x{height}"
        )));
    }
    let frame_bytes = (width as usize) * (height as usize) * FrameFormat::Bgr8.bytes_per_pixel();

    loop {
        let mut data = vec![0u8; frame_bytes];
        match stdout.read_exact(&mut data) {
            Ok(()) => {
                let frame = Frame {
                    data,
                    width,
                    height,
                    timestamp_ms: Utc::now().timestamp_millis(),
                    format: FrameFormat::Bgr8,
                };
                if tx.send(Ok(frame)).is_err() {
                    return Ok(());
                }
            }
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(CaptureError::Closed);
            }
            Err(err) => return Err(CaptureError::Other(err.into())),
        }
    }
}

/// Parse a `/dev/videoX` style URI or bare index and return the device index.
pub fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            return stripped.parse::<i32>().ok();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn device_index_parsing() {
        assert_eq!(parse_device_index("0"), Some(0));
        assert_eq!(parse_device_index("/dev/video2"), Some(2));
        assert_eq!(parse_device_index("/dev/video"), None);
        assert_eq!(parse_device_index("rtsp://cam/live"), None);
    }

    #[test]
    fn rtsp_addresses_use_tcp_transport() {
        let source = FfmpegSource::new((640, 480));
        let args = args_of(&source.command("rtsp://cam/live"));
        let transport = args.iter().position(|a| a == "-rtsp_transport").unwrap();
        assert_eq!(args[transport + 1], "tcp");
        assert!(args.contains(&"scale=640:480".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn http_addresses_get_io_timeout() {
        let source = FfmpegSource::new((320, 240))
            .with_timeouts(Duration::from_secs(1), Duration::from_secs(2));
        let args = args_of(&source.command("http://cam/video"));
        let timeout = args.iter().position(|a| a == "-rw_timeout").unwrap();
        assert_eq!(args[timeout + 1], "2000000");
    }

    #[test]
    fn devices_use_v4l2_input() {
        let source = FfmpegSource::new((320, 240));
        let args = args_of(&source.command("/dev/video1"));
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "video4linux2"));
        assert!(args.contains(&"/dev/video1".to_string()));
    }

    #[test]
    fn loop_emits_whole_frames_then_reports_closed() {
        let frame_len = 2 * 2 * 3;
        let mut bytes = vec![7u8; frame_len * 2];
        bytes.extend_from_slice(&[1, 2, 3]);
        let (tx, rx) = bounded(4);

        let result = ffmpeg_loop(Cursor::new(bytes), (2, 2), &tx);

        assert!(matches!(result, Err(CaptureError::Closed)));
        let frames: Vec<_> = rx.try_iter().collect();
        assert_eq!(frames.len(), 2);
        for frame in frames {
            let frame = frame.unwrap();
            assert_eq!(frame.data.len(), frame_len);
            assert!(frame.validate().is_ok());
        }
    }

    #[test]
    fn stream_returns_pending_frame_then_times_out() {
        let (tx, rx) = bounded(1);
        let first = Frame {
            data: vec![0; 3],
            width: 1,
            height: 1,
            timestamp_ms: 1,
            format: FrameFormat::Bgr8,
        };
        let mut stream = FfmpegStream {
            rx,
            pending: Some(first),
            read_timeout: Duration::from_millis(10),
            child: None,
        };

        assert_eq!(stream.read_frame().unwrap().timestamp_ms, 1);
        assert!(matches!(
            stream.read_frame(),
            Err(CaptureError::ReadTimeout(_))
        ));
        drop(tx);
        assert!(matches!(stream.read_frame(), Err(CaptureError::Closed)));
    }

    #[test]
    fn missing_binary_fails_to_open() {
        let source = FfmpegSource::new((2, 2)).with_program("camwatch-no-such-ffmpeg");
        assert!(matches!(
            source.open("rtsp://cam/live"),
            Err(CaptureError::Open { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn process_without_output_fails_to_open() {
        let source = FfmpegSource::new((2, 2))
            .with_program("true")
            .with_timeouts(Duration::from_secs(5), Duration::from_secs(1));
        assert!(matches!(
            source.open("http://cam/video"),
            Err(CaptureError::Open { .. })
        ));
    }
}
