use std::{
    io,
    path::Path,
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use tokio::{
    io::AsyncReadExt,
    process::{Child, Command},
    sync::{Mutex, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::AppConfig,
    core::{errors::DeviceError, state::Facing},
};

use super::{
    jpeg::{MjpegSplitter, frame_dimensions},
    traits::{CameraBackend, StreamRequest, VideoTrack},
};

const STDERR_TAIL_BYTES: usize = 4096;

/// Streams V4L2 devices through `ffmpeg` as multipart MJPEG.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    back_device: Option<String>,
    front_device: Option<String>,
    input_format: String,
    first_frame_timeout: Duration,
}

impl FfmpegBackend {
    pub fn new(
        back_device: Option<String>,
        front_device: Option<String>,
        input_format: String,
        first_frame_timeout: Duration,
    ) -> Self {
        Self {
            back_device,
            front_device,
            input_format,
            first_frame_timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.camera_back_device.clone(),
            config.camera_front_device.clone(),
            config.camera_input_format.clone(),
            config.first_frame_timeout,
        )
    }

    fn device_for(&self, facing: Facing) -> Option<&str> {
        match facing {
            Facing::Back => self.back_device.as_deref(),
            Facing::Front => self.front_device.as_deref(),
        }
    }

    fn stream_args(&self, device: &str, request: &StreamRequest) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "v4l2",
            "-input_format",
            &self.input_format,
        ]
        .into_iter()
        .map(str::to_owned)
        .collect();
        if request.ideal_width > 0 && request.ideal_height > 0 {
            args.push("-video_size".to_owned());
            args.push(format!("{}x{}", request.ideal_width, request.ideal_height));
        }
        args.extend(
            ["-i", device, "-f", "mpjpeg", "-boundary_tag", "quizcam", "pipe:1"]
                .into_iter()
                .map(str::to_owned),
        );
        args
    }
}

#[async_trait]
impl CameraBackend for FfmpegBackend {
    async fn open_stream(&self, request: StreamRequest) -> Result<Box<dyn VideoTrack>, DeviceError> {
        let Some(device) = self.device_for(request.facing) else {
            return Err(DeviceError::ConstraintUnsatisfiable(format!(
                "no {} camera device configured",
                request.facing
            )));
        };
        if !Path::new(device).exists() {
            return Err(DeviceError::DeviceNotFound(device.to_owned()));
        }

        let child = Command::new("ffmpeg")
            .args(self.stream_args(device, &request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(classify_spawn_error)?;

        let label = format!("{device} ({})", request.facing);
        debug!("ffmpeg stream spawned for {label}");
        let track = FfmpegTrack::attach(child, label)?;
        let track = track.wait_for_first_frame(self.first_frame_timeout).await?;
        Ok(Box::new(track))
    }
}

/// A running ffmpeg process and the task that keeps its newest frame.
pub struct FfmpegTrack {
    label: String,
    child: Child,
    latest_frame: Arc<Mutex<Option<Vec<u8>>>>,
    dimensions_rx: watch::Receiver<(u32, u32)>,
    cancel_tx: watch::Sender<bool>,
    stderr_task: Option<JoinHandle<String>>,
    stopped: bool,
}

impl FfmpegTrack {
    fn attach(mut child: Child, label: String) -> Result<Self, DeviceError> {
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| DeviceError::Unknown("missing ffmpeg stdout pipe".to_owned()))?;
        let stderr = child.stderr.take();

        let latest_frame = Arc::new(Mutex::new(None));
        let (dimensions_tx, dimensions_rx) = watch::channel((0, 0));
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task_frame = latest_frame.clone();
        let task_label = label.clone();
        tokio::spawn(async move {
            let mut buffer = vec![0_u8; 16 * 1024];
            let mut splitter = MjpegSplitter::new();
            loop {
                tokio::select! {
                    changed = cancel_rx.changed() => {
                        if changed.is_ok() && *cancel_rx.borrow() {
                            debug!("reader for {task_label} cancelled");
                        }
                        break;
                    }
                    read = stdout.read(&mut buffer) => {
                        match read {
                            Ok(0) => break,
                            Ok(n) => {
                                let Some(frame) = splitter.push(&buffer[..n]) else {
                                    continue;
                                };
                                if let Some(size) = frame_dimensions(&frame) {
                                    dimensions_tx.send_if_modified(|current| {
                                        let changed = *current != size;
                                        *current = size;
                                        changed
                                    });
                                }
                                *task_frame.lock().await = Some(frame);
                            }
                            Err(err) => {
                                warn!("reading {task_label} failed: {err}");
                                break;
                            }
                        }
                    }
                }
            }
            debug!("reader for {task_label} finished");
        });

        let stderr_task = stderr.map(|mut stderr| {
            tokio::spawn(async move {
                let mut raw = Vec::new();
                let _ = stderr.read_to_end(&mut raw).await;
                let start = raw.len().saturating_sub(STDERR_TAIL_BYTES);
                String::from_utf8_lossy(&raw[start..]).into_owned()
            })
        });

        Ok(Self {
            label,
            child,
            latest_frame,
            dimensions_rx,
            cancel_tx,
            stderr_task,
            stopped: false,
        })
    }

    async fn wait_for_first_frame(mut self, timeout: Duration) -> Result<Self, DeviceError> {
        let mut dimensions = self.dimensions_rx.clone();
        let waited = tokio::time::timeout(timeout, async move {
            dimensions.wait_for(|&(w, h)| w > 0 && h > 0).await.is_ok()
        })
        .await;

        match waited {
            Ok(true) => Ok(self),
            Ok(false) => {
                // Reader ended before any frame; ffmpeg may still be running.
                let _ = self.child.kill().await;
                let stderr = self.stderr_tail().await;
                self.stopped = true;
                Err(classify_ffmpeg_stderr(&self.label, &stderr))
            }
            Err(_) => {
                self.stop().await;
                Err(DeviceError::Unknown(format!(
                    "{} produced no frame within {timeout:?}",
                    self.label
                )))
            }
        }
    }

    async fn stderr_tail(&mut self) -> String {
        let Some(task) = self.stderr_task.take() else {
            return String::new();
        };
        match tokio::time::timeout(Duration::from_secs(1), task).await {
            Ok(Ok(tail)) => tail,
            _ => String::new(),
        }
    }
}

#[async_trait]
impl VideoTrack for FfmpegTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn dimensions(&self) -> (u32, u32) {
        *self.dimensions_rx.borrow()
    }

    async fn current_frame(&mut self) -> Result<RgbImage> {
        let jpeg = self
            .latest_frame
            .lock()
            .await
            .clone()
            .ok_or_else(|| anyhow!("{} has not produced a frame", self.label))?;
        let frame = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
            .context("failed to decode camera frame")?;
        Ok(frame.to_rgb8())
    }

    async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        let _ = self.cancel_tx.send(true);
        if let Err(err) = self.child.kill().await {
            warn!("failed to kill ffmpeg for {}: {err}", self.label);
        }
        info!("camera stream stopped: {}", self.label);
    }
}

impl Drop for FfmpegTrack {
    fn drop(&mut self) {
        let _ = self.cancel_tx.send(true);
    }
}

fn classify_spawn_error(err: io::Error) -> DeviceError {
    match err.kind() {
        io::ErrorKind::NotFound => {
            DeviceError::DeviceUnsupported("ffmpeg is not installed or not on PATH".to_owned())
        }
        io::ErrorKind::PermissionDenied => {
            DeviceError::PermissionDenied(format!("cannot run ffmpeg: {err}"))
        }
        _ => DeviceError::Unknown(format!("failed to spawn ffmpeg: {err}")),
    }
}

/// Maps the error text ffmpeg prints when a v4l2 device cannot be opened.
fn classify_ffmpeg_stderr(label: &str, stderr: &str) -> DeviceError {
    let text = stderr.trim();
    let detail = if text.is_empty() {
        format!("{label}: ffmpeg exited without output")
    } else {
        format!("{label}: {text}")
    };
    let lower = text.to_lowercase();

    if lower.contains("permission denied") {
        DeviceError::PermissionDenied(detail)
    } else if lower.contains("no such file or directory") || lower.contains("no such device") {
        DeviceError::DeviceNotFound(detail)
    } else if lower.contains("not a video capture device") || lower.contains("unknown input format")
    {
        DeviceError::DeviceUnsupported(detail)
    } else if lower.contains("invalid argument")
        || lower.contains("cannot find a proper format")
        || lower.contains("not supported")
        || lower.contains("unsupported")
    {
        DeviceError::ConstraintUnsatisfiable(detail)
    } else {
        DeviceError::Unknown(detail)
    }
}
