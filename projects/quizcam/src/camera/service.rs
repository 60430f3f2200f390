use tracing::{error, info, warn};

use crate::core::{
    errors::{CaptureError, DeviceError},
    state::{CaptureState, CaptureStatus, Facing},
};

use super::{
    still::CapturedImage,
    traits::{CameraBackend, StreamRequest, VideoTrack},
};

pub const JPEG_QUALITY: u8 = 80;

/// Owns the single live camera track, if any.
pub struct CameraService<B: CameraBackend> {
    backend: B,
    ideal_width: u32,
    ideal_height: u32,
    facing: Facing,
    state: CaptureState,
    track: Option<Box<dyn VideoTrack>>,
}

impl<B: CameraBackend> CameraService<B> {
    pub fn new(backend: B, ideal_width: u32, ideal_height: u32) -> Self {
        Self {
            backend,
            ideal_width,
            ideal_height,
            facing: Facing::default(),
            state: CaptureState::Idle,
            track: None,
        }
    }

    /// Starts a stream, replacing any active one. A constraint failure is retried
    /// once with the opposite facing.
    pub async fn start(&mut self, facing: Facing) -> Result<(), DeviceError> {
        self.stop().await;
        self.state = CaptureState::Starting;

        let opened = match self.open(facing).await {
            Ok(track) => Ok((facing, track)),
            Err(err) if err.is_constraint() => {
                let alternate = facing.flipped();
                warn!("{facing} camera rejected constraints ({err}), trying {alternate}");
                self.open(alternate).await.map(|track| (alternate, track))
            }
            Err(err) => Err(err),
        };

        match opened {
            Ok((facing, track)) => {
                self.attach(facing, track);
                Ok(())
            }
            Err(err) => {
                error!("camera start failed: {err}");
                self.state = CaptureState::Idle;
                Err(err)
            }
        }
    }

    /// Moves to the other camera. On failure the previous facing is reopened;
    /// the switch error is returned either way and `is_active` tells whether
    /// the restore worked.
    pub async fn switch_facing(&mut self) -> Result<Facing, DeviceError> {
        let previous = self.facing;
        let next = previous.flipped();

        self.state = CaptureState::Switching;
        self.release().await;
        self.facing = next;

        let err = match self.open(next).await {
            Ok(track) => {
                self.attach(next, track);
                return Ok(next);
            }
            Err(err) => err,
        };

        warn!("switch to {next} camera failed: {err}");
        self.facing = previous;
        match self.open(previous).await {
            Ok(track) => self.attach(previous, track),
            Err(restore_err) => {
                error!("restoring {previous} camera failed: {restore_err}");
                self.state = CaptureState::Idle;
            }
        }
        Err(err)
    }

    /// Grabs the current frame as a JPEG still and ends the session.
    pub async fn capture(&mut self) -> Result<CapturedImage, CaptureError> {
        let track = self.track.as_mut().ok_or(CaptureError::NotActive)?;
        let (width, height) = track.dimensions();
        if width == 0 || height == 0 {
            return Err(CaptureError::SourceNotReady { width, height });
        }

        let frame = track
            .current_frame()
            .await
            .map_err(|err| CaptureError::Frame(format!("{err:#}")))?;
        let image = CapturedImage::encode_jpeg(&frame, JPEG_QUALITY)?;
        self.stop().await;

        info!(
            "captured {}x{} still ({} KB)",
            image.width(),
            image.height(),
            image.approximate_size_bytes() / 1024
        );
        Ok(image)
    }

    pub async fn stop(&mut self) {
        self.release().await;
        self.state = CaptureState::Idle;
    }

    pub fn is_active(&self) -> bool {
        self.track.is_some()
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn status(&self) -> CaptureStatus {
        let (width, height) = self
            .track
            .as_ref()
            .map(|track| track.dimensions())
            .unwrap_or_default();
        CaptureStatus {
            facing: self.facing,
            active: self.is_active(),
            state: self.state,
            width,
            height,
            label: self.track.as_ref().map(|track| track.label().to_owned()),
        }
    }

    async fn open(&self, facing: Facing) -> Result<Box<dyn VideoTrack>, DeviceError> {
        self.backend
            .open_stream(StreamRequest {
                facing,
                ideal_width: self.ideal_width,
                ideal_height: self.ideal_height,
            })
            .await
    }

    fn attach(&mut self, facing: Facing, track: Box<dyn VideoTrack>) {
        let (width, height) = track.dimensions();
        info!("{facing} camera live: {} ({width}x{height})", track.label());
        self.facing = facing;
        self.track = Some(track);
        self.state = CaptureState::Live;
    }

    async fn release(&mut self) {
        if let Some(mut track) = self.track.take() {
            track.stop().await;
            info!("camera track released: {}", track.label());
        }
    }
}
