use anyhow::Result;
use async_trait::async_trait;
use image::RgbImage;

use crate::core::{errors::DeviceError, state::Facing};

/// What the capture manager asks a backend for. Sizes are hints, not requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    pub facing: Facing,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

#[async_trait]
pub trait CameraBackend: Send + Sync {
    async fn open_stream(&self, request: StreamRequest) -> Result<Box<dyn VideoTrack>, DeviceError>;
}

/// A live video source. Dropping it must release the device.
#[async_trait]
pub trait VideoTrack: Send {
    fn label(&self) -> &str;

    /// Native size of the source, `(0, 0)` until it has reported one.
    fn dimensions(&self) -> (u32, u32);

    async fn current_frame(&mut self) -> Result<RgbImage>;

    async fn stop(&mut self);
}
