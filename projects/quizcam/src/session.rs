use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::{
    analysis::{AnalysisClient, AnalysisResult, ProgressObserver},
    camera::{service::CameraService, still::CapturedImage, traits::CameraBackend},
    core::{
        errors::{CaptureError, DeviceError},
        state::{CaptureStatus, Facing},
    },
    endpoint::{EndpointResolver, ResolvedEndpoint, resolver::ProbeReport},
};

/// Everything one quiz attempt needs: the camera, the endpoint cache and the
/// image waiting to be analyzed.
pub struct QuizSession<B: CameraBackend> {
    camera: CameraService<B>,
    resolver: EndpointResolver,
    analyzer: AnalysisClient,
    captured: Option<CapturedImage>,
}

impl<B: CameraBackend> QuizSession<B> {
    pub fn new(
        camera: CameraService<B>,
        resolver: EndpointResolver,
        analyzer: AnalysisClient,
    ) -> Self {
        Self {
            camera,
            resolver,
            analyzer,
            captured: None,
        }
    }

    /// Opens the camera for a fresh shot, discarding any previous image.
    pub async fn start_camera(&mut self, facing: Facing) -> Result<(), DeviceError> {
        self.captured = None;
        self.camera.start(facing).await
    }

    pub async fn switch_camera(&mut self) -> Result<Facing, DeviceError> {
        self.camera.switch_facing().await
    }

    /// Captures the current frame. The camera is released afterwards.
    pub async fn snap(&mut self) -> Result<&CapturedImage, CaptureError> {
        let image = self.camera.capture().await?;
        info!(
            width = image.width(),
            height = image.height(),
            bytes = image.approximate_size_bytes(),
            "photo captured"
        );
        Ok(self.captured.insert(image))
    }

    /// Drops the current image and reopens the camera with the last facing.
    pub async fn retake(&mut self) -> Result<(), DeviceError> {
        let facing = self.camera.facing();
        self.start_camera(facing).await
    }

    /// Uses an image file instead of the camera.
    pub async fn load_image(&mut self, path: &Path) -> Result<&CapturedImage> {
        let image = CapturedImage::from_file(path).await?;
        self.camera.stop().await;
        info!(path = %path.display(), mime = image.mime(), "image loaded");
        Ok(self.captured.insert(image))
    }

    /// Uses an image already encoded as a `data:image/...;base64,` URL.
    pub async fn load_data_url(&mut self, data_url: &str) -> Result<&CapturedImage> {
        let image = CapturedImage::from_data_url(data_url)?;
        self.camera.stop().await;
        info!(mime = image.mime(), "image loaded from data url");
        Ok(self.captured.insert(image))
    }

    pub fn captured(&self) -> Option<&CapturedImage> {
        self.captured.as_ref()
    }

    pub async fn analyze(&mut self, progress: &dyn ProgressObserver) -> AnalysisResult {
        self.analyzer
            .analyze(self.captured.as_ref(), &mut self.resolver, progress)
            .await
            .into()
    }

    pub async fn check_endpoints(&self) -> Vec<ProbeReport> {
        self.resolver.probe_all().await
    }

    /// The endpoint the next analysis will use without probing, if any.
    pub fn endpoint(&self) -> Option<&ResolvedEndpoint> {
        self.resolver.cached()
    }

    pub fn camera_status(&self) -> CaptureStatus {
        self.camera.status()
    }

    pub async fn shutdown(&mut self) {
        self.camera.stop().await;
        self.captured = None;
    }
}
