//! Frame feeds for capture sessions

use crate::error::Result;
use async_trait::async_trait;
use image::DynamicImage;

#[cfg(feature = "camera")]
use crate::camera::{Camera, CameraConfig};
#[cfg(feature = "camera")]
use crate::error::Error;

/// Continuous video frame feed consumed by a [`crate::capture::ScanSession`]
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for and return the next frame
    async fn next_frame(&mut self) -> Result<DynamicImage>;

    /// Release the underlying capture resources.
    ///
    /// Called by the session on every exit path. Further `next_frame` calls
    /// after `stop` may fail.
    async fn stop(&mut self);
}

/// Frame source backed by a V4L2 [`Camera`]
#[cfg(feature = "camera")]
pub struct CameraFrameSource {
    camera: Option<Camera>,
}

#[cfg(feature = "camera")]
impl CameraFrameSource {
    /// Open the configured camera and wrap it as a frame source
    pub async fn open(config: CameraConfig) -> Result<Self> {
        let camera = Camera::open(config).await?;
        Ok(Self {
            camera: Some(camera),
        })
    }

    /// Device information of the opened camera
    pub fn info(&self) -> Option<&crate::camera::CameraDevice> {
        self.camera.as_ref().map(|c| c.info())
    }
}

#[cfg(feature = "camera")]
#[async_trait]
impl FrameSource for CameraFrameSource {
    async fn next_frame(&mut self) -> Result<DynamicImage> {
        match &self.camera {
            Some(camera) => camera.capture_frame().await,
            None => Err(Error::Camera("capture session stopped".to_string())),
        }
    }

    async fn stop(&mut self) {
        // Dropping the camera releases the mmap stream and device handle.
        self.camera = None;
    }
}
