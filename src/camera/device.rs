//! Device selection, format negotiation, and frame decoding

use crate::camera::{CameraConfig, PixelFormat, find_device_by_name, list_devices};
use crate::error::{Error, Result};
use image::{DynamicImage, ImageBuffer};
use serde::{Deserialize, Serialize};
use std::mem;
use std::sync::Arc;
use tokio::sync::Mutex;
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

/// Identity of a V4L2 capture node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraDevice {
    /// Numeric index of the node (`/dev/video0` is index 0)
    pub index: usize,
    /// Filesystem path of the node
    pub path: String,
    /// Product name reported by the driver
    pub name: String,
    /// Kernel driver in charge of the node
    pub driver: String,
    /// Bus the device hangs off of
    pub bus_info: String,
}

/// Live capture resources. The stream borrows the device, so both are owned
/// here and dropped together.
struct LiveStream {
    stream: MmapStream<'static>,
    _device: Box<Device>,
}

/// An opened camera delivering decoded frames
pub struct Camera {
    live: Arc<Mutex<LiveStream>>,
    config: CameraConfig,
    info: CameraDevice,
}

impl Camera {
    /// Select, open, and configure the camera described by `config`.
    pub async fn open(mut config: CameraConfig) -> Result<Self> {
        let info = resolve_device(&config)?;
        tracing::info!(name = %info.name, path = %info.path, "Opening camera");

        let dev = Device::new(info.index)
            .map_err(|e| Error::Camera(format!("Cannot open {}: {e}", info.path)))?;

        // Frame reconstruction must use the geometry the driver granted,
        // not the one we asked for.
        let granted = configure(&dev, &config)?;
        config.width = granted.width;
        config.height = granted.height;

        // The mmap stream wants a 'static device reference. Boxing the device
        // pins its address, and LiveStream keeps it alive as long as the
        // stream exists.
        let device = Box::new(dev);
        let pinned: &'static Device =
            unsafe { mem::transmute::<&Device, &'static Device>(device.as_ref()) };

        let stream =
            MmapStream::with_buffers(pinned, Type::VideoCapture, config.buffer_count.max(2))
                .map_err(|e| Error::FrameCapture(format!("Stream setup failed: {e}")))?;

        Ok(Self {
            live: Arc::new(Mutex::new(LiveStream {
                stream,
                _device: device,
            })),
            config,
            info,
        })
    }

    /// Identity of the opened device
    pub fn info(&self) -> &CameraDevice {
        &self.info
    }

    /// Configuration the device was opened with
    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Pull the next frame off the stream and decode it.
    pub async fn capture_frame(&self) -> Result<DynamicImage> {
        let mut live = self.live.lock().await;
        let (raw, _meta) = live
            .stream
            .next()
            .map_err(|e| Error::FrameCapture(format!("Frame dequeue failed: {e}")))?;

        decode_raw_frame(&self.config, raw)
    }
}

/// Pick the device the configuration names, or the first usable one.
fn resolve_device(config: &CameraConfig) -> Result<CameraDevice> {
    if let Some(name) = &config.device_name {
        return find_device_by_name(name);
    }

    let mut devices = list_devices()?;
    match config.device_index {
        Some(index) => devices
            .into_iter()
            .find(|d| d.index == index)
            .ok_or_else(|| Error::CameraNotFound(format!("/dev/video{index} is not available"))),
        None => {
            if devices.is_empty() {
                Err(Error::CameraNotFound("No cameras available".to_string()))
            } else {
                Ok(devices.remove(0))
            }
        }
    }
}

/// Negotiate frame geometry, wire format, and rate with the driver.
/// Returns the format the driver actually granted.
fn configure(dev: &Device, config: &CameraConfig) -> Result<v4l::Format> {
    let mut fmt = dev
        .format()
        .map_err(|e| Error::Camera(format!("Format query failed: {e}")))?;
    fmt.width = config.width;
    fmt.height = config.height;
    fmt.fourcc = config.format.fourcc();

    let granted = dev
        .set_format(&fmt)
        .map_err(|e| Error::Camera(format!("Format negotiation failed: {e}")))?;

    let mut params = dev
        .params()
        .map_err(|e| Error::Camera(format!("Parameter query failed: {e}")))?;
    params.interval = v4l::Fraction::new(1, config.fps);
    dev.set_params(&params)
        .map_err(|e| Error::Camera(format!("Frame rate negotiation failed: {e}")))?;

    tracing::info!(
        width = granted.width,
        height = granted.height,
        fps = config.fps,
        format = %String::from_utf8_lossy(&granted.fourcc.repr),
        "Camera configured"
    );

    Ok(granted)
}

fn decode_raw_frame(config: &CameraConfig, raw: &[u8]) -> Result<DynamicImage> {
    match config.format {
        PixelFormat::Mjpeg => image::load_from_memory_with_format(raw, image::ImageFormat::Jpeg)
            .map_err(|e| Error::Image(format!("MJPEG frame did not decode: {e}"))),
        PixelFormat::Yuyv => yuyv_frame(config.width, config.height, raw),
        PixelFormat::Rgb24 => ImageBuffer::from_raw(config.width, config.height, raw.to_vec())
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| Error::Image("RGB frame has unexpected geometry".to_string())),
    }
}

/// Expand packed YUYV 4:2:2 into RGB. Each four-byte macro pixel carries two
/// luma samples sharing one chroma pair.
fn yuyv_frame(width: u32, height: u32, raw: &[u8]) -> Result<DynamicImage> {
    let expected = width as usize * height as usize * 2;
    if raw.len() < expected {
        return Err(Error::Image(format!(
            "Short YUYV frame: {} of {expected} bytes",
            raw.len()
        )));
    }

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for macro_pixel in raw[..expected].chunks_exact(4) {
        let y0 = macro_pixel[0] as i32;
        let u = macro_pixel[1] as i32 - 128;
        let y1 = macro_pixel[2] as i32;
        let v = macro_pixel[3] as i32 - 128;

        rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
        rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }

    ImageBuffer::from_raw(width, height, rgb)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| Error::Image("YUYV frame has unexpected geometry".to_string()))
}

/// BT.601 integer approximation.
fn yuv_to_rgb(y: i32, u: i32, v: i32) -> [u8; 3] {
    let r = y + ((v * 1436) >> 10);
    let g = y - ((u * 352 + v * 731) >> 10);
    let b = y + ((u * 1814) >> 10);
    [
        r.clamp(0, 255) as u8,
        g.clamp(0, 255) as u8,
        b.clamp(0, 255) as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_grey_macro_pixel_expands_to_grey_rgb() {
        // Two luma-128 samples with neutral chroma decode to mid grey.
        let raw = [128u8, 128, 128, 128];
        let img = yuyv_frame(2, 1, &raw).unwrap();
        let rgb = img.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [128, 128, 128]);
        assert_eq!(rgb.get_pixel(1, 0).0, [128, 128, 128]);
    }

    #[test]
    fn short_yuyv_buffer_is_rejected() {
        let raw = [0u8; 3];
        assert!(matches!(yuyv_frame(2, 1, &raw), Err(Error::Image(_))));
    }

    #[tokio::test]
    async fn open_reports_cleanly_without_hardware() {
        match Camera::open(CameraConfig::default()).await {
            Ok(camera) => println!("Opened camera: {}", camera.info().name),
            Err(e) => println!("No camera available (expected on CI): {e}"),
        }
    }
}
