//! Capture configuration and pixel formats

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How a capture device is selected and negotiated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Numeric device index (`/dev/videoN`); first usable device when unset
    pub device_index: Option<usize>,
    /// Substring matched against device names; takes priority over the index
    pub device_name: Option<String>,
    /// Requested frame width in pixels
    pub width: u32,
    /// Requested frame height in pixels
    pub height: u32,
    /// Requested frame rate
    pub fps: u32,
    /// Wire format negotiated with the driver
    pub format: PixelFormat,
    /// V4L2 buffers to keep mapped; more buffers smooth frame delivery
    pub buffer_count: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: None,
            device_name: None,
            width: 1280,
            height: 720,
            fps: 30,
            format: PixelFormat::Mjpeg,
            buffer_count: 4,
        }
    }
}

impl CameraConfig {
    /// Full-resolution settings for sessions that bind a still frame to the
    /// detection.
    pub fn still_capture() -> Self {
        Self {
            width: 1920,
            height: 1080,
            fps: 15,
            buffer_count: 5,
            ..Self::default()
        }
    }

    /// Conservative settings for webcams that reject the HD defaults.
    pub fn compatible() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 15,
            format: PixelFormat::Yuyv,
            ..Self::default()
        }
    }
}

/// Frame formats the capture path can decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Motion JPEG, compressed per frame
    Mjpeg,
    /// YUYV 4:2:2, uncompressed
    Yuyv,
    /// Packed RGB, uncompressed
    Rgb24,
}

impl PixelFormat {
    /// The V4L2 FourCC identifying this format on the wire
    pub fn fourcc(self) -> v4l::FourCC {
        let code = match self {
            PixelFormat::Mjpeg => b"MJPG",
            PixelFormat::Yuyv => b"YUYV",
            PixelFormat::Rgb24 => b"RGB3",
        };
        v4l::FourCC::new(code)
    }

    /// Identifier used in configuration files
    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::Mjpeg => "mjpeg",
            PixelFormat::Yuyv => "yuyv",
            PixelFormat::Rgb24 => "rgb24",
        }
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mjpeg" | "mjpg" => Ok(PixelFormat::Mjpeg),
            "yuyv" => Ok(PixelFormat::Yuyv),
            "rgb" | "rgb24" => Ok(PixelFormat::Rgb24),
            other => Err(format!(
                "Unknown pixel format '{other}'. Use mjpeg, yuyv, or rgb24"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_negotiate_hd_mjpeg() {
        let config = CameraConfig::default();
        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.format, PixelFormat::Mjpeg);
        assert!(config.device_index.is_none());
    }

    #[test]
    fn still_capture_raises_the_resolution() {
        let config = CameraConfig::still_capture();
        assert_eq!((config.width, config.height), (1920, 1080));
    }

    #[test]
    fn pixel_format_parses_common_spellings() {
        assert_eq!("MJPEG".parse(), Ok(PixelFormat::Mjpeg));
        assert_eq!("mjpg".parse(), Ok(PixelFormat::Mjpeg));
        assert_eq!(" yuyv ".parse(), Ok(PixelFormat::Yuyv));
        assert_eq!("rgb24".parse(), Ok(PixelFormat::Rgb24));
        assert!("nv12".parse::<PixelFormat>().is_err());
    }

    #[test]
    fn fourcc_codes_match_the_formats() {
        assert_eq!(PixelFormat::Mjpeg.fourcc().repr, *b"MJPG");
        assert_eq!(PixelFormat::Yuyv.fourcc().repr, *b"YUYV");
    }
}
