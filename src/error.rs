//! Error taxonomy for fieldscan

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while monitoring or scanning
#[derive(Error, Debug)]
pub enum Error {
    /// The platform refused magnetometer access
    #[error("Sensor permission denied: {0}")]
    SensorPermissionDenied(String),

    /// A transient sensor read failure; the stream continues
    #[error("Heading read failed: {0}")]
    HeadingFailure(String),

    /// No magnetometer device could be located
    #[error("Sensor device not found: {0}")]
    SensorNotFound(String),

    /// Camera open or negotiation failure
    #[error("Camera error: {0}")]
    Camera(String),

    /// No camera matched the requested selection
    #[error("Camera device not found: {0}")]
    CameraNotFound(String),

    /// A video frame could not be pulled off the stream
    #[error("Frame capture failed: {0}")]
    FrameCapture(String),

    /// The still frame bound to a detection could not be captured
    #[error("Still capture failed: {0}")]
    StillCapture(String),

    /// A detected symbol would not decode
    #[error("Failed to decode QR code: {0}")]
    QrDecode(String),

    /// The frame holds no QR symbol at all
    #[error("No QR code found in frame")]
    NoQrCodeFound,

    /// Fixture rendering failed
    #[error("Failed to encode QR code: {0}")]
    QrEncode(String),

    /// The solution hand-off to the platform opener failed
    #[error("Solution submission failed: {0}")]
    Submission(String),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decode or conversion failure
    #[error("Image processing error: {0}")]
    Image(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Anything without a more specific home
    #[error("{0}")]
    Other(String),
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Other(format!("JSON error: {e}"))
    }
}

impl Error {
    /// True if the error should terminate a heading update stream for good.
    pub fn is_sensor_terminal(&self) -> bool {
        matches!(
            self,
            Error::SensorPermissionDenied(_) | Error::SensorNotFound(_)
        )
    }
}
