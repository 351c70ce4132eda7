//! QR capture flow
//!
//! Models the scan-a-code interaction as an explicit state machine:
//!
//! ```text
//! Idle -> CameraActive -> (code detected) -> [PhotoCapturing] -> Completed
//!                     \-> Cancelled
//! ```
//!
//! A session consumes frames from a [`FrameSource`], latches the first
//! recognized QR symbol, optionally captures a still frame bound to that
//! detection, and resolves to exactly one [`ScanOutcome`]. The frame source
//! is stopped on every exit path, so camera resources never outlive the
//! session.

mod session;
mod source;

pub use session::{ScanHandle, ScanSession};
pub use source::FrameSource;

#[cfg(feature = "camera")]
pub use source::CameraFrameSource;

use image::DynamicImage;

/// Phases of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// Session constructed, not yet running
    Idle,
    /// Frames are being consumed and scanned for symbols
    CameraActive,
    /// First symbol latched, still frame being captured
    PhotoCapturing,
    /// Result delivered
    Completed,
    /// Dismissed before completion
    Cancelled,
}

/// Caller-facing options for a capture session
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Capture a still frame bound to the first detection
    pub capture_image: bool,
}

/// Interface orientation used to remap captured frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameOrientation {
    /// Device upright
    #[default]
    Portrait,
    /// Device upside down
    PortraitUpsideDown,
    /// Device rotated left (home side right)
    LandscapeLeft,
    /// Device rotated right (home side left)
    LandscapeRight,
}

impl FrameOrientation {
    /// Rotate a captured frame so it is upright for the current orientation
    pub fn remap(self, frame: DynamicImage) -> DynamicImage {
        match self {
            FrameOrientation::Portrait => frame,
            FrameOrientation::PortraitUpsideDown => frame.rotate180(),
            FrameOrientation::LandscapeLeft => frame.rotate270(),
            FrameOrientation::LandscapeRight => frame.rotate90(),
        }
    }
}

/// The decoded code of the first detected symbol, plus the still frame
/// when one was requested
#[derive(Debug, Clone)]
pub struct DetectionResult {
    /// Decoded text payload of the first detected symbol
    pub code: String,
    /// Still frame bound to the detection, if requested
    pub image: Option<DynamicImage>,
}

/// Terminal result of a capture session
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    /// A symbol was detected (with its still frame when requested)
    Detected(DetectionResult),
    /// The session was dismissed before any detection
    Cancelled,
}

impl ScanOutcome {
    /// The detection, if the session completed with one
    pub fn detection(&self) -> Option<&DetectionResult> {
        match self {
            ScanOutcome::Detected(result) => Some(result),
            ScanOutcome::Cancelled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portrait_remap_is_identity() {
        let frame = DynamicImage::new_luma8(40, 30);
        let remapped = FrameOrientation::Portrait.remap(frame);
        assert_eq!((remapped.width(), remapped.height()), (40, 30));
    }

    #[test]
    fn landscape_remap_swaps_dimensions() {
        let frame = DynamicImage::new_luma8(40, 30);
        let remapped = FrameOrientation::LandscapeLeft.remap(frame);
        assert_eq!((remapped.width(), remapped.height()), (30, 40));

        let frame = DynamicImage::new_luma8(40, 30);
        let remapped = FrameOrientation::LandscapeRight.remap(frame);
        assert_eq!((remapped.width(), remapped.height()), (30, 40));
    }

    #[test]
    fn upside_down_remap_keeps_dimensions() {
        let frame = DynamicImage::new_luma8(40, 30);
        let remapped = FrameOrientation::PortraitUpsideDown.remap(frame);
        assert_eq!((remapped.width(), remapped.height()), (40, 30));
    }
}
