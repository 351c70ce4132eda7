//! FIELDSCAN - magnetometer field-strength monitor with QR solution logging
//!
//! This library drives a small puzzle-hunt "metal detector": it polls a
//! magnetometer for field-strength display and scans QR codes with a webcam
//! to submit puzzle solutions to an external logbook application.
//!
//! # Features
//!
//! - **Heading Monitor**: lifecycle-aware magnetometer polling with
//!   field-strength and per-axis display values
//! - **QR Capture Flow**: first-match capture sessions over V4L2 cameras,
//!   with optional still frames bound to a detection
//! - **Solution Logging**: JSON payloads handed off via custom-scheme URLs
//! - **Async-first**: Built on Tokio for non-blocking operations
//!
//! # Example
//!
//! ```no_run
//! use fieldscan::{CameraConfig, ScanOptions, ScanSession, SolutionLogger};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Scan one QR code with the default camera
//!     let (session, _handle) =
//!         ScanSession::with_camera(CameraConfig::default(), ScanOptions::default()).await?;
//!
//!     if let Some(detection) = session.run().await?.detection() {
//!         SolutionLogger::new().log_solution(&detection.code)?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs, rust_2024_compatibility)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod capture;
pub mod config;
pub mod error;
pub mod heading;
pub mod logbook;
pub mod logging;
pub mod metrics;
pub mod output;
pub mod qr;

#[cfg(feature = "camera")]
#[cfg_attr(docsrs, doc(cfg(feature = "camera")))]
pub mod camera;

// Re-exports for convenience
pub use error::{Error, Result};

#[cfg(feature = "camera")]
pub use camera::{Camera, CameraConfig, CameraDevice};

pub use capture::{
    DetectionResult, FrameOrientation, FrameSource, ScanHandle, ScanOptions, ScanOutcome,
    ScanPhase, ScanSession,
};
pub use config::{FieldscanConfig, LogbookOptions, LoggingOptions, SensorOptions};
pub use heading::{
    HeadingDisplay, HeadingMonitor, HeadingSample, HeadingSource, IioHeadingSource,
    LifecycleEvent, MAX_MAGNITUDE,
};
pub use logbook::{SolutionLogger, SolutionPayload, json_stringify};
pub use qr::{DecodedSymbol, QrDecoder, QrEncoder};
