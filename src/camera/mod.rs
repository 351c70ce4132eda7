//! V4L2 camera access
//!
//! Webcam frames feed the QR capture flow. Devices are discovered by probing
//! `/dev/videoN` nodes and keeping the ones that can actually capture video.

mod config;
mod device;

pub use config::{CameraConfig, PixelFormat};
pub use device::{Camera, CameraDevice};

use crate::error::{Error, Result};

/// Highest `/dev/videoN` index probed during enumeration
const MAX_PROBED_DEVICES: usize = 16;

/// List the usable V4L2 capture devices.
pub fn list_devices() -> Result<Vec<CameraDevice>> {
    let devices: Vec<CameraDevice> = (0..MAX_PROBED_DEVICES).filter_map(probe).collect();

    if devices.is_empty() {
        return Err(Error::CameraNotFound(
            "No V4L2 capture devices found".to_string(),
        ));
    }

    Ok(devices)
}

/// Find a camera whose name contains `name`, case-insensitively.
pub fn find_device_by_name(name: &str) -> Result<CameraDevice> {
    let needle = name.to_lowercase();

    list_devices()?
        .into_iter()
        .find(|device| device.name.to_lowercase().contains(&needle))
        .ok_or_else(|| Error::CameraNotFound(format!("No device matching '{name}'")))
}

/// Check one `/dev/videoN` node. Metadata and output nodes are skipped, only
/// capture-capable devices count.
fn probe(index: usize) -> Option<CameraDevice> {
    let dev = v4l::Device::new(index).ok()?;
    let caps = dev.query_caps().ok()?;

    caps.capabilities
        .contains(v4l::capability::Flags::VIDEO_CAPTURE)
        .then(|| CameraDevice {
            index,
            path: format!("/dev/video{index}"),
            name: caps.card,
            driver: caps.driver,
            bus_info: caps.bus,
        })
}
