//! Industrial-I/O magnetometer backend
//!
//! Reads the three magnetometer channels a Linux IIO driver exposes under
//! `/sys/bus/iio/devices/iio:deviceN` and converts raw counts to microtesla
//! using the driver-reported scale. Polling is fixed-interval with no
//! minimum-change filter, so every tick delivers a sample.

use crate::error::{Error, Result};
use crate::heading::HeadingSample;
use crate::heading::monitor::HeadingSource;
use async_trait::async_trait;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{self, Interval, MissedTickBehavior};

const SYSFS_IIO_ROOT: &str = "/sys/bus/iio/devices";

/// Magnetometer heading source backed by IIO sysfs attributes
pub struct IioHeadingSource {
    device_dir: PathBuf,
    scale: f64,
    ticker: Interval,
}

impl IioHeadingSource {
    /// Scan the IIO bus for the first device exposing magnetometer channels.
    pub fn discover(poll_interval: Duration) -> Result<Self> {
        let entries = fs::read_dir(SYSFS_IIO_ROOT).map_err(|e| {
            Error::SensorNotFound(format!("Cannot enumerate {SYSFS_IIO_ROOT}: {e}"))
        })?;

        for entry in entries.flatten() {
            let dir = entry.path();
            if dir.join("in_magn_x_raw").exists() {
                return Self::open(dir, poll_interval);
            }
        }

        Err(Error::SensorNotFound(
            "No IIO device with magnetometer channels found".to_string(),
        ))
    }

    /// Open a specific IIO device directory.
    pub fn open(dir: impl Into<PathBuf>, poll_interval: Duration) -> Result<Self> {
        let device_dir = dir.into();

        if !device_dir.join("in_magn_x_raw").exists() {
            return Err(Error::SensorNotFound(format!(
                "{} has no magnetometer channels",
                device_dir.display()
            )));
        }

        let scale = match fs::read_to_string(device_dir.join("in_magn_scale")) {
            Ok(raw) => raw.trim().parse::<f64>().map_err(|e| {
                Error::Config(format!(
                    "Invalid in_magn_scale in {}: {e}",
                    device_dir.display()
                ))
            })?,
            // Drivers without a scale attribute report calibrated units already.
            Err(_) => 1.0,
        };

        tracing::info!(
            device = %device_dir.display(),
            scale,
            interval_ms = poll_interval.as_millis() as u64,
            "Opening IIO magnetometer"
        );

        let mut ticker = time::interval(poll_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            device_dir,
            scale,
            ticker,
        })
    }

    /// Sysfs directory this source reads from
    pub fn device_dir(&self) -> &Path {
        &self.device_dir
    }

    fn read_axis(&self, axis: &str) -> Result<f64> {
        let path = self.device_dir.join(format!("in_magn_{axis}_raw"));
        let raw = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => {
                Error::SensorPermissionDenied(format!("{}: {e}", path.display()))
            }
            ErrorKind::NotFound => Error::SensorNotFound(format!("{}: {e}", path.display())),
            _ => Error::HeadingFailure(format!("{}: {e}", path.display())),
        })?;

        raw.trim()
            .parse::<f64>()
            .map_err(|e| Error::HeadingFailure(format!("{}: {e}", path.display())))
    }
}

#[async_trait]
impl HeadingSource for IioHeadingSource {
    async fn next_heading(&mut self) -> Result<HeadingSample> {
        self.ticker.tick().await;

        let x = self.read_axis("x")?;
        let y = self.read_axis("y")?;
        let z = self.read_axis("z")?;

        Ok(HeadingSample::new(
            x * self.scale,
            y * self.scale,
            z * self.scale,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static DIR_SEQ: AtomicU32 = AtomicU32::new(0);

    fn fixture_device(x: &str, y: &str, z: &str, scale: Option<&str>) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "fieldscan-iio-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("in_magn_x_raw"), x).unwrap();
        fs::write(dir.join("in_magn_y_raw"), y).unwrap();
        fs::write(dir.join("in_magn_z_raw"), z).unwrap();
        if let Some(scale) = scale {
            fs::write(dir.join("in_magn_scale"), scale).unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn reads_scaled_sample_from_sysfs() {
        let dir = fixture_device("30\n", "40\n", "0\n", Some("0.1\n"));
        let mut source = IioHeadingSource::open(&dir, Duration::from_millis(1)).unwrap();

        let sample = source.next_heading().await.unwrap();
        assert_eq!(sample.x, 3.0);
        assert_eq!(sample.y, 4.0);
        assert_eq!(sample.z, 0.0);
        assert_eq!(sample.magnitude(), 5.0);
    }

    #[tokio::test]
    async fn missing_scale_defaults_to_unity() {
        let dir = fixture_device("7\n", "0\n", "0\n", None);
        let mut source = IioHeadingSource::open(&dir, Duration::from_millis(1)).unwrap();

        let sample = source.next_heading().await.unwrap();
        assert_eq!(sample.x, 7.0);
    }

    #[tokio::test]
    async fn garbled_reading_is_a_transient_failure() {
        let dir = fixture_device("not-a-number\n", "0\n", "0\n", None);
        let mut source = IioHeadingSource::open(&dir, Duration::from_millis(1)).unwrap();

        let err = source.next_heading().await.unwrap_err();
        assert!(matches!(err, Error::HeadingFailure(_)));
        assert!(!err.is_sensor_terminal());
    }

    #[test]
    fn open_rejects_directories_without_channels() {
        let dir = std::env::temp_dir().join(format!(
            "fieldscan-iio-empty-{}-{}",
            std::process::id(),
            DIR_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&dir).unwrap();

        let err = IioHeadingSource::open(&dir, Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, Error::SensorNotFound(_)));
    }
}
