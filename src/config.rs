//! Runtime configuration
//!
//! Settings are layered: built-in defaults, then a `fieldscan.{toml,yaml}`
//! file, then `FIELDSCAN_*` environment variables. CLI flags are applied on
//! top by the binary.

use crate::camera::{CameraConfig, PixelFormat};
use crate::error::{Error, Result};
use crate::logbook;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldscanConfig {
    /// Magnetometer polling
    pub sensor: SensorOptions,
    /// Camera selection and negotiation overrides
    pub camera: CameraOptions,
    /// Log output
    pub logging: LoggingOptions,
    /// Solution submission
    pub logbook: LogbookOptions,
}

impl FieldscanConfig {
    /// Load configuration, from an explicit path if given, otherwise from
    /// the first discovered file, otherwise defaults. Environment overrides
    /// are applied last.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match explicit_path {
            Some(path) => Self::from_file(path)?,
            None => match Self::discover_file()? {
                Some(path) => {
                    tracing::info!("Using configuration file: {}", path.display());
                    Self::from_file(&path)?
                }
                None => {
                    tracing::debug!("No fieldscan.toml / fieldscan.yaml found, using defaults");
                    Self::default()
                }
            },
        };

        config.sensor.apply_env_overrides();
        config.camera.apply_env_overrides();
        config.logging.apply_env_overrides();
        config.logbook.apply_env_overrides();
        Ok(config)
    }

    /// Look for a configuration file next to the process, then under the
    /// XDG config home.
    fn discover_file() -> Result<Option<PathBuf>> {
        let cwd =
            env::current_dir().map_err(|e| Error::Config(format!("Failed to read cwd: {e}")))?;

        let mut candidates: Vec<PathBuf> = ["fieldscan.toml", "fieldscan.yaml", "fieldscan.yml"]
            .into_iter()
            .map(|name| cwd.join(name))
            .collect();

        if let Some(base) = env::var_os("XDG_CONFIG_HOME") {
            let dir = PathBuf::from(base).join("fieldscan");
            candidates.extend(
                ["config.toml", "config.yaml"]
                    .into_iter()
                    .map(|name| dir.join(name)),
            );
        }

        Ok(candidates.into_iter().find(|path| path.exists()))
    }

    /// Parse a configuration file; the format follows the file extension.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        match extension.as_str() {
            "toml" => toml::from_str(&raw).map_err(|e| {
                Error::Config(format!("Failed to parse TOML {}: {e}", path.display()))
            }),
            "yaml" | "yml" => serde_yaml::from_str(&raw).map_err(|e| {
                Error::Config(format!("Failed to parse YAML {}: {e}", path.display()))
            }),
            other => Err(Error::Config(format!(
                "Unsupported config format '{other}', expected toml/yaml"
            ))),
        }
    }

    /// Resolve the camera overrides into a config ready to open the device.
    pub fn camera_config(&self) -> Result<CameraConfig> {
        self.camera.resolve()
    }
}

/// Magnetometer source settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorOptions {
    /// Explicit IIO device directory; auto-discovered when unset
    pub device_dir: Option<PathBuf>,
    /// Poll interval in milliseconds
    pub poll_interval_ms: Option<u64>,
}

impl SensorOptions {
    const DEFAULT_POLL_MS: u64 = 100;

    fn apply_env_overrides(&mut self) {
        if let Some(dir) = env_string("FIELDSCAN_SENSOR_DIR") {
            self.device_dir = Some(PathBuf::from(dir));
        }
        if let Some(ms) = env_parse("FIELDSCAN_SENSOR_INTERVAL_MS") {
            self.poll_interval_ms = Some(ms);
        }
    }

    /// Resolved polling interval.
    ///
    /// There is no minimum-change filter, every tick delivers a sample.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(Self::DEFAULT_POLL_MS).max(1))
    }
}

/// Camera overrides merged onto [`CameraConfig::default`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraOptions {
    /// Numeric camera index (`/dev/videoN`)
    pub device_index: Option<usize>,
    /// Camera name substring; wins over the index when both are set
    pub device_name: Option<String>,
    /// Frame width in pixels
    pub width: Option<u32>,
    /// Frame height in pixels
    pub height: Option<u32>,
    /// Frames per second
    pub fps: Option<u32>,
    /// Pixel format (mjpeg/yuyv/rgb24)
    pub format: Option<String>,
    /// V4L2 buffers to keep mapped
    pub buffer_count: Option<u32>,
}

impl CameraOptions {
    fn apply_env_overrides(&mut self) {
        if let Some(name) = env_string("FIELDSCAN_CAMERA_DEVICE") {
            self.device_name = Some(name);
            self.device_index = None;
        }
        if let Some(index) = env_parse("FIELDSCAN_CAMERA_INDEX") {
            self.device_index = Some(index);
            self.device_name = None;
        }
        if let Some(width) = env_parse("FIELDSCAN_CAMERA_WIDTH") {
            self.width = Some(width);
        }
        if let Some(height) = env_parse("FIELDSCAN_CAMERA_HEIGHT") {
            self.height = Some(height);
        }
        if let Some(fps) = env_parse("FIELDSCAN_CAMERA_FPS") {
            self.fps = Some(fps);
        }
        if let Some(format) = env_string("FIELDSCAN_CAMERA_FORMAT") {
            self.format = Some(format);
        }
        if let Some(buffers) = env_parse("FIELDSCAN_CAMERA_BUFFERS") {
            self.buffer_count = Some(buffers);
        }
    }

    /// Merge the overrides onto the default camera configuration.
    pub fn resolve(&self) -> Result<CameraConfig> {
        let defaults = CameraConfig::default();

        let format = match &self.format {
            Some(value) => value.parse::<PixelFormat>().map_err(Error::Config)?,
            None => defaults.format,
        };

        Ok(CameraConfig {
            device_index: self.device_index,
            device_name: self.device_name.clone(),
            width: self.width.unwrap_or(defaults.width),
            height: self.height.unwrap_or(defaults.height),
            fps: self.fps.map_or(defaults.fps, |fps| fps.max(1)),
            format,
            buffer_count: self
                .buffer_count
                .map_or(defaults.buffer_count, |count| count.max(2)),
        })
    }
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// Log level filter (overridable via `FIELDSCAN_LOG_LEVEL`)
    pub level: String,
    /// Optional file to tee structured logs into
    pub file: Option<PathBuf>,
    /// ANSI colors on stdout
    pub color: bool,
    /// Emit periodic metrics summaries over tracing
    pub metrics: bool,
    /// Seconds between metrics summaries
    pub metrics_interval_secs: u64,
    /// Rotation policy for the log file
    pub rotation: Option<LogRotation>,
    /// Bind address for the metrics HTTP endpoint (e.g. "127.0.0.1:9900")
    pub metrics_endpoint: Option<String>,
    /// Serialization of the metrics endpoint (`json` or `prometheus`)
    pub metrics_format: MetricsFormat,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            color: true,
            metrics: false,
            metrics_interval_secs: 60,
            rotation: None,
            metrics_endpoint: None,
            metrics_format: MetricsFormat::Json,
        }
    }
}

impl LoggingOptions {
    fn apply_env_overrides(&mut self) {
        if let Some(level) = env_string("FIELDSCAN_LOG_LEVEL") {
            self.level = level;
        }
        if let Some(file) = env_string("FIELDSCAN_LOG_FILE") {
            self.file = Some(PathBuf::from(file));
        }
        if let Some(color) = env_flag("FIELDSCAN_LOG_COLOR") {
            self.color = color;
        }
        if let Some(metrics) = env_flag("FIELDSCAN_LOG_METRICS") {
            self.metrics = metrics;
        }
        if let Some(interval) = env_parse::<u64>("FIELDSCAN_LOG_METRICS_INTERVAL") {
            self.metrics_interval_secs = interval.max(5);
        }
        if let Some(rotation) = env_parse("FIELDSCAN_LOG_ROTATION") {
            self.rotation = Some(rotation);
        }
        if let Some(endpoint) = env_string("FIELDSCAN_METRICS_ENDPOINT") {
            self.metrics_endpoint = Some(endpoint);
        }
        if let Some(format) = env_parse("FIELDSCAN_METRICS_FORMAT") {
            self.metrics_format = format;
        }
    }
}

/// Rotation policies for the log file sink
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// New file every hour
    Hourly,
    /// New file every day
    Daily,
}

impl FromStr for LogRotation {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            other => Err(format!(
                "Unsupported log rotation '{other}', expected 'hourly' or 'daily'"
            )),
        }
    }
}

/// Serialization formats for the metrics endpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricsFormat {
    /// Structured JSON
    Json,
    /// Prometheus text exposition format
    Prometheus,
}

impl FromStr for MetricsFormat {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "prometheus" => Ok(Self::Prometheus),
            other => Err(format!(
                "Unsupported metrics format '{other}', expected 'json' or 'prometheus'"
            )),
        }
    }
}

/// Solution submission settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogbookOptions {
    /// URL scheme the logbook application registers
    pub scheme: String,
    /// Command used to hand the submission URL to the platform
    pub opener: String,
    /// Task name reported with each solution
    pub task: String,
}

impl Default for LogbookOptions {
    fn default() -> Self {
        Self {
            scheme: logbook::DEFAULT_SCHEME.to_string(),
            opener: logbook::DEFAULT_OPENER.to_string(),
            task: "Metalldetektor".to_string(),
        }
    }
}

impl LogbookOptions {
    fn apply_env_overrides(&mut self) {
        if let Some(scheme) = env_string("FIELDSCAN_LOGBOOK_SCHEME") {
            self.scheme = scheme;
        }
        if let Some(opener) = env_string("FIELDSCAN_LOGBOOK_OPENER") {
            self.opener = opener;
        }
        if let Some(task) = env_string("FIELDSCAN_LOGBOOK_TASK") {
            self.task = task;
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    match env::var(key).ok()?.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
