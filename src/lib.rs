pub mod capture;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod server;
pub mod utils;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use capture::{EncodedFrame, PixelFormat, RawFrame};
pub use error::{CaptureError, ConfigError, QueryError};
pub use pipeline::{Acquisition, AcquisitionState, CameraStatus, CaptureContext};

/// Environment variable naming an alternative config file
pub const CONFIG_ENV: &str = "FRAMEPORT_CONFIG";
const ENV_PREFIX: &str = "FRAMEPORT";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub capture: CaptureConfig,
    pub stream: StreamConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Device node, or `auto` to probe `/dev/video0..9`
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
    pub buffer_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// JPEG quality of the continuous stream
    pub quality: i32,
    /// JPEG quality of one-off captures made before the first frame is cached
    pub snapshot_quality: i32,
    pub backoff_ms: u64,
    /// Capture synchronously when nothing is cached yet; otherwise answer "not ready"
    pub on_demand_fallback: bool,
    /// Consecutive device failures before an error is logged
    pub lost_warn_threshold: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".into(),
            width: 640,
            height: 480,
            fps: 15,
            format: PixelFormat::Mjpeg,
            buffer_count: 4,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            quality: 80,
            snapshot_quality: 90,
            backoff_ms: 100,
            on_demand_fallback: true,
            lost_warn_threshold: 10,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

impl CaptureConfig {
    /// Target time between frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl StreamConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Settings {
    /// Defaults, then `frameport.toml` (or `$FRAMEPORT_CONFIG`), then
    /// `FRAMEPORT_<SECTION>__<KEY>` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| "frameport".into());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let settings: Settings = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults overlaid with a TOML document
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let settings: Settings = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?)
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.capture;
        if c.width == 0 || c.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "capture resolution must be non-zero, got {}",
                c.resolution()
            )));
        }
        if c.fps == 0 {
            return Err(ConfigError::Invalid("capture fps must be non-zero".into()));
        }
        if c.buffer_count == 0 {
            return Err(ConfigError::Invalid(
                "capture buffer_count must be non-zero".into(),
            ));
        }
        Ok(())
    }
}
