//! Error taxonomy for the capture core and the query surface.

use thiserror::Error;

/// Failures raised while talking to the capture device or encoding its frames.
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    /// The device could not be opened.
    #[error("camera not available: {0}")]
    DeviceUnavailable(String),

    /// The open handle is no longer valid and must be reopened.
    #[error("camera lost: {0}")]
    DeviceLost(String),

    /// The device delivered no data this cycle.
    #[error("failed to capture image: {0}")]
    ReadFailure(String),

    /// The raw frame could not be turned into a JPEG.
    #[error("failed to encode frame: {0}")]
    EncodeFailure(String),
}

impl CaptureError {
    /// Transient errors skip a cycle but keep the current handle.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ReadFailure(_) | Self::EncodeFailure(_))
    }

    /// Errors that require the handle to be (re)opened before the next read.
    pub fn needs_reopen(&self) -> bool {
        matches!(self, Self::DeviceUnavailable(_) | Self::DeviceLost(_))
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::ENODEV) | Some(libc::ENXIO) | Some(libc::EIO) | Some(libc::EBADF) => {
                Self::DeviceLost(err.to_string())
            }
            _ => Self::ReadFailure(err.to_string()),
        }
    }
}

/// Failures surfaced by the query surface.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// No frame has been published yet and the on-demand fallback is disabled.
    #[error("no frame available yet")]
    NotReady,

    #[error("capture is shutting down")]
    ShuttingDown,
}

/// Failures while loading [`Settings`](crate::Settings).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
