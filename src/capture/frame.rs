use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Uncompressed frame as delivered by the capture device
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Frame bytes, shared without copying
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl RawFrame {
    pub fn new(data: impl Into<Bytes>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            format,
        }
    }
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuyv4,
    Mjpeg,
    Gray8,
}

impl PixelFormat {
    /// Bytes per pixel for packed formats, `None` for compressed ones
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => Some(3),
            PixelFormat::Yuyv4 => Some(2),
            PixelFormat::Gray8 => Some(1),
            PixelFormat::Mjpeg => None,
        }
    }
}

/// Time and sequence number attached to a frame by whoever produced it
#[derive(Debug, Clone, Copy)]
pub struct FrameStamp {
    pub captured_at: SystemTime,
    pub sequence: u64,
}

impl FrameStamp {
    pub fn now(sequence: u64) -> Self {
        Self {
            captured_at: SystemTime::now(),
            sequence,
        }
    }
}

/// JPEG-compressed frame. Immutable once built; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub jpeg: Bytes,
    pub quality: u8,
    pub width: u32,
    pub height: u32,
    pub captured_at: SystemTime,
    pub sequence: u64,
}

impl EncodedFrame {
    /// Capture time as fractional seconds since the Unix epoch
    pub fn timestamp(&self) -> f64 {
        self.captured_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs_f64()
    }

    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }
}
