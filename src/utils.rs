use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;
use v4l::{capability::Flags, video::Capture, Device, FourCC};

use crate::{CaptureError, PixelFormat};

// Detected capture device info
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoundDevice {
    pub path: String,
    pub format: PixelFormat,
}

/// Probe `/dev/video0..9` for the first capture node offering MJPEG or YUYV
pub fn auto_detect_device() -> Result<FoundDevice, CaptureError> {
    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }

        // Prefer whichever of MJPEG/YUYV the driver lists first
        for fmt in dev.enum_formats().unwrap_or_default() {
            let format = if fmt.fourcc == FourCC::new(b"MJPG") {
                PixelFormat::Mjpeg
            } else if fmt.fourcc == FourCC::new(b"YUYV") {
                PixelFormat::Yuyv4
            } else {
                continue;
            };
            info!("Found {:?} device: {} - {}", format, path, caps.card);
            return Ok(FoundDevice { path, format });
        }
    }

    Err(CaptureError::DeviceUnavailable(
        "no suitable capture device found".into(),
    ))
}
