//! V4L2 camera backend using memory-mapped streaming

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::device::{CaptureDevice, FrameSource};
use super::frame::{PixelFormat, RawFrame};
use crate::{CaptureConfig, CaptureError};

/// Opens `/dev/videoN` nodes on demand
pub struct V4l2Device {
    path: String,
}

impl V4l2Device {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl CaptureDevice for V4l2Device {
    #[instrument(skip(self, config), fields(path = %self.path))]
    fn open(&mut self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
        let unavailable = |what: &str, e: std::io::Error| {
            CaptureError::DeviceUnavailable(format!("{}: {what}: {e}", self.path))
        };

        let device = Device::with_path(&self.path).map_err(|e| unavailable("open", e))?;

        let caps = device.query_caps().map_err(|e| unavailable("query caps", e))?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CaptureError::DeviceUnavailable(format!(
                "{} doesn't support video capture",
                self.path
            )));
        }

        // Best-effort: drivers may round or ignore any of these
        let mut fmt = device.format().map_err(|e| unavailable("get format", e))?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = match config.format {
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
            PixelFormat::Yuyv4 => FourCC::new(b"YUYV"),
            PixelFormat::Rgb24 => FourCC::new(b"RGB3"),
            PixelFormat::Bgr24 => FourCC::new(b"BGR3"),
            PixelFormat::Gray8 => FourCC::new(b"GREY"),
        };
        let applied = device
            .set_format(&fmt)
            .map_err(|e| unavailable("set format", e))?;

        if let Err(e) = device.set_params(&Parameters::with_fps(config.fps)) {
            warn!("Could not set frame rate to {}: {}", config.fps, e);
        }

        let format = match &applied.fourcc.repr {
            b"MJPG" => PixelFormat::Mjpeg,
            b"YUYV" => PixelFormat::Yuyv4,
            b"RGB3" => PixelFormat::Rgb24,
            b"BGR3" => PixelFormat::Bgr24,
            b"GREY" => PixelFormat::Gray8,
            other => {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "unsupported pixel format {}",
                    String::from_utf8_lossy(other)
                )))
            }
        };
        info!(
            "Applied format: {}x{} {:?}",
            applied.width, applied.height, format
        );

        let stream = MmapStream::with_buffers(&device, Type::VideoCapture, config.buffer_count)
            .map_err(|e| unavailable("start stream", e))?;
        info!("Capture stream started with {} buffers", config.buffer_count);

        Ok(Box::new(V4l2Source {
            stream: Some(stream),
            _device: device,
            width: applied.width,
            height: applied.height,
            format,
        }))
    }

    fn name(&self) -> &str {
        &self.path
    }
}

/// Streaming V4L2 handle
struct V4l2Source {
    stream: Option<MmapStream<'static>>,
    _device: Device,
    width: u32,
    height: u32,
    format: PixelFormat,
}

impl FrameSource for V4l2Source {
    fn read_frame(&mut self) -> Result<RawFrame, CaptureError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CaptureError::DeviceLost("stream closed".into()))?;

        let (buf, meta) = stream.next()?;
        let used = (meta.bytesused as usize).min(buf.len());
        if used == 0 {
            return Err(CaptureError::ReadFailure("empty buffer".into()));
        }
        debug!(sequence = meta.sequence, bytes = used, "dequeued buffer");

        Ok(RawFrame {
            data: Bytes::copy_from_slice(&buf[..used]),
            width: self.width,
            height: self.height,
            format: self.format,
        })
    }

    fn close(&mut self) {
        // Dropping the stream issues STREAMOFF and unmaps the buffers
        self.stream.take();
    }
}
