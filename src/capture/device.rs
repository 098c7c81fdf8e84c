//! Capture device abstraction and the lazily opened, owned handle.

use tracing::{info, instrument, warn};

use super::frame::RawFrame;
use crate::{CaptureConfig, CaptureError};

/// Something that can open the physical capture device.
pub trait CaptureDevice: Send {
    /// Open and configure the device. Requested size and rate are best-effort.
    fn open(&mut self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError>;

    /// Human readable name for logs
    fn name(&self) -> &str;
}

/// An open device delivering raw frames.
pub trait FrameSource: Send {
    /// Read one frame. `DeviceLost` means this source must be discarded.
    fn read_frame(&mut self) -> Result<RawFrame, CaptureError>;

    /// Release the device. Must be safe to call more than once.
    fn close(&mut self);
}

/// Owned device handle, opened on first read and reused until lost or closed.
///
/// At most one source is live at a time. Callers serialize access through the
/// mutex held by [`CaptureContext`](crate::CaptureContext).
pub struct DeviceHandle {
    device: Box<dyn CaptureDevice>,
    config: CaptureConfig,
    source: Option<Box<dyn FrameSource>>,
    opens: u64,
}

impl DeviceHandle {
    pub fn new(device: Box<dyn CaptureDevice>, config: CaptureConfig) -> Self {
        Self {
            device,
            config,
            source: None,
            opens: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.source.is_some()
    }

    /// Number of successful opens since construction
    pub fn open_count(&self) -> u64 {
        self.opens
    }

    /// Open the device unless a live source is already held.
    #[instrument(skip(self), fields(device = self.device.name()))]
    pub fn open_if_absent(&mut self) -> Result<(), CaptureError> {
        if self.source.is_some() {
            return Ok(());
        }

        let source = self.device.open(&self.config)?;
        self.opens += 1;
        metrics::counter!("frameport_device_opens_total").increment(1);
        info!(
            "Camera opened: {}x{} @ {}fps requested",
            self.config.width, self.config.height, self.config.fps
        );
        self.source = Some(source);
        Ok(())
    }

    /// Read one frame, opening the device first if needed.
    ///
    /// On `DeviceLost` the source is released so the next call reopens it.
    pub fn read_frame(&mut self) -> Result<RawFrame, CaptureError> {
        self.open_if_absent()?;
        let Some(source) = self.source.as_mut() else {
            return Err(CaptureError::DeviceUnavailable("no open source".into()));
        };

        let result = source.read_frame();
        if let Err(CaptureError::DeviceLost(reason)) = &result {
            warn!("Camera lost ({}), releasing handle", reason);
            self.close();
        }
        result
    }

    /// Release the device if open. No-op when already closed.
    pub fn close(&mut self) {
        if let Some(mut source) = self.source.take() {
            source.close();
            info!("Camera released");
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PixelFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct Counts {
        opens: AtomicUsize,
        closes: AtomicUsize,
    }

    struct FlakyDevice {
        counts: Arc<Counts>,
        lose_first: bool,
    }

    struct FlakySource {
        counts: Arc<Counts>,
        lose: bool,
    }

    impl CaptureDevice for FlakyDevice {
        fn open(&mut self, _: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
            let n = self.counts.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FlakySource {
                counts: self.counts.clone(),
                lose: self.lose_first && n == 0,
            }))
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    impl FrameSource for FlakySource {
        fn read_frame(&mut self) -> Result<RawFrame, CaptureError> {
            if self.lose {
                return Err(CaptureError::DeviceLost("unplugged".into()));
            }
            Ok(RawFrame::new(vec![0u8; 3], 1, 1, PixelFormat::Rgb24))
        }

        fn close(&mut self) {
            self.counts.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn handle(lose_first: bool) -> (DeviceHandle, Arc<Counts>) {
        let counts = Arc::new(Counts::default());
        let device = FlakyDevice {
            counts: counts.clone(),
            lose_first,
        };
        (DeviceHandle::new(Box::new(device), CaptureConfig::default()), counts)
    }

    #[test]
    fn test_open_is_lazy_and_reused() {
        let (mut dev, counts) = handle(false);
        assert!(!dev.is_open());
        assert_eq!(counts.opens.load(Ordering::SeqCst), 0);

        dev.read_frame().unwrap();
        dev.read_frame().unwrap();
        assert!(dev.is_open());
        assert_eq!(counts.opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lost_device_is_released_and_reopened() {
        let (mut dev, counts) = handle(true);
        assert!(matches!(dev.read_frame(), Err(CaptureError::DeviceLost(_))));
        assert!(!dev.is_open());
        assert_eq!(counts.closes.load(Ordering::SeqCst), 1);

        dev.read_frame().unwrap();
        assert_eq!(dev.open_count(), 2);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut dev, counts) = handle(false);
        dev.read_frame().unwrap();
        dev.close();
        dev.close();
        drop(dev);
        assert_eq!(counts.closes.load(Ordering::SeqCst), 1);
    }
}
