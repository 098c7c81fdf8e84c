//! Process-wide capture state, constructed once and shared by `Arc`.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::{info, instrument};

use super::slot::FrameSlot;
use crate::capture::{encode, CaptureDevice, DeviceHandle, EncodedFrame, FrameStamp};
use crate::{CaptureConfig, CaptureError, QueryError, StreamConfig};

/// Lifecycle of the acquisition loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum AcquisitionState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl AcquisitionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Camera status as reported to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraStatus {
    pub is_open: bool,
    pub is_streaming: bool,
    pub frame_count: u64,
    pub resolution: String,
    pub fps: u32,
}

/// Owns the device handle and the frame slot.
///
/// The device mutex is the single exclusion point for every device read, held
/// only around the I/O call. Encoding happens after it is released.
pub struct CaptureContext {
    device: Mutex<DeviceHandle>,
    device_open: AtomicBool,
    slot: FrameSlot,
    capture: CaptureConfig,
    stream: StreamConfig,
    state: AtomicU8,
    shutdown: AtomicBool,
    wake: Notify,
}

impl CaptureContext {
    pub fn new(
        device: Box<dyn CaptureDevice>,
        capture: CaptureConfig,
        stream: StreamConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            device: Mutex::new(DeviceHandle::new(device, capture.clone())),
            device_open: AtomicBool::new(false),
            slot: FrameSlot::new(&capture),
            capture,
            stream,
            state: AtomicU8::new(AcquisitionState::Stopped as u8),
            shutdown: AtomicBool::new(false),
            wake: Notify::new(),
        })
    }

    pub fn slot(&self) -> &FrameSlot {
        &self.slot
    }

    pub fn capture_config(&self) -> &CaptureConfig {
        &self.capture
    }

    pub fn stream_config(&self) -> &StreamConfig {
        &self.stream
    }

    pub fn state(&self) -> AcquisitionState {
        AcquisitionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: AcquisitionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn transition(&self, from: AcquisitionState, to: AcquisitionState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// True once shutdown has been requested
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Ask the loop to stop at its next check point and refuse further device access
    pub fn request_shutdown(&self) {
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            info!("Shutdown requested");
        }
        let _ = self.transition(AcquisitionState::Starting, AcquisitionState::Stopping)
            || self.transition(AcquisitionState::Running, AcquisitionState::Stopping);
        self.slot.set_streaming(false);
        self.wake.notify_waiters();
    }

    /// Wakes on the next `request_shutdown`; enable it before checking the flag
    pub(crate) fn shutdown_notified(&self) -> Notified<'_> {
        self.wake.notified()
    }

    /// Whether the device handle is currently open. Never blocks on device I/O.
    pub fn is_open(&self) -> bool {
        self.device_open.load(Ordering::Acquire)
    }

    /// Run `f` with exclusive access to the device handle.
    pub fn with_device<R>(&self, f: impl FnOnce(&mut DeviceHandle) -> R) -> R {
        // The handle stays consistent even if a holder panicked mid-read
        let mut device = self.device.lock().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut device);
        self.device_open.store(device.is_open(), Ordering::Release);
        result
    }

    pub fn status(&self) -> CameraStatus {
        let slot = self.slot.status();
        CameraStatus {
            is_open: self.is_open(),
            is_streaming: slot.is_streaming,
            frame_count: slot.frame_count,
            resolution: slot.resolution,
            fps: slot.fps,
        }
    }

    /// Read and encode one frame, refusing once shutdown has begun.
    ///
    /// Blocking: runs the device read under the device lock.
    pub(crate) fn capture_blocking(&self, quality: i32) -> Result<EncodedFrame, CaptureError> {
        let raw = self.with_device(|device| {
            if self.is_shut_down() {
                return Err(CaptureError::DeviceUnavailable("capture stopped".into()));
            }
            device.read_frame()
        })?;
        encode(&raw, quality, FrameStamp::now(self.slot.frame_count() + 1))
    }

    /// Synchronous one-off capture used when no frame has been published yet.
    ///
    /// The result is returned directly and not published.
    #[instrument(skip(self))]
    pub async fn capture_on_demand(self: &Arc<Self>) -> Result<EncodedFrame, QueryError> {
        if self.is_shut_down() {
            return Err(QueryError::ShuttingDown);
        }

        let ctx = Arc::clone(self);
        let quality = self.stream.snapshot_quality;
        let frame = tokio::task::spawn_blocking(move || ctx.capture_blocking(quality))
            .await
            .map_err(|e| CaptureError::ReadFailure(format!("capture task failed: {e}")))?;

        match frame {
            Ok(frame) => {
                metrics::counter!("frameport_on_demand_captures_total").increment(1);
                Ok(frame)
            }
            Err(_) if self.is_shut_down() => Err(QueryError::ShuttingDown),
            Err(e) => Err(e.into()),
        }
    }
}
