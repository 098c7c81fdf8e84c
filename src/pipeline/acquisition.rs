//! Background producer: device -> encoder -> frame slot, at a bounded rate.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::context::{AcquisitionState, CaptureContext};
use crate::CaptureError;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("acquisition loop already running")]
    AlreadyRunning,

    #[error("capture context has been shut down")]
    ShutDown,
}

/// Handle to the running acquisition loop
pub struct Acquisition {
    ctx: Arc<CaptureContext>,
    task: Option<JoinHandle<()>>,
}

impl Acquisition {
    /// Start the loop on the current Tokio runtime.
    ///
    /// Only one loop may run per context.
    pub fn start(ctx: Arc<CaptureContext>) -> Result<Self, AcquisitionError> {
        if ctx.is_shut_down() {
            return Err(AcquisitionError::ShutDown);
        }
        if !ctx.transition(AcquisitionState::Stopped, AcquisitionState::Starting) {
            return Err(AcquisitionError::AlreadyRunning);
        }

        let task = tokio::spawn(run(ctx.clone()));
        Ok(Self {
            ctx,
            task: Some(task),
        })
    }

    pub fn context(&self) -> &Arc<CaptureContext> {
        &self.ctx
    }

    /// Stop the loop and wait until it has released the device
    pub async fn stop(mut self) {
        self.ctx.request_shutdown();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Camera loop task failed: {}", e);
                release_device(&self.ctx).await;
            }
        }
        self.ctx.set_state(AcquisitionState::Stopped);
    }
}

impl Drop for Acquisition {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.ctx.request_shutdown();
        }
    }
}

async fn run(ctx: Arc<CaptureContext>) {
    let frame_interval = ctx.capture_config().frame_interval();
    let backoff = ctx.stream_config().backoff();
    let quality = ctx.stream_config().quality;
    let mut device_failures = FailureTracker::new(ctx.stream_config().lost_warn_threshold);

    if ctx.transition(AcquisitionState::Starting, AcquisitionState::Running) {
        ctx.slot().set_streaming(true);
    }
    info!(
        "Camera loop started: target {}fps, quality {}",
        ctx.capture_config().fps,
        quality
    );

    while !ctx.is_shut_down() {
        let cycle_start = Instant::now();

        let worker = ctx.clone();
        let result = tokio::task::spawn_blocking(move || worker.capture_blocking(quality))
            .await
            .unwrap_or_else(|e| {
                Err(CaptureError::ReadFailure(format!("capture task failed: {e}")))
            });

        let pause = match result {
            Ok(_) if ctx.is_shut_down() => break,
            Ok(frame) => {
                device_failures.reset();
                let sequence = ctx.slot().publish(frame);
                if sequence % 100 == 0 {
                    debug!("Published frame {}", sequence);
                }
                frame_interval.saturating_sub(cycle_start.elapsed())
            }
            Err(e) if e.needs_reopen() => {
                metrics::counter!("frameport_cycles_skipped_total", "reason" => "device")
                    .increment(1);
                if device_failures.record() {
                    error!(
                        "Camera unavailable for {} consecutive cycles: {}",
                        device_failures.count(),
                        e
                    );
                } else {
                    debug!("Camera unavailable: {}", e);
                }
                backoff
            }
            Err(e @ CaptureError::EncodeFailure(_)) => {
                metrics::counter!("frameport_cycles_skipped_total", "reason" => "encode")
                    .increment(1);
                warn!("Skipping frame: {}", e);
                backoff
            }
            Err(e) => {
                metrics::counter!("frameport_cycles_skipped_total", "reason" => "read")
                    .increment(1);
                debug!("Skipping frame: {}", e);
                backoff
            }
        };

        pause_for(&ctx, pause).await;
    }

    ctx.set_state(AcquisitionState::Stopping);
    ctx.slot().set_streaming(false);
    release_device(&ctx).await;
    ctx.set_state(AcquisitionState::Stopped);
    info!(
        "Camera loop stopped after {} frames",
        ctx.slot().frame_count()
    );
}

/// Sleep for `pause`, waking early when shutdown is requested
async fn pause_for(ctx: &CaptureContext, pause: Duration) {
    if pause.is_zero() {
        return;
    }
    let shutdown = ctx.shutdown_notified();
    tokio::pin!(shutdown);
    // Registered before the flag check so a concurrent request cannot be missed
    shutdown.as_mut().enable();
    if ctx.is_shut_down() {
        return;
    }
    tokio::select! {
        _ = tokio::time::sleep(pause) => {}
        _ = shutdown => {}
    }
}

/// Counts consecutive device failures and reports the first one reaching the threshold
struct FailureTracker {
    count: u32,
    threshold: u32,
    reported: bool,
}

impl FailureTracker {
    fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold,
            reported: false,
        }
    }

    /// Record a failure; true exactly once per run of failures at the threshold
    fn record(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        if self.count >= self.threshold && !self.reported {
            self.reported = true;
            return true;
        }
        false
    }

    fn count(&self) -> u32 {
        self.count
    }

    fn reset(&mut self) {
        self.count = 0;
        self.reported = false;
    }
}

async fn release_device(ctx: &Arc<CaptureContext>) {
    let ctx = ctx.clone();
    let released = tokio::task::spawn_blocking(move || ctx.with_device(|device| device.close()));
    if let Err(e) = released.await {
        error!("Failed to release camera: {}", e);
    }
}
