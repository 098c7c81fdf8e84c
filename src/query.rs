//! Read side used by request handlers: cached frame, fallback capture, status.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::Serialize;
use tracing::info;

use crate::pipeline::{CameraStatus, CaptureContext};
use crate::QueryError;

/// Text-safe frame record
#[derive(Debug, Clone, Serialize)]
pub struct FramePayload {
    /// Base64 (standard alphabet, padded) JPEG
    pub image: String,
    /// Capture time, seconds since the Unix epoch
    pub timestamp: f64,
    pub width: u32,
    pub height: u32,
}

/// Latest JPEG: the cached frame, or a one-off capture while the slot is empty.
pub async fn latest_jpeg(ctx: &Arc<CaptureContext>) -> Result<Bytes, QueryError> {
    if let Some(frame) = ctx.slot().read() {
        return Ok(frame.jpeg.clone());
    }
    if !ctx.stream_config().on_demand_fallback {
        return Err(QueryError::NotReady);
    }

    info!("No cached frame yet, capturing on demand");
    let frame = ctx.capture_on_demand().await?;
    Ok(frame.jpeg)
}

/// Same frame as [`latest_jpeg`], base64-encoded with its metadata.
pub async fn frame_payload(ctx: &Arc<CaptureContext>) -> Result<FramePayload, QueryError> {
    let frame = match ctx.slot().read() {
        Some(frame) => frame,
        None if ctx.stream_config().on_demand_fallback => {
            info!("No cached frame yet, capturing on demand");
            Arc::new(ctx.capture_on_demand().await?)
        }
        None => return Err(QueryError::NotReady),
    };

    Ok(FramePayload {
        image: STANDARD.encode(&frame.jpeg),
        timestamp: frame.timestamp(),
        width: frame.width,
        height: frame.height,
    })
}

/// Always succeeds, even while reads are failing
pub fn status(ctx: &CaptureContext) -> CameraStatus {
    ctx.status()
}
