//! RGB to JPEG compression for the wire.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;

use super::decoder::decode_frame;
use super::frame::{EncodedFrame, FrameStamp, RawFrame};
use crate::CaptureError;

pub const MIN_QUALITY: u8 = 1;
pub const MAX_QUALITY: u8 = 100;

/// Clamp a requested JPEG quality into `1..=100`
pub fn clamp_quality(quality: i32) -> u8 {
    quality.clamp(MIN_QUALITY as i32, MAX_QUALITY as i32) as u8
}

/// Compress `raw` to JPEG. Out-of-range qualities are clamped, never rejected.
///
/// The stamp is supplied by the caller so identical inputs give identical output.
pub fn encode(
    raw: &RawFrame,
    quality: i32,
    stamp: FrameStamp,
) -> Result<EncodedFrame, CaptureError> {
    let quality = clamp_quality(quality);
    let rgb = decode_frame(raw)?;

    let mut buffer = Vec::with_capacity(rgb.as_raw().len() / 8);
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(&rgb)
        .map_err(|e| CaptureError::EncodeFailure(format!("JPEG encode failed: {e}")))?;

    Ok(EncodedFrame {
        jpeg: Bytes::from(buffer),
        quality,
        width: rgb.width(),
        height: rgb.height(),
        captured_at: stamp.captured_at,
        sequence: stamp.sequence,
    })
}
