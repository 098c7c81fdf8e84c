use image::{ImageFormat, RgbImage};

use super::frame::{PixelFormat, RawFrame};
use crate::CaptureError;

/// Convert a raw frame of any supported format into a packed RGB image
pub fn decode_frame(frame: &RawFrame) -> Result<RgbImage, CaptureError> {
    if frame.data.is_empty() {
        return Err(CaptureError::EncodeFailure("empty frame".into()));
    }

    if frame.format == PixelFormat::Mjpeg {
        // Device-side JPEG; the decoded size wins over the requested size
        let decoded = image::load_from_memory_with_format(&frame.data, ImageFormat::Jpeg)
            .map_err(|e| CaptureError::EncodeFailure(format!("MJPEG decode: {e}")))?;
        return Ok(decoded.to_rgb8());
    }

    let (width, height) = (frame.width as usize, frame.height as usize);
    if width == 0 || height == 0 {
        return Err(CaptureError::EncodeFailure(format!(
            "zero-sized frame {}x{}",
            frame.width, frame.height
        )));
    }

    let bpp = frame.format.bytes_per_pixel().unwrap_or(3);
    let expected = width * height * bpp;
    if frame.data.len() != expected {
        return Err(CaptureError::EncodeFailure(format!(
            "{:?} frame {}x{} should be {} bytes, got {}",
            frame.format,
            frame.width,
            frame.height,
            expected,
            frame.data.len()
        )));
    }

    let rgb = match frame.format {
        PixelFormat::Rgb24 => frame.data.to_vec(),
        PixelFormat::Bgr24 => frame
            .data
            .chunks_exact(3)
            .flat_map(|px| [px[2], px[1], px[0]])
            .collect(),
        PixelFormat::Gray8 => frame.data.iter().flat_map(|&y| [y, y, y]).collect(),
        PixelFormat::Yuyv4 => {
            if frame.data.len() % 4 != 0 {
                return Err(CaptureError::EncodeFailure(
                    "YUYV frame needs an even pixel count".into(),
                ));
            }
            yuyv_to_rgb(&frame.data)
        }
        PixelFormat::Mjpeg => unreachable!("handled above"),
    };

    RgbImage::from_raw(frame.width, frame.height, rgb)
        .ok_or_else(|| CaptureError::EncodeFailure("RGB buffer size mismatch".into()))
}

/// BT.601 limited-range YUYV (YUY2) to RGB24
fn yuyv_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 * 3);
    for chunk in data.chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        out.extend_from_slice(&yuv_pixel(y0, u, v));
        out.extend_from_slice(&yuv_pixel(y1, u, v));
    }
    out
}

fn yuv_pixel(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| (x >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e + 128),
        clamp(298 * c - 100 * d - 208 * e + 128),
        clamp(298 * c + 516 * d + 128),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgr_is_swapped() {
        let frame = RawFrame::new(vec![1u8, 2, 3], 1, 1, PixelFormat::Bgr24);
        let rgb = decode_frame(&frame).unwrap();
        assert_eq!(rgb.as_raw(), &vec![3, 2, 1]);
    }

    #[test]
    fn test_gray_is_expanded() {
        let frame = RawFrame::new(vec![7u8, 9], 2, 1, PixelFormat::Gray8);
        let rgb = decode_frame(&frame).unwrap();
        assert_eq!(rgb.as_raw(), &vec![7, 7, 7, 9, 9, 9]);
    }

    #[test]
    fn test_yuyv_black_and_white() {
        // Y=16 is black, Y=235 is white, neutral chroma
        let frame = RawFrame::new(vec![16u8, 128, 235, 128], 2, 1, PixelFormat::Yuyv4);
        let rgb = decode_frame(&frame).unwrap();
        assert_eq!(&rgb.as_raw()[..3], &[0, 0, 0]);
        assert_eq!(&rgb.as_raw()[3..], &[255, 255, 255]);
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let frame = RawFrame::new(vec![0u8; 11], 2, 2, PixelFormat::Rgb24);
        assert!(matches!(
            decode_frame(&frame),
            Err(CaptureError::EncodeFailure(_))
        ));
    }

    #[test]
    fn test_garbage_mjpeg_is_rejected() {
        let frame = RawFrame::new(vec![0xAAu8; 64], 2, 2, PixelFormat::Mjpeg);
        assert!(decode_frame(&frame).is_err());
    }
}
