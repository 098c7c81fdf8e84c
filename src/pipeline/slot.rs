//! Single-frame "latest wins" cache shared between the producer and readers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::Serialize;

use crate::capture::EncodedFrame;
use crate::CaptureConfig;

/// Holds the most recently published frame.
///
/// Publication is a single atomic pointer swap, so readers observe either the
/// previous frame or the new one, never a mix. The sequence number lives in
/// the frame itself, which keeps `frame_count` and the frame consistent.
pub struct FrameSlot {
    latest: ArcSwapOption<EncodedFrame>,
    streaming: AtomicBool,
    width: u32,
    height: u32,
    fps: u32,
}

/// Point-in-time view of the slot counters and capture configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotStatus {
    pub is_streaming: bool,
    pub frame_count: u64,
    pub resolution: String,
    pub fps: u32,
}

impl FrameSlot {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            latest: ArcSwapOption::empty(),
            streaming: AtomicBool::new(false),
            width: config.width,
            height: config.height,
            fps: config.fps,
        }
    }

    /// Replace the cached frame and return the sequence number it was given.
    ///
    /// The previous frame is dropped once its last reader lets go of it.
    pub fn publish(&self, frame: EncodedFrame) -> u64 {
        let mut sequence = 0;
        self.latest.rcu(|current| {
            sequence = current.as_ref().map_or(0, |f| f.sequence) + 1;
            Some(Arc::new(frame.clone().with_sequence(sequence)))
        });
        metrics::counter!("frameport_frames_published_total").increment(1);
        sequence
    }

    /// Latest frame, or `None` before the first publish
    pub fn read(&self) -> Option<Arc<EncodedFrame>> {
        self.latest.load_full()
    }

    /// Number of frames published so far
    pub fn frame_count(&self) -> u64 {
        let guard = self.latest.load();
        match &*guard {
            Some(frame) => frame.sequence,
            None => 0,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub(crate) fn set_streaming(&self, streaming: bool) {
        self.streaming.store(streaming, Ordering::Release);
    }

    pub fn status(&self) -> SlotStatus {
        SlotStatus {
            is_streaming: self.is_streaming(),
            frame_count: self.frame_count(),
            resolution: format!("{}x{}", self.width, self.height),
            fps: self.fps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{encode, FrameStamp};
    use crate::{PixelFormat, RawFrame};
    use std::thread;

    fn frame(value: u8) -> EncodedFrame {
        let raw = RawFrame::new(vec![value; 12], 2, 2, PixelFormat::Rgb24);
        encode(&raw, 80, FrameStamp::now(0)).unwrap()
    }

    #[test]
    fn test_empty_before_publish() {
        let slot = FrameSlot::new(&CaptureConfig::default());
        assert!(slot.read().is_none());
        assert_eq!(slot.frame_count(), 0);
    }

    #[test]
    fn test_nth_publish_is_read_back() {
        let slot = FrameSlot::new(&CaptureConfig::default());
        for n in 1..=5u64 {
            let f = frame(n as u8 * 40);
            let payload = f.jpeg.clone();
            assert_eq!(slot.publish(f), n);

            let read = slot.read().unwrap();
            assert_eq!(read.sequence, n);
            assert_eq!(read.jpeg, payload);
            assert_eq!(slot.frame_count(), n);
        }
    }

    #[test]
    fn test_status_snapshot() {
        let slot = FrameSlot::new(&CaptureConfig::default());
        slot.set_streaming(true);
        slot.publish(frame(0));

        let status = slot.status();
        assert!(status.is_streaming);
        assert_eq!(status.frame_count, 1);
        assert_eq!(status.resolution, "640x480");
        assert_eq!(status.fps, 15);
    }

    #[test]
    fn test_concurrent_readers_see_whole_frames() {
        let slot = Arc::new(FrameSlot::new(&CaptureConfig::default()));
        let payloads: Vec<_> = (0..50u8).map(|i| frame(i * 5)).collect();
        let expected: Vec<_> = payloads.iter().map(|f| f.jpeg.clone()).collect();
        let expected = Arc::new(expected);

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let slot = slot.clone();
                let expected = expected.clone();
                thread::spawn(move || {
                    let mut last = 0;
                    for _ in 0..2_000 {
                        if let Some(f) = slot.read() {
                            assert!(f.sequence >= last);
                            assert_eq!(f.jpeg, expected[f.sequence as usize - 1]);
                            last = f.sequence;
                        }
                    }
                })
            })
            .collect();

        for f in payloads {
            slot.publish(f);
        }
        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(slot.frame_count(), 50);
    }
}
