#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use frameport::capture::{CaptureDevice, FrameSource};
use frameport::{CaptureConfig, CaptureError, PixelFormat, RawFrame, StreamConfig};

/// What the fake device does on a given read (numbered from 0 across reopens)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Frame,
    ReadFailure,
    Lost,
    Garbage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Open,
    Read(Step),
    Close,
}

#[derive(Default)]
pub struct Log {
    pub events: Mutex<Vec<Event>>,
    pub reads: AtomicUsize,
    pub frames: AtomicUsize,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    /// Reads that started while another read was still in progress
    pub overlapping_reads: AtomicUsize,
    reading: AtomicBool,
}

impl Log {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

type Script = Arc<dyn Fn(usize) -> Step + Send + Sync>;

/// Fake camera producing a fixed 2x2 RGB frame
pub struct ScriptedDevice {
    script: Script,
    failing_opens: usize,
    read_delay: Duration,
    log: Arc<Log>,
}

impl ScriptedDevice {
    pub fn new(script: impl Fn(usize) -> Step + Send + Sync + 'static) -> (Self, Arc<Log>) {
        let log = Arc::new(Log::default());
        let device = Self {
            script: Arc::new(script),
            failing_opens: 0,
            read_delay: Duration::ZERO,
            log: log.clone(),
        };
        (device, log)
    }

    pub fn healthy() -> (Self, Arc<Log>) {
        Self::new(|_| Step::Frame)
    }

    /// First `n` open attempts report the device as unavailable
    pub fn with_failing_opens(mut self, n: usize) -> Self {
        self.failing_opens = n;
        self
    }

    /// Every read blocks for `delay`, widening the window for concurrent access
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }
}

impl CaptureDevice for ScriptedDevice {
    fn open(&mut self, _config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
        if self.failing_opens > 0 {
            self.failing_opens -= 1;
            return Err(CaptureError::DeviceUnavailable("fake camera busy".into()));
        }
        self.log.opens.fetch_add(1, Ordering::SeqCst);
        self.log.push(Event::Open);
        Ok(Box::new(ScriptedSource {
            script: self.script.clone(),
            read_delay: self.read_delay,
            log: self.log.clone(),
            closed: false,
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedSource {
    script: Script,
    read_delay: Duration,
    log: Arc<Log>,
    closed: bool,
}

impl FrameSource for ScriptedSource {
    fn read_frame(&mut self) -> Result<RawFrame, CaptureError> {
        if self.log.reading.swap(true, Ordering::SeqCst) {
            self.log.overlapping_reads.fetch_add(1, Ordering::SeqCst);
        }
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }
        let result = self.scripted_read();
        self.log.reading.store(false, Ordering::SeqCst);
        result
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.closes.fetch_add(1, Ordering::SeqCst);
            self.log.push(Event::Close);
        }
    }
}

impl ScriptedSource {
    fn scripted_read(&mut self) -> Result<RawFrame, CaptureError> {
        let n = self.log.reads.fetch_add(1, Ordering::SeqCst);
        let step = (self.script)(n);
        self.log.push(Event::Read(step));
        match step {
            Step::Frame => {
                self.log.frames.fetch_add(1, Ordering::SeqCst);
                Ok(test_frame())
            }
            Step::ReadFailure => Err(CaptureError::ReadFailure("no data".into())),
            Step::Lost => Err(CaptureError::DeviceLost("unplugged".into())),
            Step::Garbage => Ok(RawFrame::new(vec![0u8; 5], 2, 2, PixelFormat::Rgb24)),
        }
    }
}

pub fn test_frame() -> RawFrame {
    RawFrame::new(
        vec![255u8, 0, 0, 0, 255, 0, 0, 0, 255, 128, 128, 128],
        2,
        2,
        PixelFormat::Rgb24,
    )
}

pub fn capture_config() -> CaptureConfig {
    CaptureConfig {
        width: 2,
        height: 2,
        fps: 15,
        format: PixelFormat::Rgb24,
        ..Default::default()
    }
}

pub fn stream_config() -> StreamConfig {
    StreamConfig {
        backoff_ms: 10,
        ..Default::default()
    }
}
