pub mod decoder;
pub mod device;
pub mod encoder;
pub mod frame;
pub mod v4l2;

pub use device::{CaptureDevice, DeviceHandle, FrameSource};
pub use encoder::encode;
pub use frame::{EncodedFrame, FrameStamp, PixelFormat, RawFrame};
pub use v4l2::V4l2Device;
