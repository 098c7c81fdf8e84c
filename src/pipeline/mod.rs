pub mod acquisition;
pub mod context;
pub mod slot;

pub use acquisition::{Acquisition, AcquisitionError};
pub use context::{AcquisitionState, CameraStatus, CaptureContext};
pub use slot::{FrameSlot, SlotStatus};
