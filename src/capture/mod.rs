pub mod convert;
pub mod frame;
pub mod replay;
pub mod source;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use convert::{to_luma, ConvertError, LumaImage};
pub use frame::{Frame, FrameMetadata, FrameRelease, PixelFormat, ReleaseError, Rotation};
pub use replay::ReplayCamera;
pub use source::{Camera, CameraError, FrameSink};
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Camera;
