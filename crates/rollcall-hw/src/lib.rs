//! rollcall-hw: Hardware abstraction for live camera capture.
//!
//! Provides V4L2-based camera access and conversion of raw buffers into
//! JPEG stills suitable for the face service.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError, PixelLayout};
