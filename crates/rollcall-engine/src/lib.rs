//! rollcall-engine: live capture orchestration.
//!
//! Samples a video source at a fixed cadence, sends frames to the face
//! service, draws detection overlays, drives the one-shot registration
//! capture and runs the attendance polling loop. Each open screen is one
//! tokio task reached through a clone-safe handle; what happens on screen is
//! reported as [`SessionEvent`]s.

pub mod attendance;
pub mod config;
mod display;
pub mod error;
pub mod events;
pub mod http;
mod inflight;
pub mod records;
pub mod registration;
pub mod remote;
pub mod sampler;
pub mod source;

#[cfg(test)]
mod testing;

pub use attendance::{spawn_attendance, AttendanceHandle};
pub use config::{Config, ConfigError};
pub use error::EngineError;
pub use events::{EventReceiver, EventSender, SessionEvent};
pub use http::HttpBackend;
pub use registration::{spawn_registration, RegistrationHandle};
pub use remote::{FaceService, RecordsService, Registered, RemoteResult, ServiceError, ServiceErrorKind};
pub use sampler::FrameSampler;
pub use source::{CameraSource, FrameSource};
