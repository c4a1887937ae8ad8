//! rollcall-core: capture data model and the pure parts of the capture engine.
//!
//! Holds the detection overlay renderer, the per-session attendance status
//! cache and the registration state machine. Nothing in here performs I/O
//! beyond writing an overlay PNG; timers and remote calls live in
//! `rollcall-engine`.

pub mod overlay;
pub mod registration;
pub mod session;
pub mod status;
pub mod types;

pub use overlay::{BackingSize, OverlayRenderer};
pub use registration::{DetectionStep, RegistrationMachine, RegistrationState, TransitionError};
pub use session::{CaptureMode, CaptureSession};
pub use status::{Announcement, PersonEntry, PersonStatusCache};
pub use types::{
    AttendanceStatus, BoundingBox, DetectionResult, PersonId, PersonSummary, RecognitionOutcome,
    RegistrationDraft, Snapshot, ValidationError,
};
