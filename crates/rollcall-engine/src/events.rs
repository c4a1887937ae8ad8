//! Events a capture session reports to its screen.

use rollcall_core::{Announcement, PersonSummary, RegistrationState, ValidationError};
use tokio::sync::mpsc;

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Overlay redrawn (or cleared) for the latest detection.
    Overlay { face_present: bool, faces: usize },
    NoFace,
    ServiceError(String),

    ValidationFailed(ValidationError),
    CaptureStarted,
    FaceDetected,
    StateChanged(RegistrationState),
    Registering,
    Registered { message: String },
    RegistrationFailed { error: String },
    Cancelled,

    JustMarked(PersonSummary),
    AlreadyMarked(PersonSummary),
    NotRecognized,
}

impl SessionEvent {
    /// The plain status line shown to the user, if this event has one.
    pub fn status_line(&self) -> Option<String> {
        let line = match self {
            SessionEvent::Overlay { .. } | SessionEvent::StateChanged(_) => return None,
            SessionEvent::NoFace => "No Face Detected".to_string(),
            SessionEvent::ServiceError(e) => format!("Error: {e}"),
            SessionEvent::ValidationFailed(_) => "Please fill all the fields first.".to_string(),
            SessionEvent::CaptureStarted => "Capturing started. Please look at the camera.".to_string(),
            SessionEvent::FaceDetected => "Face Detected! Auto-capturing...".to_string(),
            SessionEvent::Registering => "Registering...".to_string(),
            SessionEvent::Registered { message } => message.clone(),
            SessionEvent::RegistrationFailed { error } => format!("Error: {error}"),
            SessionEvent::Cancelled => "Capture cancelled.".to_string(),
            SessionEvent::JustMarked(p) => Announcement::JustMarked(p.clone()).message(),
            SessionEvent::AlreadyMarked(p) => Announcement::AlreadyMarked(p.clone()).message(),
            SessionEvent::NotRecognized => Announcement::NotRecognized.message(),
        };
        Some(line)
    }
}

impl From<Announcement> for SessionEvent {
    fn from(a: Announcement) -> Self {
        match a {
            Announcement::JustMarked(p) => SessionEvent::JustMarked(p),
            Announcement::AlreadyMarked(p) => SessionEvent::AlreadyMarked(p),
            Announcement::NotRecognized => SessionEvent::NotRecognized,
        }
    }
}

/// Send without caring whether the screen is still listening.
pub(crate) fn emit(events: &EventSender, event: SessionEvent) {
    let _ = events.send(event);
}
