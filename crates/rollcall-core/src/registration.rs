//! One-shot registration capture state machine.
//!
//! ```text
//! Idle -> FieldsValidated -> Sampling -> FaceStable -> Captured -> Submitted
//!   ^                                                               |
//!   +------------------- success / failure / cancel ----------------+
//! ```
//!
//! This type only decides transitions; timers and remote calls live in the
//! engine that drives it.

use crate::session::{CaptureMode, CaptureSession};
use crate::types::{DetectionResult, RegistrationDraft, Snapshot, ValidationError};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Idle,
    FieldsValidated,
    Sampling,
    FaceStable,
    Captured,
    Submitted,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: RegistrationState,
    },
}

/// What the driver should do after a detection result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionStep {
    /// No face yet; keep sampling.
    NoFace,
    /// First stable face: capture `snapshot` after the settle delay, then call
    /// back with `session`.
    ScheduleCapture { session: Uuid, snapshot: Snapshot },
    /// Result arrived for a session that is no longer sampling.
    Ignored,
}

pub struct RegistrationMachine {
    state: RegistrationState,
    draft: RegistrationDraft,
    session: Option<CaptureSession>,
    interval: Duration,
}

impl RegistrationMachine {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: RegistrationState::Idle,
            draft: RegistrationDraft::default(),
            session: None,
            interval,
        }
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    pub fn draft(&self) -> &RegistrationDraft {
        &self.draft
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut CaptureSession> {
        self.session.as_mut()
    }

    /// Replace the identity fields. Only allowed while idle.
    pub fn set_draft(&mut self, draft: RegistrationDraft) -> Result<(), TransitionError> {
        self.expect_state("edit the draft", RegistrationState::Idle)?;
        self.draft = draft;
        Ok(())
    }

    /// `Idle -> FieldsValidated`. On a validation failure the state stays `Idle`.
    pub fn validate_fields(&mut self) -> Result<(), TransitionError> {
        self.expect_state("start capture", RegistrationState::Idle)?;
        self.draft.validate()?;
        self.state = RegistrationState::FieldsValidated;
        Ok(())
    }

    /// `FieldsValidated -> Sampling`: opens a fresh capture session.
    pub fn begin_sampling(&mut self) -> Result<Uuid, TransitionError> {
        self.expect_state("begin sampling", RegistrationState::FieldsValidated)?;
        let session = CaptureSession::open(CaptureMode::Registration, self.interval);
        let id = session.id();
        self.session = Some(session);
        self.state = RegistrationState::Sampling;
        Ok(id)
    }

    /// Only the `Sampling` state consumes frames.
    pub fn wants_frames(&self) -> bool {
        self.state == RegistrationState::Sampling
            && self.session.as_ref().is_some_and(|s| s.is_active())
    }

    /// Feed a detection for `snapshot`. Moves to `FaceStable` on the first face
    /// and arms the one-shot latch.
    pub fn on_detection(
        &mut self,
        session_id: Uuid,
        snapshot: &Snapshot,
        result: &DetectionResult,
    ) -> DetectionStep {
        if self.state != RegistrationState::Sampling {
            return DetectionStep::Ignored;
        }
        let Some(session) = self.session.as_mut().filter(|s| s.is_current(session_id)) else {
            return DetectionStep::Ignored;
        };
        if !result.face_present() {
            return DetectionStep::NoFace;
        }
        if !session.trigger_auto_capture() {
            return DetectionStep::Ignored;
        }
        self.state = RegistrationState::FaceStable;
        DetectionStep::ScheduleCapture {
            session: session_id,
            snapshot: snapshot.clone(),
        }
    }

    /// `FaceStable -> Captured`, fired by the settle timer. Returns false if the
    /// session that scheduled the capture is gone.
    pub fn capture(&mut self, session_id: Uuid, snapshot: Snapshot) -> bool {
        let current = self.session.as_ref().is_some_and(|s| s.is_current(session_id));
        if !current || self.state != RegistrationState::FaceStable {
            return false;
        }
        self.draft.captured_image = Some(snapshot);
        self.state = RegistrationState::Captured;
        true
    }

    /// `Captured -> Submitted`: hands out the draft to submit.
    pub fn submit(&mut self) -> Result<RegistrationDraft, TransitionError> {
        self.expect_state("submit", RegistrationState::Captured)?;
        self.state = RegistrationState::Submitted;
        Ok(self.draft.clone())
    }

    /// Submission succeeded: clear the draft, stop sampling, back to `Idle`.
    pub fn complete(&mut self) {
        self.close_session();
        self.draft.clear();
        self.state = RegistrationState::Idle;
    }

    /// Submission failed: stop sampling, back to `Idle`, keep the draft.
    pub fn fail(&mut self) {
        self.close_session();
        self.state = RegistrationState::Idle;
    }

    /// Cancel from any non-terminal state. Returns whether anything changed.
    pub fn cancel(&mut self) -> bool {
        match self.state {
            RegistrationState::Idle | RegistrationState::Submitted => false,
            _ => {
                self.close_session();
                self.draft.captured_image = None;
                self.state = RegistrationState::Idle;
                true
            }
        }
    }

    fn close_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }

    fn expect_state(
        &self,
        action: &'static str,
        expected: RegistrationState,
    ) -> Result<(), TransitionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(TransitionError::InvalidState {
                action,
                state: self.state,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;

    fn filled() -> RegistrationDraft {
        RegistrationDraft::new("Asha", "asha@example.com", "5550100", "Female")
    }

    fn snap(seq: u64) -> Snapshot {
        Snapshot { jpeg: vec![seq as u8], width: 640, height: 480, sequence: seq }
    }

    fn face() -> DetectionResult {
        DetectionResult {
            faces: vec![BoundingBox { x: 1.0, y: 1.0, width: 5.0, height: 5.0 }],
        }
    }

    fn sampling() -> (RegistrationMachine, Uuid) {
        let mut m = RegistrationMachine::new(Duration::from_millis(500));
        m.set_draft(filled()).unwrap();
        m.validate_fields().unwrap();
        let id = m.begin_sampling().unwrap();
        (m, id)
    }

    #[test]
    fn test_missing_fields_stay_idle() {
        let mut m = RegistrationMachine::new(Duration::from_millis(500));
        m.set_draft(RegistrationDraft::new("Asha", "", "", "Female")).unwrap();
        let err = m.validate_fields().unwrap_err();
        assert!(matches!(err, TransitionError::Validation(_)));
        assert_eq!(m.state(), RegistrationState::Idle);
    }

    #[test]
    fn test_no_face_keeps_sampling() {
        let (mut m, id) = sampling();
        let step = m.on_detection(id, &snap(1), &DetectionResult::default());
        assert_eq!(step, DetectionStep::NoFace);
        assert_eq!(m.state(), RegistrationState::Sampling);
        assert!(m.wants_frames());
    }

    #[test]
    fn test_first_face_schedules_capture_of_same_snapshot() {
        let (mut m, id) = sampling();
        let step = m.on_detection(id, &snap(3), &face());
        assert_eq!(
            step,
            DetectionStep::ScheduleCapture { session: id, snapshot: snap(3) }
        );
        assert_eq!(m.state(), RegistrationState::FaceStable);
        assert!(!m.wants_frames());
    }

    #[test]
    fn test_auto_capture_latches_once() {
        let (mut m, id) = sampling();
        assert!(matches!(m.on_detection(id, &snap(1), &face()), DetectionStep::ScheduleCapture { .. }));
        assert_eq!(m.on_detection(id, &snap(2), &face()), DetectionStep::Ignored);
        assert!(m.session().unwrap().auto_capture_triggered());
    }

    #[test]
    fn test_full_success_clears_draft() {
        let (mut m, id) = sampling();
        m.on_detection(id, &snap(1), &face());
        assert!(m.capture(id, snap(1)));
        let draft = m.submit().unwrap();
        assert_eq!(draft.captured_image, Some(snap(1)));
        assert_eq!(m.state(), RegistrationState::Submitted);
        m.complete();
        assert_eq!(m.state(), RegistrationState::Idle);
        assert_eq!(m.draft(), &RegistrationDraft::default());
        assert!(m.session().is_none());
    }

    #[test]
    fn test_failure_keeps_draft() {
        let (mut m, id) = sampling();
        m.on_detection(id, &snap(1), &face());
        m.capture(id, snap(1));
        m.submit().unwrap();
        m.fail();
        assert_eq!(m.state(), RegistrationState::Idle);
        assert_eq!(m.draft().name, "Asha");
        // a retry can start straight away
        m.validate_fields().unwrap();
    }

    #[test]
    fn test_cancel_invalidates_scheduled_capture() {
        let (mut m, id) = sampling();
        m.on_detection(id, &snap(1), &face());
        assert!(m.cancel());
        assert_eq!(m.state(), RegistrationState::Idle);
        assert!(!m.capture(id, snap(1)));
        assert!(m.submit().is_err());
    }

    #[test]
    fn test_stale_session_capture_rejected() {
        let (mut m, old) = sampling();
        m.cancel();
        m.validate_fields().unwrap();
        let new = m.begin_sampling().unwrap();
        m.on_detection(new, &snap(5), &face());
        assert!(!m.capture(old, snap(1)));
        assert!(m.capture(new, snap(5)));
    }

    #[test]
    fn test_cancel_refused_when_idle_or_submitted() {
        let mut m = RegistrationMachine::new(Duration::from_millis(500));
        assert!(!m.cancel());
        let (mut m2, id) = sampling();
        m2.on_detection(id, &snap(1), &face());
        m2.capture(id, snap(1));
        m2.submit().unwrap();
        assert!(!m2.cancel());
        assert_eq!(m2.state(), RegistrationState::Submitted);
    }

    #[test]
    fn test_draft_locked_outside_idle() {
        let (mut m, _) = sampling();
        assert!(m.set_draft(filled()).is_err());
    }
}
