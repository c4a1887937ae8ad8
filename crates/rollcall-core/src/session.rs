//! Capture session bookkeeping shared by the registration and attendance flows.

use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Registration,
    Attendance,
}

/// One open capture screen.
///
/// The in-flight flag and the auto-capture latch are plain fields so that
/// teardown can inspect and reset them; nothing here depends on how timers
/// are scheduled.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    id: Uuid,
    mode: CaptureMode,
    active: bool,
    interval: Duration,
    in_flight: bool,
    auto_capture_triggered: bool,
}

impl CaptureSession {
    /// Open a new, active session with a fresh id.
    pub fn open(mode: CaptureMode, interval: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            mode,
            active: true,
            interval,
            in_flight: false,
            auto_capture_triggered: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// True when `id` names this session and it has not been closed.
    /// Deferred work must check this before touching anything.
    pub fn is_current(&self, id: Uuid) -> bool {
        self.active && self.id == id
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Claim the single outstanding-call slot. Returns false when the session
    /// is closed or a previous call has not returned yet.
    pub fn try_begin_call(&mut self) -> bool {
        if !self.active || self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    pub fn end_call(&mut self) {
        self.in_flight = false;
    }

    pub fn auto_capture_triggered(&self) -> bool {
        self.auto_capture_triggered
    }

    /// One-shot latch: returns true exactly once per session.
    pub fn trigger_auto_capture(&mut self) -> bool {
        if !self.active || self.auto_capture_triggered {
            return false;
        }
        self.auto_capture_triggered = true;
        true
    }

    /// Close the session. Clears both flags.
    pub fn close(&mut self) {
        self.active = false;
        self.in_flight = false;
        self.auto_capture_triggered = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> CaptureSession {
        CaptureSession::open(CaptureMode::Registration, Duration::from_millis(500))
    }

    #[test]
    fn test_single_outstanding_call() {
        let mut s = session();
        assert!(s.try_begin_call());
        assert!(!s.try_begin_call());
        s.end_call();
        assert!(s.try_begin_call());
    }

    #[test]
    fn test_latch_fires_once() {
        let mut s = session();
        assert!(s.trigger_auto_capture());
        assert!(!s.trigger_auto_capture());
        assert!(s.auto_capture_triggered());
    }

    #[test]
    fn test_closed_session_refuses_work() {
        let mut s = session();
        let id = s.id();
        s.close();
        assert!(!s.is_current(id));
        assert!(!s.try_begin_call());
        assert!(!s.trigger_auto_capture());
    }

    #[test]
    fn test_is_current_rejects_other_ids() {
        let a = session();
        let b = session();
        assert!(a.is_current(a.id()));
        assert!(!a.is_current(b.id()));
    }
}
