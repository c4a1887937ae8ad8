//! Scripted collaborators for driving sessions under paused tokio time.

use crate::remote::{FaceService, RecordsService, Registered, RemoteResult, ServiceError};
use crate::source::{FrameSource, SourceError};
use crate::events::{EventReceiver, SessionEvent};
use async_trait::async_trait;
use rollcall_core::{
    AttendanceStatus, BoundingBox, DetectionResult, PersonSummary, RecognitionOutcome,
    RegistrationDraft, Snapshot,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Hands out numbered 640x480 stills, or nothing for sequence numbers in `gaps`.
pub(crate) struct CountingSource {
    pub next: u64,
    pub gaps: Vec<u64>,
}

impl CountingSource {
    pub(crate) fn new() -> Self {
        Self { next: 0, gaps: Vec::new() }
    }
}

impl FrameSource for CountingSource {
    fn snapshot(&mut self) -> Result<Option<Snapshot>, SourceError> {
        self.next += 1;
        if self.gaps.contains(&self.next) {
            return Ok(None);
        }
        Ok(Some(Snapshot {
            jpeg: vec![self.next as u8],
            width: 640,
            height: 480,
            sequence: self.next,
        }))
    }
}

/// Blocks inside `snapshot` until released, like a camera that stopped
/// delivering buffers. Reports each entry on `entered`.
pub(crate) struct StalledSource {
    entered: tokio::sync::mpsc::UnboundedSender<()>,
    release: std::sync::mpsc::Receiver<()>,
}

impl StalledSource {
    pub(crate) fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<()>, std::sync::mpsc::Sender<()>) {
        let (entered, entered_rx) = tokio::sync::mpsc::unbounded_channel();
        let (release_tx, release) = std::sync::mpsc::channel();
        (Self { entered, release }, entered_rx, release_tx)
    }
}

impl FrameSource for StalledSource {
    fn snapshot(&mut self) -> Result<Option<Snapshot>, SourceError> {
        let _ = self.entered.send(());
        self.release.recv()?;
        Ok(None)
    }
}

pub(crate) fn faces(n: usize) -> DetectionResult {
    DetectionResult {
        faces: (0..n)
            .map(|i| BoundingBox { x: 100.0 + 120.0 * i as f32, y: 80.0, width: 100.0, height: 120.0 })
            .collect(),
    }
}

pub(crate) fn person(id: i64, name: &str) -> PersonSummary {
    PersonSummary {
        id,
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        mobile_number: "5550100".to_string(),
        gender: "Female".to_string(),
    }
}

pub(crate) fn outcome(p: &PersonSummary, status: AttendanceStatus) -> RecognitionOutcome {
    RecognitionOutcome { person: Some(p.clone()), status }
}

pub(crate) fn draft() -> RegistrationDraft {
    RegistrationDraft::new("Asha Rao", "asha@example.com", "5550100", "Female")
}

/// Face service answering from a script, then repeating `fallback`.
pub(crate) struct ScriptedFace {
    script: Mutex<VecDeque<RemoteResult<DetectionResult>>>,
    fallback: RemoteResult<DetectionResult>,
    delay: Duration,
    seen: Mutex<Vec<u64>>,
}

impl ScriptedFace {
    pub(crate) fn new(
        script: Vec<RemoteResult<DetectionResult>>,
        fallback: RemoteResult<DetectionResult>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Every call takes `delay` to answer.
    pub(crate) fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Sequence numbers of the snapshots submitted so far.
    pub(crate) fn seen(&self) -> Vec<u64> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl FaceService for ScriptedFace {
    async fn detect(&self, image: &Snapshot) -> RemoteResult<DetectionResult> {
        self.seen.lock().unwrap().push(image.sequence);
        let next = self.script.lock().unwrap().pop_front();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Records service answering marks and registrations from scripts.
pub(crate) struct ScriptedRecords {
    marks: Mutex<VecDeque<RemoteResult<RecognitionOutcome>>>,
    registrations: Mutex<VecDeque<RemoteResult<Registered>>>,
    mark_delay: Duration,
    mark_calls: Mutex<Vec<u64>>,
    register_calls: Mutex<Vec<(RegistrationDraft, u64)>>,
}

impl ScriptedRecords {
    pub(crate) fn new() -> Self {
        Self {
            marks: Mutex::new(VecDeque::new()),
            registrations: Mutex::new(VecDeque::new()),
            mark_delay: Duration::ZERO,
            mark_calls: Mutex::new(Vec::new()),
            register_calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_marks(self, marks: Vec<RemoteResult<RecognitionOutcome>>) -> Self {
        *self.marks.lock().unwrap() = marks.into();
        self
    }

    /// Every recognize-and-mark call takes `delay` to answer.
    pub(crate) fn slow_marks(mut self, delay: Duration) -> Self {
        self.mark_delay = delay;
        self
    }

    pub(crate) fn with_registrations(self, results: Vec<RemoteResult<Registered>>) -> Self {
        *self.registrations.lock().unwrap() = results.into();
        self
    }

    pub(crate) fn mark_calls(&self) -> usize {
        self.mark_calls.lock().unwrap().len()
    }

    /// Sequence numbers of the snapshots sent for recognition so far.
    pub(crate) fn marked(&self) -> Vec<u64> {
        self.mark_calls.lock().unwrap().clone()
    }

    pub(crate) fn register_calls(&self) -> Vec<(RegistrationDraft, u64)> {
        self.register_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordsService for ScriptedRecords {
    async fn recognize_and_mark(&self, image: &Snapshot) -> RemoteResult<RecognitionOutcome> {
        self.mark_calls.lock().unwrap().push(image.sequence);
        let next = self.marks.lock().unwrap().pop_front();
        if !self.mark_delay.is_zero() {
            tokio::time::sleep(self.mark_delay).await;
        }
        next.unwrap_or_else(|| Ok(RecognitionOutcome::not_recognized()))
    }

    async fn register(&self, draft: &RegistrationDraft, image: &Snapshot) -> RemoteResult<Registered> {
        self.register_calls.lock().unwrap().push((draft.clone(), image.sequence));
        self.registrations.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(Registered { message: "User registered successfully".to_string(), user_id: Some(1) })
        })
    }
}

pub(crate) fn service_down() -> ServiceError {
    ServiceError::network("Failed to detect face")
}

pub(crate) fn drain(events: &mut EventReceiver) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
