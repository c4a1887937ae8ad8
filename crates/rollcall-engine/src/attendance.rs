//! Attendance screen driver: a continuous detect → recognize-and-mark loop.
//!
//! Each tick runs in stages under one in-flight claim. The frame is grabbed
//! off the session task, then sent for detection; only when at least one face is present does the
//! same frame go to the records service for recognition. The next tick is not
//! sampled until every stage resolves.

use crate::config::Config;
use crate::display::OverlayDisplay;
use crate::error::EngineError;
use crate::events::{emit, EventSender, SessionEvent};
use crate::inflight::{settle, InFlight};
use crate::remote::{CallFuture, FaceService, RecordsService, RemoteResult};
use crate::sampler::{FrameSampler, Grabbed};
use crate::source::FrameSource;
use chrono::Utc;
use rollcall_core::{
    Announcement, CaptureMode, CaptureSession, DetectionResult, PersonEntry, PersonStatusCache,
    RecognitionOutcome, Snapshot,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

enum AttendanceRequest {
    Statuses {
        reply: oneshot::Sender<Vec<PersonEntry>>,
    },
    Shutdown {
        reply: oneshot::Sender<Vec<PersonEntry>>,
    },
}

/// Clone-safe handle to an attendance screen.
#[derive(Clone)]
pub struct AttendanceHandle {
    tx: mpsc::Sender<AttendanceRequest>,
}

impl AttendanceHandle {
    /// Person cards for everyone recognized so far, ordered by id.
    pub async fn statuses(&self) -> Result<Vec<PersonEntry>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AttendanceRequest::Statuses { reply })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Leave the screen. Returns the final person cards; the cache is
    /// discarded with the session.
    pub async fn shutdown(&self) -> Result<Vec<PersonEntry>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AttendanceRequest::Shutdown { reply })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Open an attendance screen on `source` and start polling right away.
///
/// Must be called inside a tokio runtime. The first frame is sampled one
/// full interval after this returns.
pub fn spawn_attendance<S>(
    source: S,
    face: Arc<dyn FaceService>,
    records: Arc<dyn RecordsService>,
    config: &Config,
    events: EventSender,
) -> AttendanceHandle
where
    S: FrameSource + 'static,
{
    let (tx, rx) = mpsc::channel(8);
    let session = CaptureSession::open(CaptureMode::Attendance, config.attendance_interval());
    tracing::info!(
        session = %session.id(),
        interval_ms = config.attendance_interval_ms,
        "attendance polling started"
    );
    let screen = AttendanceScreen {
        sampler: FrameSampler::new(source, session.interval()),
        session,
        face,
        records,
        overlay: OverlayDisplay::new(config.backing_size(), config.overlay_path.clone()),
        cache: PersonStatusCache::new(),
        events,
        grabbing: None,
        detecting: None,
        marking: None,
    };
    tokio::spawn(screen.run(rx));
    AttendanceHandle { tx }
}

struct AttendanceScreen<S> {
    session: CaptureSession,
    sampler: FrameSampler<S>,
    face: Arc<dyn FaceService>,
    records: Arc<dyn RecordsService>,
    overlay: OverlayDisplay,
    cache: PersonStatusCache,
    events: EventSender,
    grabbing: Option<InFlight<Grabbed, ()>>,
    detecting: Option<InFlight<RemoteResult<DetectionResult>, Snapshot>>,
    marking: Option<InFlight<RemoteResult<RecognitionOutcome>, u64>>,
}

impl<S: FrameSource + 'static> AttendanceScreen<S> {
    async fn run(mut self, mut requests: mpsc::Receiver<AttendanceRequest>) {
        let mut closed = None;
        while closed.is_none() {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(AttendanceRequest::Statuses { reply }) => {
                        let _ = reply.send(self.cache.entries());
                    }
                    Some(AttendanceRequest::Shutdown { reply }) => closed = Some(Some(reply)),
                    None => closed = Some(None),
                },
                _ = self.sampler.tick(), if self.session.is_active() => self.on_tick(),
                (grabbed, ()) = settle(&mut self.grabbing) => self.on_grab(grabbed),
                (result, snapshot) = settle(&mut self.detecting) => self.on_detect_result(snapshot, result),
                (result, seq) = settle(&mut self.marking) => self.on_mark_result(seq, result),
            }
        }
        let entries = self.teardown();
        if let Some(Some(reply)) = closed {
            let _ = reply.send(entries);
        }
    }

    fn on_tick(&mut self) {
        if let Some(grab) = self.sampler.sample(&mut self.session) {
            self.grabbing = Some(InFlight::new(grab, ()));
        }
    }

    fn on_grab(&mut self, grabbed: Grabbed) {
        let Some(snapshot) = self.sampler.accept(&mut self.session, grabbed) else {
            return;
        };
        let face = Arc::clone(&self.face);
        let image = snapshot.clone();
        let call: CallFuture<DetectionResult> = Box::pin(async move { face.detect(&image).await });
        self.detecting = Some(InFlight::new(call, snapshot));
    }

    fn on_detect_result(&mut self, snapshot: Snapshot, result: RemoteResult<DetectionResult>) {
        let detection = match result {
            Ok(detection) => detection,
            Err(e) => {
                tracing::warn!(error = %e, kind = ?e.kind, seq = snapshot.sequence, "face detection failed");
                let cleared = self.overlay.clear();
                emit(&self.events, cleared);
                emit(&self.events, SessionEvent::ServiceError(e.error));
                self.session.end_call();
                return;
            }
        };

        let drawn = self.overlay.show(&detection, snapshot.native_size());
        emit(&self.events, drawn);
        if !detection.face_present() {
            emit(&self.events, SessionEvent::NoFace);
            self.session.end_call();
            return;
        }

        tracing::debug!(faces = detection.faces.len(), seq = snapshot.sequence, "recognizing");
        let records = Arc::clone(&self.records);
        let seq = snapshot.sequence;
        let call: CallFuture<RecognitionOutcome> =
            Box::pin(async move { records.recognize_and_mark(&snapshot).await });
        self.marking = Some(InFlight::new(call, seq));
    }

    fn on_mark_result(&mut self, seq: u64, result: RemoteResult<RecognitionOutcome>) {
        self.session.end_call();
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, kind = ?e.kind, seq, "recognition failed");
                emit(&self.events, SessionEvent::ServiceError(e.error));
                return;
            }
        };

        let announcement = self.cache.merge(outcome, Utc::now());
        match &announcement {
            Announcement::JustMarked(p) => {
                tracing::info!(user_id = p.id, name = %p.name, seq, "attendance marked")
            }
            Announcement::AlreadyMarked(p) => {
                tracing::debug!(user_id = p.id, seq, "already marked today")
            }
            Announcement::NotRecognized => tracing::debug!(seq, "face not recognized"),
        }
        emit(&self.events, announcement.into());
    }

    fn teardown(&mut self) -> Vec<PersonEntry> {
        self.session.close();
        self.grabbing = None;
        self.detecting = None;
        self.marking = None;
        let entries = self.cache.entries();
        self.cache.clear();
        tracing::info!(
            session = %self.session.id(),
            people = entries.len(),
            delivered = self.sampler.delivered(),
            skipped = self.sampler.skipped(),
            "attendance polling stopped"
        );
        entries
    }
}
