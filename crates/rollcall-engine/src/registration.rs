//! Registration screen driver.
//!
//! One tokio task per screen owns the [`RegistrationMachine`], the sampler
//! and the overlay. A single `select!` loop multiplexes commands, sampler
//! ticks, the pending frame grab, the in-flight detect call, the settle timer
//! and the enrollment call.

use crate::config::Config;
use crate::display::OverlayDisplay;
use crate::error::EngineError;
use crate::events::{emit, EventSender, SessionEvent};
use crate::inflight::{fire, settle, InFlight, ScheduledCapture};
use crate::remote::{CallFuture, FaceService, RecordsService, Registered, RemoteResult};
use crate::sampler::{FrameSampler, Grabbed};
use crate::source::FrameSource;
use rollcall_core::{
    DetectionResult, DetectionStep, RegistrationDraft, RegistrationMachine, RegistrationState,
    Snapshot, TransitionError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

enum RegistrationRequest {
    Start {
        draft: RegistrationDraft,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    Cancel {
        reply: oneshot::Sender<bool>,
    },
    State {
        reply: oneshot::Sender<(RegistrationState, RegistrationDraft)>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Clone-safe handle to a registration screen.
#[derive(Clone)]
pub struct RegistrationHandle {
    tx: mpsc::Sender<RegistrationRequest>,
}

impl RegistrationHandle {
    /// Validate `draft` and start sampling. Only accepted while idle.
    pub async fn start(&self, draft: RegistrationDraft) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistrationRequest::Start { draft, reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Stop capturing and drop any scheduled capture. Returns false if there
    /// was nothing to cancel or the submission is already underway.
    pub async fn cancel(&self) -> Result<bool, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistrationRequest::Cancel { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Current state and the draft the screen is holding.
    pub async fn state(&self) -> Result<(RegistrationState, RegistrationDraft), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistrationRequest::State { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Close the screen. Resolves once the session is torn down.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(RegistrationRequest::Shutdown { reply }).await?;
        rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    async fn send(&self, request: RegistrationRequest) -> Result<(), EngineError> {
        self.tx.send(request).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Open a registration screen on `source`.
///
/// Must be called inside a tokio runtime. The screen starts `Idle`; nothing
/// is sampled until [`RegistrationHandle::start`] succeeds.
pub fn spawn_registration<S>(
    source: S,
    face: Arc<dyn FaceService>,
    records: Arc<dyn RecordsService>,
    config: &Config,
    events: EventSender,
) -> RegistrationHandle
where
    S: FrameSource + 'static,
{
    let (tx, rx) = mpsc::channel(8);
    let screen = RegistrationScreen {
        machine: RegistrationMachine::new(config.registration_interval()),
        sampler: FrameSampler::new(source, config.registration_interval()),
        face,
        records,
        overlay: OverlayDisplay::new(config.backing_size(), config.overlay_path.clone()),
        settle_delay: config.settle_delay(),
        events,
        grabbing: None,
        detecting: None,
        scheduled: None,
        submitting: None,
    };
    tokio::spawn(screen.run(rx));
    RegistrationHandle { tx }
}

struct RegistrationScreen<S> {
    machine: RegistrationMachine,
    sampler: FrameSampler<S>,
    face: Arc<dyn FaceService>,
    records: Arc<dyn RecordsService>,
    overlay: OverlayDisplay,
    settle_delay: Duration,
    events: EventSender,
    grabbing: Option<InFlight<Grabbed, Uuid>>,
    detecting: Option<InFlight<RemoteResult<DetectionResult>, (Uuid, Snapshot)>>,
    scheduled: Option<ScheduledCapture>,
    submitting: Option<InFlight<RemoteResult<Registered>, Uuid>>,
}

impl<S: FrameSource + 'static> RegistrationScreen<S> {
    async fn run(mut self, mut requests: mpsc::Receiver<RegistrationRequest>) {
        tracing::debug!("registration screen open");
        let mut closed = None;
        while closed.is_none() {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(RegistrationRequest::Shutdown { reply }) => closed = Some(Some(reply)),
                    Some(request) => self.handle(request),
                    None => closed = Some(None),
                },
                _ = self.sampler.tick(), if self.machine.wants_frames() => self.on_tick(),
                (grabbed, session) = settle(&mut self.grabbing) => self.on_grab(session, grabbed),
                (result, (session, snapshot)) = settle(&mut self.detecting) => {
                    self.on_detect_result(session, snapshot, result)
                }
                (session, snapshot) = fire(&mut self.scheduled) => self.on_settle(session, snapshot),
                (result, session) = settle(&mut self.submitting) => self.on_submit_result(session, result),
            }
        }
        self.teardown();
        if let Some(Some(reply)) = closed {
            let _ = reply.send(());
        }
    }

    fn handle(&mut self, request: RegistrationRequest) {
        match request {
            RegistrationRequest::Start { draft, reply } => {
                let _ = reply.send(self.start(draft));
            }
            RegistrationRequest::Cancel { reply } => {
                let _ = reply.send(self.cancel());
            }
            RegistrationRequest::State { reply } => {
                let _ = reply.send((self.machine.state(), self.machine.draft().clone()));
            }
            RegistrationRequest::Shutdown { .. } => {}
        }
    }

    fn start(&mut self, draft: RegistrationDraft) -> Result<(), EngineError> {
        self.machine.set_draft(draft)?;
        if let Err(e) = self.machine.validate_fields() {
            if let TransitionError::Validation(v) = &e {
                tracing::info!(missing = ?v.missing, "registration fields incomplete");
                emit(&self.events, SessionEvent::ValidationFailed(v.clone()));
            }
            return Err(e.into());
        }
        self.emit_state();
        let session = self.machine.begin_sampling()?;
        self.sampler.restart();
        tracing::info!(session = %session, "registration capture started");
        emit(&self.events, SessionEvent::CaptureStarted);
        self.emit_state();
        Ok(())
    }

    fn cancel(&mut self) -> bool {
        let session = self.machine.session().map(|s| s.id());
        if !self.machine.cancel() {
            return false;
        }
        self.grabbing = None;
        self.detecting = None;
        self.scheduled = None;
        let cleared = self.overlay.clear();
        emit(&self.events, cleared);
        tracing::info!(session = ?session, "registration capture cancelled");
        emit(&self.events, SessionEvent::Cancelled);
        self.emit_state();
        true
    }

    fn on_tick(&mut self) {
        let Some(session) = self.machine.session_mut() else {
            return;
        };
        let id = session.id();
        if let Some(grab) = self.sampler.sample(session) {
            self.grabbing = Some(InFlight::new(grab, id));
        }
    }

    fn on_grab(&mut self, session_id: Uuid, grabbed: Grabbed) {
        let snapshot = match self.machine.session_mut() {
            Some(session) if session.is_current(session_id) => self.sampler.accept(session, grabbed),
            _ => {
                tracing::debug!(session = %session_id, "frame grabbed after teardown, dropped");
                return;
            }
        };
        let Some(snapshot) = snapshot else {
            return;
        };
        let face = Arc::clone(&self.face);
        let image = snapshot.clone();
        let call: CallFuture<DetectionResult> = Box::pin(async move { face.detect(&image).await });
        self.detecting = Some(InFlight::new(call, (session_id, snapshot)));
    }

    fn on_detect_result(
        &mut self,
        session_id: Uuid,
        snapshot: Snapshot,
        result: RemoteResult<DetectionResult>,
    ) {
        match self.machine.session_mut() {
            Some(session) if session.is_current(session_id) => session.end_call(),
            _ => {
                tracing::debug!(session = %session_id, "late detection for a closed session, dropped");
                return;
            }
        }

        let detection = match result {
            Ok(detection) => detection,
            Err(e) => {
                tracing::warn!(error = %e, kind = ?e.kind, "face detection failed");
                let cleared = self.overlay.clear();
                emit(&self.events, cleared);
                emit(&self.events, SessionEvent::ServiceError(e.error));
                return;
            }
        };

        let drawn = self.overlay.show(&detection, snapshot.native_size());
        emit(&self.events, drawn);

        match self.machine.on_detection(session_id, &snapshot, &detection) {
            DetectionStep::NoFace => emit(&self.events, SessionEvent::NoFace),
            DetectionStep::ScheduleCapture { session, snapshot } => {
                tracing::info!(
                    session = %session,
                    seq = snapshot.sequence,
                    delay_ms = self.settle_delay.as_millis() as u64,
                    "face detected, capture scheduled"
                );
                emit(&self.events, SessionEvent::FaceDetected);
                self.emit_state();
                self.scheduled = Some(ScheduledCapture::new(session, snapshot, self.settle_delay));
            }
            DetectionStep::Ignored => {}
        }
    }

    fn on_settle(&mut self, session_id: Uuid, snapshot: Snapshot) {
        if !self.machine.capture(session_id, snapshot) {
            tracing::debug!(session = %session_id, "scheduled capture fired after teardown, ignored");
            return;
        }
        self.emit_state();

        let draft = match self.machine.submit() {
            Ok(draft) => draft,
            Err(e) => {
                tracing::warn!(error = %e, "submission refused");
                return;
            }
        };
        let Some(image) = draft.captured_image.clone() else {
            return;
        };
        tracing::info!(session = %session_id, seq = image.sequence, "submitting registration");
        emit(&self.events, SessionEvent::Registering);
        self.emit_state();

        let records = Arc::clone(&self.records);
        let call: CallFuture<Registered> =
            Box::pin(async move { records.register(&draft, &image).await });
        self.submitting = Some(InFlight::new(call, session_id));
    }

    fn on_submit_result(&mut self, session_id: Uuid, result: RemoteResult<Registered>) {
        match result {
            Ok(registered) => {
                tracing::info!(
                    session = %session_id,
                    user_id = ?registered.user_id,
                    "registration accepted"
                );
                self.machine.complete();
                let cleared = self.overlay.clear();
                emit(&self.events, cleared);
                emit(
                    &self.events,
                    SessionEvent::Registered {
                        message: registered.message,
                    },
                );
            }
            Err(e) => {
                tracing::warn!(session = %session_id, error = %e, kind = ?e.kind, "registration rejected");
                self.machine.fail();
                let cleared = self.overlay.clear();
                emit(&self.events, cleared);
                emit(&self.events, SessionEvent::RegistrationFailed { error: e.error });
            }
        }
        self.emit_state();
    }

    fn emit_state(&self) {
        emit(&self.events, SessionEvent::StateChanged(self.machine.state()));
    }

    fn teardown(&mut self) {
        self.machine.cancel();
        self.grabbing = None;
        self.detecting = None;
        self.scheduled = None;
        self.submitting = None;
        tracing::debug!(skipped = self.sampler.skipped(), "registration screen closed");
    }
}
