//! Fixed-cadence frame sampler with back-pressure.
//!
//! Grabbing a still blocks on the device, so each grab runs on tokio's
//! blocking pool and comes back to the session task as a parked future.

use crate::source::{FrameSource, SourceError};
use rollcall_core::{CaptureSession, Snapshot};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Outcome of one blocking grab.
pub type Grabbed = Result<Option<Snapshot>, SourceError>;

/// A grab running off the session task.
pub type Grab = Pin<Box<dyn Future<Output = Grabbed> + Send>>;

pub struct FrameSampler<S> {
    source: Arc<Mutex<S>>,
    ticker: Interval,
    cadence: Duration,
    skipped: u64,
    delivered: u64,
}

impl<S: FrameSource + 'static> FrameSampler<S> {
    /// The first tick fires one full `cadence` from now.
    pub fn new(source: S, cadence: Duration) -> Self {
        Self {
            source: Arc::new(Mutex::new(source)),
            ticker: ticker(cadence),
            cadence,
            skipped: 0,
            delivered: 0,
        }
    }

    /// Re-arm the ticker for a new session.
    pub fn restart(&mut self) {
        self.ticker = ticker(self.cadence);
    }

    pub async fn tick(&mut self) {
        self.ticker.tick().await;
    }

    /// Start a grab for this tick, claiming the session's in-flight slot.
    ///
    /// Returns `None` when the session is closed or when the previous snapshot
    /// is still being processed; that tick is dropped, not queued. The grab
    /// must be handed back through [`FrameSampler::accept`]. Must be called
    /// inside a tokio runtime.
    pub fn sample(&mut self, session: &mut CaptureSession) -> Option<Grab> {
        if !session.is_active() {
            return None;
        }
        if !session.try_begin_call() {
            self.skipped += 1;
            tracing::debug!(
                mode = ?session.mode(),
                skipped = self.skipped,
                "previous frame still in flight, skipping tick"
            );
            return None;
        }
        let source = Arc::clone(&self.source);
        let task = tokio::task::spawn_blocking(move || {
            let mut source = source
                .lock()
                .map_err(|_| SourceError::from("frame source lock poisoned"))?;
            source.snapshot()
        });
        Some(Box::pin(async move {
            match task.await {
                Ok(grabbed) => grabbed,
                Err(e) => Err(Box::new(e) as SourceError),
            }
        }))
    }

    /// Unpack a finished grab.
    ///
    /// When the source had no frame or failed, the session's in-flight slot is
    /// released here. Otherwise the caller must `end_call` once the snapshot's
    /// downstream work is done.
    pub fn accept(&mut self, session: &mut CaptureSession, grabbed: Grabbed) -> Option<Snapshot> {
        match grabbed {
            Ok(Some(snapshot)) => {
                self.delivered += 1;
                tracing::trace!(seq = snapshot.sequence, "frame sampled");
                Some(snapshot)
            }
            Ok(None) => {
                session.end_call();
                None
            }
            Err(e) => {
                session.end_call();
                tracing::warn!(error = %e, "frame source failed, skipping tick");
                None
            }
        }
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

fn ticker(cadence: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + cadence, cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
