//! Pending work parked inside a session task and awaited from its select loop.
//!
//! Each slot is an `Option`. Awaiting an empty slot never completes, so a
//! `select!` branch on it simply stays quiet. Dropping the awaiting future
//! leaves the slot untouched; the value is only taken out once ready.

use rollcall_core::Snapshot;
use std::future::{pending, Future};
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, Sleep};
use uuid::Uuid;

/// Boxed work whose output a handler picks up later.
pub(crate) type Parked<O> = Pin<Box<dyn Future<Output = O> + Send>>;

/// A frame grab or remote call plus whatever the handler needs once it resolves.
pub(crate) struct InFlight<O, C> {
    call: Parked<O>,
    ctx: C,
}

impl<O, C> InFlight<O, C> {
    pub(crate) fn new(call: Parked<O>, ctx: C) -> Self {
        Self { call, ctx }
    }
}

pub(crate) async fn settle<O, C>(slot: &mut Option<InFlight<O, C>>) -> (O, C) {
    let result = match slot.as_mut() {
        Some(in_flight) => in_flight.call.as_mut().await,
        None => pending().await,
    };
    match slot.take() {
        Some(in_flight) => (result, in_flight.ctx),
        None => pending().await,
    }
}

/// The registration auto-capture, waiting out the settle delay.
pub(crate) struct ScheduledCapture {
    session: Uuid,
    snapshot: Snapshot,
    timer: Pin<Box<Sleep>>,
}

impl ScheduledCapture {
    pub(crate) fn new(session: Uuid, snapshot: Snapshot, delay: Duration) -> Self {
        Self {
            session,
            snapshot,
            timer: Box::pin(sleep(delay)),
        }
    }
}

pub(crate) async fn fire(slot: &mut Option<ScheduledCapture>) -> (Uuid, Snapshot) {
    match slot.as_mut() {
        Some(scheduled) => scheduled.timer.as_mut().await,
        None => pending().await,
    }
    match slot.take() {
        Some(scheduled) => (scheduled.session, scheduled.snapshot),
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::CallFuture;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_settle_takes_slot() {
        let call: CallFuture<u32> = Box::pin(async { Ok(7) });
        let mut slot = Some(InFlight::new(call, "ctx"));
        let (result, ctx) = settle(&mut slot).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(ctx, "ctx");
        assert!(slot.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_slot_never_resolves() {
        let mut slot: Option<InFlight<u32, ()>> = None;
        let idle = tokio::time::timeout(Duration::from_secs(60), settle(&mut slot)).await;
        assert!(idle.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_after_delay() {
        let snap = Snapshot { jpeg: vec![1], width: 4, height: 4, sequence: 3 };
        let id = Uuid::new_v4();
        let mut slot = Some(ScheduledCapture::new(id, snap.clone(), Duration::from_millis(1000)));
        let start = Instant::now();
        let (session, snapshot) = fire(&mut slot).await;
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
        assert_eq!((session, snapshot), (id, snap));
    }
}
