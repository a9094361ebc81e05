//! Test doubles and recording hooks, gated behind the `testing` feature —
//! mirrors the teacher's `seesaw::testing` module, scoped to this crate's
//! own surface (effect handlers, event sources, the error hook) instead of
//! the teacher's command/event/job doubles.
//!
//! Available both to this crate's own test suite (`cfg(test)` always pulls
//! it in) and to downstream crates building loops on top of this one via
//! `features = ["testing"]`.

pub use crate::error::testing::{
    clear_test_error_hook, install_test_error_hook, RecordingErrorHook,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::connection::{Connectable, Connection};
use crate::effect::{DispatchFn, EffectHandler};

/// An effect handler that records every payload it receives, in the order
/// received, and optionally dispatches one fixed follow-up event per
/// payload. Used for asserting "this effect fired" without standing up a
/// real handler.
pub struct RecordingEffectHandler<P, E> {
    received: Arc<Mutex<Vec<P>>>,
    emit: Option<E>,
    disposed: Arc<AtomicBool>,
}

impl<P, E> RecordingEffectHandler<P, E>
where
    E: Clone,
{
    /// A handler that records payloads and dispatches nothing.
    pub fn new() -> (Self, Arc<Mutex<Vec<P>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                received: received.clone(),
                emit: None,
                disposed: Arc::new(AtomicBool::new(false)),
            },
            received,
        )
    }

    /// A handler that records payloads and dispatches `emit` once per
    /// payload handled — the "effect leads to an event" shape.
    pub fn with_follow_up(emit: E) -> (Self, Arc<Mutex<Vec<P>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                received: received.clone(),
                emit: Some(emit),
                disposed: Arc::new(AtomicBool::new(false)),
            },
            received,
        )
    }

    /// Whether this handler's `dispose` has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl<P, E> EffectHandler<P, E> for RecordingEffectHandler<P, E>
where
    P: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    async fn handle(&self, payload: P, dispatch: DispatchFn<E>) {
        self.received.lock().expect("poisoned").push(payload);
        if let Some(event) = &self.emit {
            dispatch(event.clone());
        }
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }
}

/// An event source that emits a fixed sequence of events synchronously
/// during `connect`, then never emits again. Models `S2`'s "early event"
/// scenario: a source whose `connect` callback fires before the loop has
/// finished starting.
pub struct ImmediateEventSource<E> {
    events: Vec<E>,
}

impl<E> ImmediateEventSource<E> {
    pub fn new(events: impl IntoIterator<Item = E>) -> Self {
        Self {
            events: events.into_iter().collect(),
        }
    }
}

impl<M, E> Connectable<M, E> for ImmediateEventSource<E>
where
    M: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn connect(&self, sink: Arc<dyn Fn(E) + Send + Sync>) -> Connection<M> {
        for event in &self.events {
            sink(event.clone());
        }
        Connection::new(|_: M| {}, || {})
    }
}
