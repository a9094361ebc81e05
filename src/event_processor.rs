//! `EventProcessor<M, E, F>` — serialises model mutation and publishes
//! results.
//!
//! Every public operation is serialised through a single [`Lock`]: `update`
//! is a synchronous, pure function, so "acquire the designated event queue"
//! (spec.md §5) and "run `update` while holding it" collapse into one
//! critical section. Events `accept`ed before `start` queue up in FIFO order
//! and are drained — in order — the moment `start` installs the first model.
//!
//! There is exactly one consumer of the `Next` values this processor
//! produces: the owning [`MobiusLoop`](crate::mobius_loop::MobiusLoop), wired
//! in at construction time. That collapses spec.md §4.4's "internal
//! publisher" down to a single bound callback here — the genuinely
//! multi-subscriber fan-out spec.md §4.3 describes is reserved for the
//! model-observer broadcast the loop itself exposes (see
//! [`ConnectablePublisher`](crate::publisher::ConnectablePublisher)).
//!
//! `on_next` runs synchronously, still inside the serialising lock (see
//! [`apply`](EventProcessor::apply)). A callback reached from `on_next` —
//! a model observer, or a model-aware event source — must not call back
//! into this processor (`accept`, or a loop's `dispatch_event` under
//! [`EventQueueKind::Inline`](crate::mobius_loop::EventQueueKind::Inline))
//! on the same thread: the lock isn't reentrant, so that deadlocks instead
//! of erroring. Feed events back from such a callback through
//! [`EventQueueKind::Dedicated`](crate::mobius_loop::EventQueueKind::Dedicated)
//! (hands off to a background task) or `tokio::spawn` rather than calling
//! straight back in.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{report, SeesawError};
use crate::model::{First, Next, Update};
use crate::sync::Lock;

struct Inner<M, E> {
    current_model: Option<M>,
    pending: VecDeque<E>,
    started: bool,
    disposed: bool,
}

pub struct EventProcessor<M, E, F> {
    update: Arc<Update<M, E, F>>,
    on_next: Arc<dyn Fn(Next<M, F>) + Send + Sync>,
    inner: Lock<Inner<M, E>>,
}

impl<M: Clone, E, F> EventProcessor<M, E, F> {
    /// `on_next` is invoked, still inside the serialising lock, for every
    /// `Next` this processor produces — including the synthetic `Next`
    /// derived from `start`'s `First`.
    pub fn new(
        update: Arc<Update<M, E, F>>,
        on_next: Arc<dyn Fn(Next<M, F>) + Send + Sync>,
    ) -> Self {
        Self {
            update,
            on_next,
            inner: Lock::new(Inner {
                current_model: None,
                pending: VecDeque::new(),
                started: false,
                disposed: false,
            }),
        }
    }

    /// Install the initial model and effects, then drain any events queued
    /// via [`accept`](Self::accept) before `start` was called, in FIFO
    /// order. Calling `start` twice is reported via the error hook and
    /// otherwise ignored.
    pub fn start(&self, first: First<M, F>) {
        self.inner.with(|inner| {
            if inner.disposed {
                return;
            }
            if inner.started {
                report(SeesawError::DoubleStart);
                return;
            }
            inner.started = true;
            inner.current_model = Some(first.model.clone());
            (self.on_next)(Next {
                model: Some(first.model),
                effects: first.effects,
            });

            while let Some(event) = inner.pending.pop_front() {
                self.apply(inner, event);
            }
        });
    }

    /// Before `start`: queue the event (bounded only by memory). After
    /// `start`: run `update` exactly once and publish the resulting `Next`,
    /// replacing the current model iff `Next.model` is present. A no-op
    /// after [`dispose`](Self::dispose).
    pub fn accept(&self, event: E) {
        self.inner.with(|inner| {
            if inner.disposed {
                return;
            }
            if !inner.started {
                inner.pending.push_back(event);
                return;
            }
            self.apply(inner, event);
        });
    }

    /// Runs while `inner` is already locked by the caller. Calls `on_next`
    /// before returning, so `on_next` (and anything it calls synchronously
    /// — observers, event sources) must not call back into `accept` or
    /// `read_current_model` on this thread; see the module-level doc.
    fn apply(&self, inner: &mut Inner<M, E>, event: E) {
        let current = inner
            .current_model
            .clone()
            .expect("apply called with no current model");
        let next = (self.update)(&current, &event);
        if let Some(ref model) = next.model {
            inner.current_model = Some(model.clone());
        }
        (self.on_next)(next);
    }

    /// Disposes; every subsequent `accept` is a silent no-op. Clears
    /// `current_model` so `read_current_model`/`subscribe_model` report
    /// `None` from this point on, matching "defined iff started and not
    /// disposed".
    pub fn dispose(&self) {
        self.inner.with(|inner| {
            inner.disposed = true;
            inner.pending.clear();
            inner.current_model = None;
        });
    }

    /// Snapshot of the current model, or `None` if `start` hasn't run yet
    /// (or the processor has been disposed).
    pub fn read_current_model(&self) -> Option<M> {
        self.inner.with(|inner| inner.current_model.clone())
    }

    /// Run `f` with the current model, while still holding the serialising
    /// lock. Used by `MobiusLoop::add_observer` to subscribe to the model
    /// publisher and deliver the current snapshot atomically with respect
    /// to any in-flight `accept`/`apply` — both paths take this same lock,
    /// so a subscriber can never race with (and miss, or double-see) a
    /// concurrently-publishing update.
    pub fn subscribe_model<T>(&self, f: impl FnOnce(Option<&M>) -> T) -> T {
        self.inner.with(|inner| f(inner.current_model.as_ref()))
    }
}
