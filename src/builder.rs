//! `LoopBuilder<M, E, F>` — fluent configuration, consumed by [`MobiusController`](crate::controller::MobiusController).
//!
//! spec.md §1 treats the builder/configuration API as an external
//! collaborator: the core only needs *something* for
//! [`MobiusController`](crate::controller::MobiusController) to hold as its
//! `StoppedState` and rebuild a loop from on every `start()`. This mirrors
//! the teacher's `RuntimeBuilder` (`runtime.rs`) — a consuming-`self`
//! fluent builder ending in a terminal `build`-style call — but stops at
//! exactly the five options spec.md §6 enumerates: `with_init`,
//! `with_event_source`, `with_event_queue`, `with_effect_queue`, `with_logger`.

use std::sync::Arc;

use crate::connection::Connectable;
use crate::logger::Logger;
use crate::mobius_loop::{EventQueueKind, EventSource, MobiusLoop};
use crate::model::{First, Update};
use crate::router::EffectQueueKind;

/// `initiator(model) -> First<model, effects>`. Defaults to
/// [`First::first`] (no startup effects) when unset.
pub type InitiatorFn<M, F> = Arc<dyn Fn(M) -> First<M, F> + Send + Sync>;

/// Assembles a [`MobiusLoop`] from an `update` function, an effect-handler
/// factory, and the options spec.md §6 names. Consumed (not cloned) by
/// [`MobiusController::start`](crate::controller::MobiusController::start):
/// a controller keeps one `LoopBuilder` per configuration and asks it to
/// build a fresh loop every time it transitions to running.
pub struct LoopBuilder<M, E, F> {
    update: Arc<Update<M, E, F>>,
    effect_handler_factory: Arc<dyn Fn() -> Arc<dyn Connectable<F, E>> + Send + Sync>,
    initiator: Option<InitiatorFn<M, F>>,
    event_source_factory: Option<Arc<dyn Fn() -> Arc<EventSource<M, E>> + Send + Sync>>,
    event_queue: EventQueueKind,
    effect_queue: EffectQueueKind,
    logger: Arc<dyn Logger<M, E, F>>,
}

impl<M, E, F> LoopBuilder<M, E, F>
where
    M: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
    F: Send + Sync + 'static,
{
    /// `update` is the pure transition function; `effect_handler_factory`
    /// produces a fresh, never-yet-connected effect `Connectable` each time
    /// the builder is asked to build a loop (see
    /// [`EffectRouter::into_factory`](crate::router::EffectRouter::into_factory)).
    pub fn new(
        update: Arc<Update<M, E, F>>,
        effect_handler_factory: Arc<dyn Fn() -> Arc<dyn Connectable<F, E>> + Send + Sync>,
    ) -> Self {
        Self {
            update,
            effect_handler_factory,
            initiator: None,
            event_source_factory: None,
            event_queue: EventQueueKind::default(),
            effect_queue: EffectQueueKind::default(),
            logger: Arc::new(()),
        }
    }

    /// Set the `initiator` run once at loop start. Unset defaults to
    /// [`First::first`] (the starting model, no startup effects).
    pub fn with_init(mut self, initiator: impl Fn(M) -> First<M, F> + Send + Sync + 'static) -> Self {
        self.initiator = Some(Arc::new(initiator));
        self
    }

    /// Register a factory producing a fresh, model-aware event source each
    /// time the builder builds a loop. Unset means no event source (the
    /// null source).
    pub fn with_event_source(
        mut self,
        factory: impl Fn() -> Arc<EventSource<M, E>> + Send + Sync + 'static,
    ) -> Self {
        self.event_source_factory = Some(Arc::new(factory));
        self
    }

    /// Select how the built loop's `dispatch_event` hands events to its
    /// event processor. Unset defaults to [`EventQueueKind::Inline`].
    pub fn with_event_queue(mut self, kind: EventQueueKind) -> Self {
        self.event_queue = kind;
        self
    }

    /// Select how the built loop's composed effect router schedules matched
    /// handler calls. Unset defaults to `EffectQueueKind::Concurrent(None)`.
    pub fn with_effect_queue(mut self, kind: EffectQueueKind) -> Self {
        self.effect_queue = kind;
        self
    }

    /// Install a [`Logger`]. Unset defaults to the no-op `()` logger.
    pub fn with_logger(mut self, logger: impl Logger<M, E, F> + 'static) -> Self {
        self.logger = Arc::new(logger);
        self
    }

    /// Build a fresh [`MobiusLoop`] starting from `initial_model`, applying
    /// the configured `initiator` (or [`First::first`] if none was set).
    pub fn build(&self, initial_model: M) -> MobiusLoop<M, E, F> {
        let first = match &self.initiator {
            Some(initiator) => initiator(initial_model),
            None => First::first(initial_model),
        };
        let effect_handler = (self.effect_handler_factory)();
        let event_source = self.event_source_factory.as_ref().map(|f| f());

        MobiusLoop::with_event_queue(
            self.update.clone(),
            first,
            effect_handler.as_ref(),
            event_source.as_deref(),
            self.logger.clone(),
            self.event_queue.clone(),
        )
    }
}
