//! The `update`/`First`/`Next` data model.
//!
//! `Model`, `Event`, and `Effect` are opaque user types; the core only ever
//! moves them around, clones the ones it needs to broadcast, and never
//! inspects their contents. `First` and `Next` are the two shapes an
//! `update`/`initiator` call can hand back to the loop.

use smallvec::SmallVec;

/// Most `update` calls emit zero, one, or two effects; inlining up to two
/// avoids a heap allocation on the hot path while still accepting arbitrarily
/// many.
pub type Effects<F> = SmallVec<[F; 2]>;

/// The result of applying `update` once: an optional successor model plus a
/// (possibly empty, possibly duplicate-containing — duplicates are forwarded
/// as-is, never deduplicated, per spec) list of effects.
#[derive(Debug, Clone)]
pub struct Next<M, F> {
    pub model: Option<M>,
    pub effects: Effects<F>,
}

impl<M, F> Next<M, F> {
    /// A `Next` that changes the model and emits no effects.
    pub fn next(model: M) -> Self {
        Self {
            model: Some(model),
            effects: Effects::new(),
        }
    }

    /// A `Next` that emits effects without changing the model.
    pub fn dispatch(effects: impl IntoIterator<Item = F>) -> Self {
        Self {
            model: None,
            effects: effects.into_iter().collect(),
        }
    }

    /// A `Next` that both replaces the model and emits effects.
    pub fn next_with_effects(model: M, effects: impl IntoIterator<Item = F>) -> Self {
        Self {
            model: Some(model),
            effects: effects.into_iter().collect(),
        }
    }

    /// A `Next` that changes nothing: no model replacement, no effects.
    pub fn noop() -> Self {
        Self {
            model: None,
            effects: Effects::new(),
        }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }
}

/// The initial `Next` produced by the `initiator` when a loop starts: always
/// carries a model (there is no "unchanged" case at startup).
#[derive(Debug, Clone)]
pub struct First<M, F> {
    pub model: M,
    pub effects: Effects<F>,
}

impl<M, F> First<M, F> {
    pub fn first(model: M) -> Self {
        Self {
            model,
            effects: Effects::new(),
        }
    }

    pub fn first_with_effects(model: M, effects: impl IntoIterator<Item = F>) -> Self {
        Self {
            model,
            effects: effects.into_iter().collect(),
        }
    }
}

/// `update(&model, &event) -> Next<model, effects>`. Must be pure: no I/O, no
/// shared mutable state beyond what the loop itself threads through. Takes
/// the event by reference (rather than consuming it) so the loop can log or
/// otherwise observe the event around the call without requiring `E: Clone`.
pub type Update<M, E, F> = dyn Fn(&M, &E) -> Next<M, F> + Send + Sync;

/// `initiator(model) -> First<model, effects>`, run once at loop start. The
/// identity initiator (`First::first`) is the default when the loop is
/// started from a concrete model with no startup effects.
pub type Initiator<M, F> = dyn Fn(M) -> First<M, F> + Send + Sync;
