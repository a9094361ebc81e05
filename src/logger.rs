//! `Logger` — the loop's observation hooks, spec.md §6.
//!
//! All four callbacks are no-ops by default. [`TracingLogger`] forwards them
//! to `tracing` spans at the verbosity the teacher crate uses for its own
//! lifecycle logging (`trace!` for per-event routing-level detail,
//! `debug!` for loop start/stop).

use std::fmt::Debug;

/// Observation hooks for a loop's lifecycle. The default no-op
/// implementation is `()`.
pub trait Logger<M, E, F>: Send + Sync {
    fn will_initiate(&self, _model: &M) {}
    fn did_initiate(&self, _model: &M, _effects: &[F]) {}
    fn will_update(&self, _model: &M, _event: &E) {}
    fn did_update(&self, _model: &M, _event: &E, _next_model: Option<&M>, _effects: &[F]) {}
}

impl<M, E, F> Logger<M, E, F> for () {}

/// Forwards every hook to `tracing`. `M`/`E` only need `Debug` since the
/// logger is purely an observation seam — it must never influence control
/// flow.
pub struct TracingLogger;

impl<M, E, F> Logger<M, E, F> for TracingLogger
where
    M: Debug,
    E: Debug,
{
    fn will_initiate(&self, model: &M) {
        tracing::debug!(?model, "loop initiating");
    }

    fn did_initiate(&self, model: &M, effects: &[F]) {
        tracing::debug!(?model, effect_count = effects.len(), "loop initiated");
    }

    fn will_update(&self, model: &M, event: &E) {
        tracing::trace!(?model, ?event, "update starting");
    }

    fn did_update(&self, _model: &M, event: &E, next_model: Option<&M>, effects: &[F]) {
        tracing::trace!(
            ?event,
            model_changed = next_model.is_some(),
            effect_count = effects.len(),
            "update finished"
        );
    }
}
