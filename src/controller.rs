//! `MobiusController<M, E, F>` — the start/stop lifecycle manager, spec.md §4.8.
//!
//! Wraps an [`AsyncStartStopStateMachine`] around a [`LoopBuilder`]: while
//! stopped, the controller owns the builder, the pending initial model, and
//! the list of registered view connections (spec.md §3's "Ownership" row
//! for the controller). `start` asks the state machine to transition,
//! builds a fresh [`MobiusLoop`] from the builder, wires every registered
//! view as both an event source and a model observer, and installs the
//! result as the machine's `RunningState`. `stop` tears the loop (and its
//! view wiring) down and folds the latest model back into a fresh
//! `ControllerConfig`, so the next `start()` resumes from where the last one
//! left off.

use std::sync::Arc;

use crate::builder::LoopBuilder;
use crate::connection::{Connectable, Connection};
use crate::mobius_loop::{EventSource, MobiusLoop};
use crate::state_machine::{AsyncStartStopStateMachine, Transition};

/// The controller's `StoppedState`: the configuration needed to build a loop,
/// held while no loop is running.
struct ControllerConfig<M, E, F> {
    builder: Arc<LoopBuilder<M, E, F>>,
    initial_model: M,
    views: Vec<Arc<dyn Connectable<M, E>>>,
}

/// The controller's `RunningState`: the live loop plus the per-view
/// `Connection`s the controller itself owns (a view's `Connectable<M, E>` is
/// wired in twice — once as an event source, once as a model observer — and
/// both need disposing on `stop`).
struct RunningLoop<M, E, F> {
    builder: Arc<LoopBuilder<M, E, F>>,
    views: Vec<Arc<dyn Connectable<M, E>>>,
    loop_: Arc<MobiusLoop<M, E, F>>,
    view_connections: Vec<Arc<Connection<M>>>,
    observer_connections: Vec<Connection<()>>,
}

/// Lifecycle manager serialising `start`/`stop`/`replace_model`/`connect_view`
/// through an [`AsyncStartStopStateMachine`]. Preserves configuration and the
/// last-known model across stop/start cycles.
pub struct MobiusController<M, E, F> {
    state: AsyncStartStopStateMachine<ControllerConfig<M, E, F>, RunningLoop<M, E, F>>,
}

impl<M, E, F> MobiusController<M, E, F>
where
    M: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
    F: Send + Sync + 'static,
{
    pub fn new(builder: LoopBuilder<M, E, F>, initial_model: M) -> Self {
        Self {
            state: AsyncStartStopStateMachine::new(ControllerConfig {
                builder: Arc::new(builder),
                initial_model,
                views: Vec::new(),
            }),
        }
    }

    /// `true` for steady-state running and both transitional states; `false`
    /// only while fully stopped. See spec.md §4.7/§8 property 4.
    pub fn is_running(&self) -> bool {
        self.state.running()
    }

    /// Build the loop from the configured builder, wire every registered
    /// view in as an event source + model observer, and start it from
    /// `initial_model` (falling back to the configured/last-known model).
    /// Errors (via the error hook) if already running.
    pub fn start(&self, initial_model: Option<M>) {
        self.state.transition_to_running(|config| {
            let model = initial_model.unwrap_or_else(|| config.initial_model.clone());
            let lp = Arc::new(config.builder.build(model));

            let mut view_connections = Vec::with_capacity(config.views.len());
            let mut observer_connections = Vec::with_capacity(config.views.len());
            for view in &config.views {
                let lp_for_events = lp.clone();
                let view_connection = Arc::new(
                    view.connect(Arc::new(move |event: E| lp_for_events.dispatch_event(event))),
                );
                let accept = view_connection.clone().accept_fn();
                let observer_connection = lp.add_observer(Arc::new(move |model: M| accept(model)));
                view_connections.push(view_connection);
                observer_connections.push(observer_connection);
            }

            Transition::Success(RunningLoop {
                builder: config.builder,
                views: config.views,
                loop_: lp,
                view_connections,
                observer_connections,
            })
        });
    }

    /// Dispose the running loop and its view wiring, retaining the latest
    /// model as the configured initial model for the next `start`. Errors
    /// (via the error hook) if already stopped.
    pub fn stop(&self) {
        self.state.transition_to_stopped(|running| {
            let model = running
                .loop_
                .latest_model()
                .expect("a started loop always has a current model");
            running.loop_.dispose();
            for conn in running.view_connections {
                conn.dispose();
            }
            for conn in running.observer_connections {
                conn.dispose();
            }
            Transition::Success(ControllerConfig {
                builder: running.builder,
                initial_model: model,
                views: running.views,
            })
        });
    }

    /// Replace the configured initial model. Only valid while stopped;
    /// errors (via the error hook) while running.
    pub fn replace_model(&self, model: M) {
        self.state.mutate_if_stopped(|config| {
            config.initial_model = model;
        });
    }

    /// Read the configured initial model while stopped, or the live loop's
    /// latest model while running.
    pub fn model(&self) -> Option<M> {
        self.state
            .with_running(|running| running.loop_.latest_model())
            .flatten()
            .or_else(|| {
                self.state
                    .with_stopped(|config| config.initial_model.clone())
            })
    }

    /// Register a view to be wired as both an event source and a model
    /// observer on every future `start()`. Only valid while stopped; errors
    /// (via the error hook) while running.
    pub fn connect_view(&self, view: Arc<EventSource<M, E>>) {
        self.state.mutate_if_stopped(|config| {
            config.views.push(view);
        });
    }
}
