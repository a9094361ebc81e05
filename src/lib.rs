//! # seesaw
//!
//! A deterministic, unidirectional state-update loop: a pure `update`
//! function folds events into a model and a list of effects; a composed
//! effect router dispatches each effect to exactly one handler; handlers
//! feed events back in. The whole thing is driven by explicit `start`/`stop`
//! lifecycle control rather than being implicitly "always on".
//!
//! ## Core pieces
//!
//! - [`model`] — `Next`/`First`, the two shapes `update`/`initiator` hand back.
//! - [`connection`] — `Connection`/`Connectable`/`Disposable`, the at-most-once
//!   dispose contract every producer/consumer pairing in this crate is built on.
//! - [`publisher`] — `ConnectablePublisher<T>`, a synchronous multi-subscriber
//!   broadcaster used to fan model snapshots out to observers.
//! - [`event_processor`] — `EventProcessor`, serialising `update` calls behind
//!   one lock and queueing events that arrive before `start()`.
//! - [`effect`] — `EffectHandler`, the user-supplied async side of effect
//!   routing, plus the `SafeDispatch` guard handlers call back through.
//! - [`router`] — `EffectRouter`, composing handlers into the single
//!   exactly-one-match `Connectable<Effect, Event>` a loop wires in.
//! - [`state_machine`] — `AsyncStartStopStateMachine`, the generic
//!   stopped/running machine [`controller`] builds on.
//! - [`mobius_loop`] — `MobiusLoop`, wiring an event processor, effect router,
//!   optional event source, and model publisher into one running loop.
//! - [`builder`] — `LoopBuilder`, the fluent configuration a controller holds
//!   and rebuilds a loop from on every `start()`.
//! - [`controller`] — `MobiusController`, the public start/stop/replace-model/
//!   connect-view lifecycle API.
//! - [`logger`] — `Logger`, optional instrumentation hooks around initiation
//!   and update.
//! - [`error`] — `SeesawError` and the process-wide error hook every
//!   programmer-error path reports through instead of panicking inline.
//!
//! Misuse (double start, dispatch after dispose, routing ambiguity, ...) is
//! never threaded back through the public API as a `Result`: it is turned
//! into a [`error::SeesawError`] and handed to the installed
//! [error hook](error::report), matching the production default of logging
//! and then terminating the process. Tests install a recording hook via the
//! `testing` feature (or plain `cfg(test)`) to assert on what was reported
//! instead.
//!
//! A model observer or event source must never call back into its own
//! loop's `dispatch_event`/`latest_model` synchronously — see the note on
//! [`event_processor::EventProcessor`].

pub mod builder;
pub mod connection;
pub mod controller;
pub mod effect;
pub mod error;
pub mod event_processor;
pub mod logger;
pub mod mobius_loop;
pub mod model;
pub mod publisher;
pub mod router;
pub mod state_machine;
pub mod sync;

#[cfg(any(test, feature = "testing"))]
pub mod testing;


pub use builder::{InitiatorFn, LoopBuilder};
pub use connection::{broken_connection, Connectable, Connection, Disposable};
pub use controller::MobiusController;
pub use effect::{DispatchFn, EffectHandler, SafeDispatch};
pub use error::{report, set_error_hook, ErrorHook, SeesawError};
pub use event_processor::EventProcessor;
pub use logger::{Logger, TracingLogger};
pub use mobius_loop::{EventQueueKind, EventSource, MobiusLoop};
pub use model::{Effects, First, Initiator, Next, Update};
pub use publisher::ConnectablePublisher;
pub use router::{EffectQueueKind, EffectRouter};
pub use state_machine::{AsyncStartStopStateMachine, Transition};
