//! Structured error kinds and the process-wide error hook.
//!
//! None of the invariant violations the core can observe — dispatch after
//! dispose, starting an already-running controller, a router with zero or
//! multiple matching routes — are recovered locally. Each is turned into a
//! [`SeesawError`] and handed to the installed [error hook](report). The
//! hook's behaviour decides what happens next: the production default logs
//! via `tracing::error!` and panics; the `testing` feature installs a
//! recording hook instead so assertions can inspect what was reported.
//!
//! The core never threads these errors back across its public API as
//! `Result`s — per spec, misuse becomes a no-op plus a diagnostic, not a
//! propagated error value.

use std::cell::RefCell;
use std::sync::{Arc, OnceLock, RwLock};

use thiserror::Error;

/// Error kinds the core can detect and report via [`report`]. Each variant
/// corresponds to one of the categories spec.md §7 enumerates.
#[derive(Debug, Error, Clone)]
pub enum SeesawError {
    /// `Connection::accept` called after `dispose`.
    #[error("accept() called on a disposed connection")]
    AcceptAfterDispose,

    /// A second concurrent `connect` was attempted on a single-consumer
    /// `Connectable`.
    #[error("connect() called while a consumer is already connected")]
    SingleConsumerViolation,

    /// An effect matched zero or more than one route in a composed
    /// `EffectRouter`.
    #[error("effect matched {matches} routes, expected exactly 1: {effect_debug}")]
    RoutingAmbiguity {
        matches: usize,
        effect_debug: String,
    },

    /// `EventProcessor::start` called twice.
    #[error("EventProcessor::start called while already started")]
    DoubleStart,

    /// `MobiusController::start` called while already running.
    #[error("controller.start() called while already running")]
    StartWhileRunning,

    /// `MobiusController::stop` called while already stopped.
    #[error("controller.stop() called while already stopped")]
    StopWhileStopped,

    /// `MobiusController::replace_model` called while running.
    #[error("controller.replace_model() called while running")]
    ReplaceModelWhileRunning,

    /// An `AsyncStartStopStateMachine` mutator ran in the wrong `RawState`.
    #[error("state machine mutator `{operation}` invoked from raw state {from:?}")]
    WrongState {
        operation: &'static str,
        from: &'static str,
    },

    /// An observer/effect dispatch was attempted after the owning loop was
    /// disposed.
    #[error("dispatch attempted after loop disposal")]
    DispatchAfterDispose,

    /// An internal invariant was violated — both state slots were absent
    /// (or both present) when exactly one was required.
    #[error("internal invariant breached: {0}")]
    InternalInvariant(String),
}

/// Process-wide injection point for [`SeesawError`]s. Hosts install their
/// own via [`set_error_hook`]; the default terminates the process, matching
/// the teacher's "fail loud" posture for programmer errors (see
/// `examples/fourthplaces-mntogether/.../error.rs`).
pub type ErrorHook = Arc<dyn Fn(&SeesawError) + Send + Sync>;

fn global_hook() -> &'static RwLock<ErrorHook> {
    static HOOK: OnceLock<RwLock<ErrorHook>> = OnceLock::new();
    HOOK.get_or_init(|| RwLock::new(Arc::new(default_hook)))
}

fn default_hook(err: &SeesawError) {
    tracing::error!(error = %err, "seesaw invariant violated");
    panic!("seesaw: {err}");
}

thread_local! {
    /// A per-thread override, used by the `testing` feature so concurrently
    /// running tests don't stomp on each other's process-wide hook. Only
    /// consulted when set; otherwise falls through to the global hook.
    static LOCAL_HOOK: RefCell<Option<ErrorHook>> = const { RefCell::new(None) };
}

/// Install a new process-wide error hook, returning the previous one.
pub fn set_error_hook(hook: ErrorHook) -> ErrorHook {
    let mut guard = global_hook().write().expect("error hook lock poisoned");
    std::mem::replace(&mut *guard, hook)
}

/// Report a violation to the currently installed hook (thread-local
/// override first, process-wide hook otherwise).
pub fn report(err: SeesawError) {
    let handled_locally = LOCAL_HOOK.with(|cell| {
        if let Some(hook) = cell.borrow().as_ref() {
            hook(&err);
            true
        } else {
            false
        }
    });
    if !handled_locally {
        let guard = global_hook().read().expect("error hook lock poisoned");
        guard(&err);
    }
}

/// Test doubles for the error hook. Only compiled with the `testing`
/// feature or under `cfg(test)`.
#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// A recording error hook: counts reports and keeps the most recent
    /// messages instead of panicking. Installed for the current thread only
    /// (see [`install_test_error_hook`]) so parallel tests stay isolated.
    pub struct RecordingErrorHook {
        count: Arc<AtomicUsize>,
        messages: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingErrorHook {
        pub fn count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }

        pub fn messages(&self) -> Vec<String> {
            self.messages.lock().expect("poisoned").clone()
        }

        pub fn last(&self) -> Option<String> {
            self.messages.lock().expect("poisoned").last().cloned()
        }
    }

    /// Install a recording hook for the current thread's lifetime of calls
    /// to [`report`]. Returns a handle for asserting on what was reported.
    ///
    /// Only covers `report()` calls made from the same OS thread — spawn a
    /// single-threaded `#[tokio::test]` runtime (the default) if the code
    /// under test dispatches through `tokio::spawn`.
    pub fn install_test_error_hook() -> RecordingErrorHook {
        let count = Arc::new(AtomicUsize::new(0));
        let messages = Arc::new(Mutex::new(Vec::new()));
        let c = count.clone();
        let m = messages.clone();
        LOCAL_HOOK.with(|cell| {
            *cell.borrow_mut() = Some(Arc::new(move |err: &SeesawError| {
                c.fetch_add(1, Ordering::SeqCst);
                m.lock().expect("poisoned").push(err.to_string());
            }));
        });
        RecordingErrorHook { count, messages }
    }

    /// Clear any thread-local override installed by [`install_test_error_hook`].
    pub fn clear_test_error_hook() {
        LOCAL_HOOK.with(|cell| *cell.borrow_mut() = None);
    }
}
