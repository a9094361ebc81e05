//! Disposable resources and the single-consumer `Connection` contract.
//!
//! A [`Connection`] is the live binding between a producer of inputs and a
//! single consumer of outputs: `accept` delivers a value in, `dispose`
//! releases the binding. Disposal is at-most-once — the second and every
//! subsequent call is a silent no-op, never a double-release.
//!
//! [`Connectable`] is the factory side: given an output sink it hands back a
//! `Connection`. Implementations that only support one live consumer at a
//! time must reject a second concurrent `connect` via the [error hook](crate::error)
//! rather than panicking, and return a [`broken_connection`] so callers never
//! have to handle `Option<Connection<I>>`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{report, SeesawError};

/// Uniform resource-release contract. First `dispose()` releases resources;
/// every later call is a no-op.
pub trait Disposable: Send + Sync {
    fn dispose(&self);
}

/// A live, disposable binding between a producer of `I` and a single
/// consumer of outputs. Calling `accept` after `dispose` is a programmer
/// error: it is reported via the error hook and the underlying consumer is
/// never invoked.
pub struct Connection<I> {
    accept: Arc<dyn Fn(I) + Send + Sync>,
    dispose: Arc<dyn Fn() + Send + Sync>,
    disposed: Arc<AtomicBool>,
}

impl<I> Connection<I> {
    /// Build a connection from raw `accept`/`dispose` closures. `dispose` is
    /// automatically made idempotent; callers of [`Connection::new`] do not
    /// need to guard against a second invocation themselves.
    pub fn new<A, D>(accept: A, dispose: D) -> Self
    where
        A: Fn(I) + Send + Sync + 'static,
        D: Fn() + Send + Sync + 'static,
    {
        Self {
            accept: Arc::new(accept),
            dispose: Arc::new(dispose),
            disposed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Deliver `input` to the bound consumer. A no-op (reported via the
    /// error hook) once this connection has been disposed.
    pub fn accept(&self, input: I) {
        if self.disposed.load(Ordering::Acquire) {
            report(SeesawError::AcceptAfterDispose);
            return;
        }
        (self.accept)(input);
    }

    /// An owned `Fn(I)` that forwards into this connection's `accept`, for
    /// call sites (e.g. [`MobiusController::start`](crate::controller::MobiusController::start))
    /// that need to hand the delivery side to another component without
    /// exposing the whole `Connection`.
    pub fn accept_fn(self: Arc<Self>) -> Arc<dyn Fn(I) + Send + Sync>
    where
        I: 'static,
    {
        Arc::new(move |input: I| self.accept(input))
    }

    /// Release the connection. Idempotent: only the first call runs the
    /// underlying teardown closure.
    pub fn dispose(&self) {
        if self
            .disposed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            (self.dispose)();
        }
    }
}

impl<I> Disposable for Connection<I> {
    fn dispose(&self) {
        Connection::dispose(self)
    }
}

impl<I> Drop for Connection<I> {
    fn drop(&mut self) {
        // Connections are explicitly disposed by their owner; dropping one
        // that still holds live resources is a caller bug, not something we
        // paper over here by auto-disposing (that would make double-dispose
        // semantics invisible). We only guard against leaking the flag.
    }
}

/// A connection that silently swallows every `accept` and disposes
/// trivially. Returned in place of `None`/`null` whenever construction of a
/// real connection fails (e.g. a single-consumer violation), so callers
/// never have to branch on connection validity.
pub fn broken_connection<I: 'static>() -> Connection<I> {
    Connection::new(|_: I| {}, || {})
}

/// A factory that, given an output sink, returns a live [`Connection`].
/// Implementations that support only one live consumer at a time must
/// reject a second concurrent `connect` (error-hook + [`broken_connection`]).
pub trait Connectable<I, O>: Send + Sync {
    fn connect(&self, sink: Arc<dyn Fn(O) + Send + Sync>) -> Connection<I>;
}
