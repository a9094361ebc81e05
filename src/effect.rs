//! `EffectHandler` — the user-supplied side of effect routing.
//!
//! A handler pairs an async `handle(payload, dispatch)` with a `dispose`.
//! Handlers never retain `dispatch` beyond their own disposal (spec.md §9)
//! — it is only ever handed to them per-call, gated by a [`SafeDispatch`]
//! that becomes inert the instant the owning router's composite connection
//! is disposed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{report, SeesawError};

/// Non-owning callback into the loop's event pipeline. Handlers call this to
/// feed events back in response to a completed (or partially completed)
/// effect; they must not retain it past their own `dispose`.
pub type DispatchFn<E> = Arc<dyn Fn(E) + Send + Sync>;

/// One effect handler, matched against a payload extracted from the raw
/// effect by the [`EffectRouter`](crate::router::EffectRouter) route it is
/// registered under.
#[async_trait]
pub trait EffectHandler<P, E>: Send + Sync {
    /// Handle one occurrence of the matched payload, optionally dispatching
    /// follow-up events via `dispatch`.
    async fn handle(&self, payload: P, dispatch: DispatchFn<E>);

    /// Release any resources this handler holds. Called once, when the
    /// owning router's composite connection is disposed. Default: no-op.
    fn dispose(&self) {}
}

/// Gates a raw dispatch callback behind "has the owning connection been
/// disposed yet". Dispatching after dispose is reported via the error hook
/// rather than silently forwarded or panicking — spec.md §4.5's "per-handler
/// invariant".
pub struct SafeDispatch<E> {
    inner: DispatchFn<E>,
    disposed: Arc<AtomicBool>,
}

impl<E> SafeDispatch<E> {
    pub fn new(inner: DispatchFn<E>, disposed: Arc<AtomicBool>) -> Self {
        Self { inner, disposed }
    }

    pub fn as_dispatch_fn(self: Arc<Self>) -> DispatchFn<E>
    where
        E: 'static,
    {
        Arc::new(move |event: E| self.dispatch(event))
    }

    pub fn dispatch(&self, event: E) {
        if self.disposed.load(Ordering::Acquire) {
            report(SeesawError::DispatchAfterDispose);
            return;
        }
        (self.inner)(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::install_test_error_hook;
    use std::sync::Mutex;

    #[test]
    fn safe_dispatch_forwards_until_disposed() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let r = received.clone();
        let inner: DispatchFn<i32> = Arc::new(move |e| r.lock().unwrap().push(e));
        let disposed = Arc::new(AtomicBool::new(false));
        let guard = SafeDispatch::new(inner, disposed.clone());
        guard.dispatch(1);
        disposed.store(true, Ordering::Release);
        guard.dispatch(2);
        assert_eq!(*received.lock().unwrap(), vec![1]);
    }

    #[test]
    fn dispatch_after_dispose_is_reported() {
        let hook = install_test_error_hook();
        let inner: DispatchFn<i32> = Arc::new(|_| {});
        let disposed = Arc::new(AtomicBool::new(true));
        let guard = SafeDispatch::new(inner, disposed);
        guard.dispatch(1);
        assert_eq!(hook.count(), 1);
    }
}
