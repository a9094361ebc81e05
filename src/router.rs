//! `EffectRouter<F, E>` — declarative, exactly-one-match effect dispatch.
//!
//! A router is an immutable, append-only list of routes, each a
//! `(predicate-with-payload-extractor, handler)` pair. `as_connectable`
//! composes every registered route into a single `Connectable<F, E>`: on
//! `accept(effect)`, every route's extractor is tried; if exactly one
//! matches, that route's handler runs (spawned onto the Tokio runtime — the
//! "effect queue" of spec.md §5) and its `dispatch` calls feed events back
//! into the sink. Zero or multiple matches is a routing-ambiguity
//! programmer error, reported via the [error hook](crate::error) and never
//! executed.

use std::any::Any;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, Semaphore};

use crate::connection::{broken_connection, Connectable, Connection};
use crate::effect::{DispatchFn, EffectHandler, SafeDispatch};
use crate::error::{report, SeesawError};

type ErasedPayload = Box<dyn Any + Send>;
type Invoke<E> = Arc<dyn Fn(ErasedPayload, DispatchFn<E>) -> BoxFuture<'static, ()> + Send + Sync>;
type TryMatch<F> = Arc<dyn Fn(&F) -> Option<ErasedPayload> + Send + Sync>;

/// How a composed router schedules the futures its matched handlers
/// produce — spec.md §9's open question about non-serial effect queues,
/// resolved here (see DESIGN.md). The default, `Concurrent(None)`, spawns
/// each matched handler call independently the moment it matches, exactly
/// as the teacher's `Dispatcher` fires off inline command execution.
#[derive(Clone)]
pub enum EffectQueueKind {
    /// Every matched effect is spawned onto its own task as soon as it
    /// matches. `None` means unbounded; `Some(n)` bounds the number of
    /// handler calls in flight at once via a semaphore. Effects may
    /// therefore complete out of the order they were accepted.
    Concurrent(Option<usize>),
    /// Matched effects run one at a time, in `accept()` order, on a single
    /// background task. Slower under load but gives callers a total order
    /// over handler execution.
    Serial,
}

impl Default for EffectQueueKind {
    fn default() -> Self {
        Self::Concurrent(None)
    }
}

struct Route<F, E> {
    try_match: TryMatch<F>,
    invoke: Invoke<E>,
    dispose: Arc<dyn Fn() + Send + Sync>,
}

/// Builder for a composed effect router. Routes are tried in registration
/// order purely for the purposes of producing a deterministic ambiguity
/// report; which single route wins is determined by its predicate, not by
/// position.
pub struct EffectRouter<F, E> {
    routes: Vec<Route<F, E>>,
}

impl<F, E> EffectRouter<F, E>
where
    F: Debug + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self { routes: Vec::new() }
    }

    /// Match if `extract(effect)` returns `Some`; route the extracted
    /// payload to `handler`.
    pub fn route_payload<P, H>(
        mut self,
        extract: impl Fn(&F) -> Option<P> + Send + Sync + 'static,
        handler: H,
    ) -> Self
    where
        P: Send + 'static,
        H: EffectHandler<P, E> + 'static,
    {
        let handler = Arc::new(handler);
        let h_dispose = handler.clone();
        self.routes.push(Route {
            try_match: Arc::new(move |effect: &F| {
                extract(effect).map(|p| Box::new(p) as ErasedPayload)
            }),
            invoke: Arc::new(move |payload, dispatch| {
                let handler = handler.clone();
                let payload = *payload
                    .downcast::<P>()
                    .expect("route payload type mismatch (internal invariant)");
                Box::pin(async move { handler.handle(payload, dispatch).await })
            }),
            dispose: Arc::new(move || h_dispose.dispose()),
        });
        self
    }

    /// Match if `effect == value`, routing the effect itself to `handler`.
    pub fn route_constant<H>(self, value: F, handler: H) -> Self
    where
        F: PartialEq + Clone,
        H: EffectHandler<F, E> + 'static,
    {
        self.route_payload(
            move |effect: &F| if *effect == value { Some(effect.clone()) } else { None },
            handler,
        )
    }

    /// Sugar over [`route_payload`](Self::route_payload): match a specific
    /// tagged-union variant via a user-supplied extractor. Per spec.md §9,
    /// this never relies on runtime reflection over the effect's memory
    /// layout — the extractor is an ordinary closure the caller writes
    /// (typically a `match` arm).
    pub fn route_case<P, H>(
        self,
        extract: impl Fn(&F) -> Option<P> + Send + Sync + 'static,
        handler: H,
    ) -> Self
    where
        P: Send + 'static,
        H: EffectHandler<P, E> + 'static,
    {
        self.route_payload(extract, handler)
    }

    /// Compose every registered route into a single `Connectable<F, E>`,
    /// dispatching matched effects per `EffectQueueKind::default()`.
    pub fn as_connectable(self) -> RouterConnectable<F, E> {
        self.as_connectable_with_queue(EffectQueueKind::default())
    }

    /// As [`as_connectable`](Self::as_connectable), with an explicit
    /// [`EffectQueueKind`].
    pub fn as_connectable_with_queue(self, queue: EffectQueueKind) -> RouterConnectable<F, E> {
        RouterConnectable {
            routes: Arc::new(self.routes),
            connected: Arc::new(AtomicBool::new(false)),
            queue,
        }
    }

    /// Package this router as a reusable factory: each call produces a
    /// fresh, never-yet-connected `Connectable<F, E>` sharing the same
    /// route table. Used by [`LoopBuilder`](crate::builder::LoopBuilder) so
    /// a `MobiusController` can rebuild a loop's effect handler on every
    /// `start()` without re-registering routes.
    pub fn into_factory(
        self,
        queue: EffectQueueKind,
    ) -> Arc<dyn Fn() -> Arc<dyn Connectable<F, E>> + Send + Sync>
    where
        F: 'static,
        E: 'static,
    {
        let routes = Arc::new(self.routes);
        Arc::new(move || {
            Arc::new(RouterConnectable {
                routes: routes.clone(),
                connected: Arc::new(AtomicBool::new(false)),
                queue: queue.clone(),
            }) as Arc<dyn Connectable<F, E>>
        })
    }
}

impl<F, E> Default for EffectRouter<F, E>
where
    F: Debug + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// The `Connectable<F, E>` a composed [`EffectRouter`] produces.
/// Single-consumer: a second concurrent `connect` is a programmer error.
pub struct RouterConnectable<F, E> {
    routes: Arc<Vec<Route<F, E>>>,
    connected: Arc<AtomicBool>,
    queue: EffectQueueKind,
}

/// Builds the scheduling closure a connected router dispatches matched
/// handler futures through, per [`EffectQueueKind`]. `Concurrent(None)`
/// spawns each as its own task; `Concurrent(Some(n))` gates spawns behind a
/// semaphore so at most `n` handler calls run at once; `Serial` feeds a
/// single background task through an unbounded channel so handler calls run
/// one at a time, in the order their effects were accepted.
fn make_scheduler(queue: &EffectQueueKind) -> Arc<dyn Fn(BoxFuture<'static, ()>) + Send + Sync> {
    match *queue {
        EffectQueueKind::Concurrent(None) => Arc::new(|fut| {
            tokio::spawn(fut);
        }),
        EffectQueueKind::Concurrent(Some(limit)) => {
            let semaphore = Arc::new(Semaphore::new(limit));
            Arc::new(move |fut| {
                let semaphore = semaphore.clone();
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("effect semaphore never closed while router is live");
                    fut.await;
                });
            })
        }
        EffectQueueKind::Serial => {
            let (tx, mut rx) = mpsc::unbounded_channel::<BoxFuture<'static, ()>>();
            tokio::spawn(async move {
                while let Some(fut) = rx.recv().await {
                    fut.await;
                }
            });
            Arc::new(move |fut| {
                // The receiving task outlives every sender: it only exits
                // once every `Connection` holding a sender has been dropped.
                let _ = tx.send(fut);
            })
        }
    }
}

impl<F, E> Connectable<F, E> for RouterConnectable<F, E>
where
    F: Debug + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn connect(&self, sink: Arc<dyn Fn(E) + Send + Sync>) -> Connection<F> {
        if self
            .connected
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            report(SeesawError::SingleConsumerViolation);
            return broken_connection();
        }

        let disposed = Arc::new(AtomicBool::new(false));
        let safe_dispatch = Arc::new(SafeDispatch::new(sink, disposed.clone()));
        let dispatch_fn: DispatchFn<E> = safe_dispatch.as_dispatch_fn();
        let routes = self.routes.clone();
        let schedule = make_scheduler(&self.queue);

        let accept_routes = routes.clone();
        let accept_dispatch = dispatch_fn;
        let accept = move |effect: F| {
            let mut matched: Vec<(&Route<F, E>, ErasedPayload)> = Vec::new();
            for route in accept_routes.iter() {
                if let Some(payload) = (route.try_match)(&effect) {
                    matched.push((route, payload));
                }
            }
            match matched.len() {
                1 => {
                    let (route, payload) = matched.into_iter().next().unwrap();
                    let fut = (route.invoke)(payload, accept_dispatch.clone());
                    schedule(fut);
                }
                n => {
                    report(SeesawError::RoutingAmbiguity {
                        matches: n,
                        effect_debug: format!("{effect:?}"),
                    });
                }
            }
        };

        let dispose_routes = routes;
        let dispose = move || {
            disposed.store(true, Ordering::Release);
            for route in dispose_routes.iter() {
                (route.dispose)();
            }
        };

        Connection::new(accept, dispose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::install_test_error_hook;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum TestEffect {
        Load(i32),
        Save(i32),
        Ping,
    }

    struct RecordingHandler {
        label: &'static str,
        seen: Arc<Mutex<Vec<(&'static str, i32)>>>,
        emit: Option<&'static str>,
    }

    #[async_trait]
    impl EffectHandler<i32, &'static str> for RecordingHandler {
        async fn handle(&self, payload: i32, dispatch: DispatchFn<&'static str>) {
            self.seen.lock().unwrap().push((self.label, payload));
            if let Some(ev) = self.emit {
                dispatch(ev);
            }
        }
    }

    #[tokio::test]
    async fn exactly_one_match_invokes_handler() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let events = Arc::new(Mutex::new(Vec::new()));
        let router = EffectRouter::<TestEffect, &'static str>::new()
            .route_payload(
                |e| match e {
                    TestEffect::Load(n) => Some(*n),
                    _ => None,
                },
                RecordingHandler {
                    label: "load",
                    seen: seen.clone(),
                    emit: Some("loaded"),
                },
            )
            .route_payload(
                |e| match e {
                    TestEffect::Save(n) => Some(*n),
                    _ => None,
                },
                RecordingHandler {
                    label: "save",
                    seen: seen.clone(),
                    emit: None,
                },
            );
        let connectable = router.as_connectable();
        let ev = events.clone();
        let conn = connectable.connect(Arc::new(move |e: &'static str| ev.lock().unwrap().push(e)));
        conn.accept(TestEffect::Load(7));
        // Let the spawned task run.
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(*seen.lock().unwrap(), vec![("load", 7)]);
        assert_eq!(*events.lock().unwrap(), vec!["loaded"]);
    }

    #[tokio::test]
    async fn zero_matches_is_reported_and_nothing_runs() {
        let hook = install_test_error_hook();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let router = EffectRouter::<TestEffect, &'static str>::new().route_payload(
            |e| match e {
                TestEffect::Load(n) => Some(*n),
                _ => None,
            },
            RecordingHandler {
                label: "load",
                seen: seen.clone(),
                emit: None,
            },
        );
        let conn = router
            .as_connectable()
            .connect(Arc::new(|_: &'static str| {}));
        conn.accept(TestEffect::Ping);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(hook.count(), 1);
        assert!(hook.last().unwrap().contains('0'));
    }

    #[tokio::test]
    async fn two_matches_is_reported_and_neither_handler_runs_more_than_once() {
        let hook = install_test_error_hook();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let router = EffectRouter::<TestEffect, &'static str>::new()
            .route_constant(
                TestEffect::Ping,
                RecordingHandler {
                    label: "a",
                    seen: seen.clone(),
                    emit: None,
                },
            )
            .route_payload(
                |e| matches!(e, TestEffect::Ping).then_some(0),
                RecordingHandler {
                    label: "b",
                    seen: seen.clone(),
                    emit: None,
                },
            );
        let conn = router
            .as_connectable()
            .connect(Arc::new(|_: &'static str| {}));
        conn.accept(TestEffect::Ping);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(hook.count(), 1);
        assert!(hook.last().unwrap().contains('2'));
    }

    #[tokio::test]
    async fn second_connect_is_rejected() {
        let hook = install_test_error_hook();
        let router = EffectRouter::<TestEffect, &'static str>::new().route_constant(
            TestEffect::Ping,
            RecordingHandler {
                label: "a",
                seen: Arc::new(Mutex::new(Vec::new())),
                emit: None,
            },
        );
        let connectable = router.as_connectable();
        let _first = connectable.connect(Arc::new(|_: &'static str| {}));
        let second = connectable.connect(Arc::new(|_: &'static str| {}));
        second.accept(TestEffect::Ping);
        assert_eq!(hook.count(), 1);
    }

    #[tokio::test]
    async fn serial_queue_runs_handlers_one_at_a_time_in_accept_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        struct SlowHandler {
            label: i32,
            seen: Arc<Mutex<Vec<i32>>>,
        }
        #[async_trait]
        impl EffectHandler<i32, &'static str> for SlowHandler {
            async fn handle(&self, _payload: i32, _dispatch: DispatchFn<&'static str>) {
                tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                self.seen.lock().unwrap().push(self.label);
            }
        }
        let router = EffectRouter::<TestEffect, &'static str>::new()
            .route_payload(
                |e| match e {
                    TestEffect::Load(n) => Some(*n),
                    _ => None,
                },
                SlowHandler {
                    label: 1,
                    seen: seen.clone(),
                },
            )
            .route_payload(
                |e| match e {
                    TestEffect::Save(n) => Some(*n),
                    _ => None,
                },
                SlowHandler {
                    label: 2,
                    seen: seen.clone(),
                },
            );
        let conn = router
            .as_connectable_with_queue(EffectQueueKind::Serial)
            .connect(Arc::new(|_: &'static str| {}));
        conn.accept(TestEffect::Load(1));
        conn.accept(TestEffect::Save(2));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn dispose_calls_every_handlers_dispose() {
        struct DropFlagHandler(Arc<AtomicBool>);
        #[async_trait]
        impl EffectHandler<i32, &'static str> for DropFlagHandler {
            async fn handle(&self, _payload: i32, _dispatch: DispatchFn<&'static str>) {}
            fn dispose(&self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }
        let disposed = Arc::new(AtomicBool::new(false));
        let router = EffectRouter::<TestEffect, &'static str>::new().route_payload(
            |e| match e {
                TestEffect::Load(n) => Some(*n),
                _ => None,
            },
            DropFlagHandler(disposed.clone()),
        );
        let conn = router
            .as_connectable()
            .connect(Arc::new(|_: &'static str| {}));
        conn.dispose();
        assert!(disposed.load(Ordering::SeqCst));
    }
}
