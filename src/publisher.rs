//! `ConnectablePublisher<T>` — the fan-out broadcaster behind model
//! observation.
//!
//! Unlike the teacher's [`EventBus`](crate) (a `tokio::sync::broadcast`
//! channel, which drops values for lagging receivers), a
//! `ConnectablePublisher` delivers every posted value to every current
//! subscriber *synchronously*, in the order subscribers were added, and
//! never drops a value. That is what spec.md §4.3 requires: observers must
//! see every model in order, with no buffering or backpressure semantics to
//! reason about. A plain `Mutex<Vec<_>>` gives us the deterministic
//! insertion-order iteration the broadcast channel can't.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::connection::{broken_connection, Connection};
use crate::error::{report, SeesawError};

type Subscriber<T> = Arc<dyn Fn(T) + Send + Sync>;

struct Subscription<T> {
    token: Uuid,
    callback: Subscriber<T>,
}

/// Fan-out broadcaster: accepts values from one producer via [`post`](Self::post),
/// forwards each to every subscriber until [`dispose`](Self::dispose)d.
pub struct ConnectablePublisher<T> {
    subscribers: Mutex<Vec<Subscription<T>>>,
    closed: AtomicBool,
}

impl<T: Clone + Send + 'static> ConnectablePublisher<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Deliver `value` to every current subscriber, synchronously, in
    /// subscription order. A no-op once closed. Subscribers that
    /// subscribe/unsubscribe re-entrantly (from inside a callback) mutate the
    /// set for the *next* `post`, never the one in progress — we snapshot the
    /// subscriber list before invoking any callback.
    pub fn post(&self, value: T) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let snapshot: Vec<Subscriber<T>> = {
            let guard = self.subscribers.lock().expect("publisher lock poisoned");
            guard.iter().map(|s| s.callback.clone()).collect()
        };
        for callback in snapshot {
            callback(value.clone());
        }
    }

    /// Subscribe `sink`. Returns a `Connection` whose `accept` is unused and
    /// whose `dispose` removes this one subscriber. Returns a
    /// [`broken_connection`] (and reports via the error hook) once the
    /// publisher has been disposed.
    pub fn connect(self: &Arc<Self>, sink: Arc<dyn Fn(T) + Send + Sync>) -> Connection<()> {
        if self.closed.load(Ordering::Acquire) {
            report(SeesawError::SingleConsumerViolation);
            return broken_connection();
        }
        let token = Uuid::new_v4();
        {
            let mut guard = self.subscribers.lock().expect("publisher lock poisoned");
            guard.push(Subscription {
                token,
                callback: sink,
            });
        }
        let weak = Arc::downgrade(self);
        Connection::new(
            |_: ()| {},
            move || {
                if let Some(publisher) = weak.upgrade() {
                    let mut guard = publisher
                        .subscribers
                        .lock()
                        .expect("publisher lock poisoned");
                    guard.retain(|s| s.token != token);
                }
            },
        )
    }

    /// Transition to closed: removes all subscribers, and every subsequent
    /// `post`/`connect` is ignored (`connect` reports via the error hook and
    /// returns a broken connection).
    pub fn dispose(&self) {
        self.closed.store(true, Ordering::Release);
        let mut guard = self.subscribers.lock().expect("publisher lock poisoned");
        guard.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T: Clone + Send + 'static> Default for ConnectablePublisher<T> {
    fn default() -> Self {
        Self::new()
    }
}
