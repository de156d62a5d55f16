//! Push-to-pull subscription bridge.
//!
//! The router delivers events by invoking callbacks. Downstream consumers
//! (live subscription endpoints, LED controllers) want a pull-style
//! sequence: `while let Some(event) = stream.recv().await { ... }`.
//! [`EventStream`] bridges the two with a bounded queue.
//!
//! Backpressure: when the queue is full the oldest item is dropped and a
//! warning logged — a slow consumer falls behind rather than stalling the
//! dispatch path or growing without bound.
//!
//! Two construction variants:
//! - [`EventStream::eager`] awaits subscription establishment before
//!   returning, so a caller can subscribe first and then fetch initial
//!   state without a gap events could fall into.
//! - [`EventStream::lazy`] defers subscription to the first `recv()`.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex as AsyncMutex, Notify};
use tracing::warn;

use sendline_core::{defaults, Result};

use crate::pubsub::Subscription;

/// Push handle given to the subscribe primitive. The stream enqueues every
/// value pushed before `close()`.
pub type PushFn<T> = Arc<dyn Fn(T) + Send + Sync>;

type BoxSubscribe<T> = Box<
    dyn FnOnce(PushFn<T>) -> Pin<Box<dyn Future<Output = Result<Subscription>> + Send>> + Send,
>;

struct Shared<T> {
    queue: std::sync::Mutex<VecDeque<T>>,
    capacity: usize,
    closed: AtomicBool,
    notify: Notify,
}

impl<T> Shared<T> {
    fn push(&self, value: T) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        {
            let mut queue = self.queue.lock().unwrap();
            if queue.len() == self.capacity {
                queue.pop_front();
                warn!(
                    subsystem = "pubsub",
                    component = "bridge",
                    capacity = self.capacity,
                    "Subscription queue full, dropping oldest event"
                );
            }
            queue.push_back(value);
        }
        self.notify.notify_waiters();
    }
}

enum State<T> {
    /// Subscription deferred until the first `recv()`.
    Pending(BoxSubscribe<T>),
    Active(Subscription),
    Closed,
}

/// A pull-style asynchronous sequence over a push-style subscription.
pub struct EventStream<T> {
    shared: Arc<Shared<T>>,
    state: AsyncMutex<State<T>>,
}

impl<T: Send + 'static> EventStream<T> {
    fn shared(capacity: usize) -> Arc<Shared<T>> {
        Arc::new(Shared {
            queue: std::sync::Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        })
    }

    fn push_fn(shared: &Arc<Shared<T>>) -> PushFn<T> {
        let shared = Arc::clone(shared);
        Arc::new(move |value| shared.push(value))
    }

    /// Subscribe now, return once the subscription is established.
    pub async fn eager<F, Fut>(subscribe: F) -> Result<Self>
    where
        F: FnOnce(PushFn<T>) -> Fut,
        Fut: Future<Output = Result<Subscription>>,
    {
        Self::eager_with_capacity(defaults::SUBSCRIPTION_QUEUE_CAPACITY, subscribe).await
    }

    /// [`Self::eager`] with an explicit queue capacity.
    pub async fn eager_with_capacity<F, Fut>(capacity: usize, subscribe: F) -> Result<Self>
    where
        F: FnOnce(PushFn<T>) -> Fut,
        Fut: Future<Output = Result<Subscription>>,
    {
        let shared = Self::shared(capacity);
        let subscription = subscribe(Self::push_fn(&shared)).await?;
        Ok(Self {
            shared,
            state: AsyncMutex::new(State::Active(subscription)),
        })
    }

    /// Defer subscription until the first `recv()`. A subscribe failure at
    /// that point ends the stream.
    pub fn lazy<F, Fut>(subscribe: F) -> Self
    where
        F: FnOnce(PushFn<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Subscription>> + Send + 'static,
    {
        Self::lazy_with_capacity(defaults::SUBSCRIPTION_QUEUE_CAPACITY, subscribe)
    }

    /// [`Self::lazy`] with an explicit queue capacity.
    pub fn lazy_with_capacity<F, Fut>(capacity: usize, subscribe: F) -> Self
    where
        F: FnOnce(PushFn<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Subscription>> + Send + 'static,
    {
        let shared = Self::shared(capacity);
        let boxed: BoxSubscribe<T> = Box::new(move |push| Box::pin(subscribe(push)));
        Self {
            shared,
            state: AsyncMutex::new(State::Pending(boxed)),
        }
    }

    async fn ensure_subscribed(&self) -> bool {
        let mut state = self.state.lock().await;
        match &*state {
            State::Active(_) => true,
            State::Closed => false,
            State::Pending(_) => {
                let State::Pending(subscribe) = std::mem::replace(&mut *state, State::Closed)
                else {
                    unreachable!()
                };
                match subscribe(Self::push_fn(&self.shared)).await {
                    Ok(subscription) => {
                        *state = State::Active(subscription);
                        true
                    }
                    Err(e) => {
                        warn!(
                            subsystem = "pubsub",
                            component = "bridge",
                            error = %e,
                            "Deferred subscribe failed, ending stream"
                        );
                        self.shared.closed.store(true, Ordering::SeqCst);
                        false
                    }
                }
            }
        }
    }

    /// Next event, in push order. `None` once the stream is closed and
    /// drained of nothing (pending items are discarded on close).
    pub async fn recv(&self) -> Option<T> {
        if !self.ensure_subscribed().await {
            return None;
        }
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register for wakeups before checking the queue so a push
            // between the check and the await is not lost.
            notified.as_mut().enable();
            if let Some(value) = self.shared.queue.lock().unwrap().pop_front() {
                return Some(value);
            }
            if self.shared.closed.load(Ordering::SeqCst) {
                return None;
            }
            notified.await;
        }
    }

    /// Close the stream: unsubscribe exactly once, wake pending `recv()`
    /// calls with `None`, and drop anything pushed afterwards. Idempotent.
    pub async fn close(&self) {
        let previous = {
            let mut state = self.state.lock().await;
            std::mem::replace(&mut *state, State::Closed)
        };
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.queue.lock().unwrap().clear();
        self.shared.notify.notify_waiters();
        if let State::Active(subscription) = previous {
            subscription.close().await;
        }
    }

    /// Whether the stream has been closed.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}
