//! Subscription registry and dispatch loop.
//!
//! The registry is a [`DashMap`] of live subscriptions. Dispatch snapshots
//! the matching entries before invoking any handler so handlers may add or
//! remove subscriptions, including their own, while an item is delivered.
//! Each entry carries a live flag checked immediately before invocation, so
//! a subscription removed mid-delivery is never called afterwards.

use std::{
    fmt,
    sync::{
        Arc,
        Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use log::trace;

use super::{Callback, CallbackKind, CallbackMsg, CallbackQueue, JobFilter};
use crate::ids::JobId;

type Handler = Arc<dyn Fn(&Callback) + Send + Sync>;

struct Entry {
    kind: CallbackKind,
    filter: JobFilter,
    live: AtomicBool,
    handler: Handler,
}

impl Entry {
    fn accepts(&self, callback: &Callback) -> bool {
        callback.kind().is_a(self.kind) && self.filter.matches(callback.job_id())
    }
}

#[derive(Default)]
struct Registry {
    entries: DashMap<u64, Arc<Entry>>,
    next_id: AtomicU64,
}

impl Registry {
    fn remove(&self, id: u64) {
        if let Some((_, entry)) = self.entries.remove(&id) {
            entry.live.store(false, Ordering::Release);
        }
    }

    fn matching(&self, callback: &Callback) -> Vec<Arc<Entry>> {
        self.entries
            .iter()
            .filter(|entry| entry.accepts(callback))
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

/// Handle keeping a subscription registered.
///
/// Dropping the handle, or calling [`unsubscribe`](Self::unsubscribe),
/// removes the subscription. Both are safe from inside the subscription's
/// own handler.
#[must_use = "dropping a Subscription unregisters it"]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Remove the subscription now.
    pub fn unsubscribe(self) { drop(self); }

    /// Returns `true` while the subscription is registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.entries.contains_key(&self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish_non_exhaustive()
    }
}

/// Pulls items from a [`CallbackQueue`] and delivers them to subscribers.
///
/// ```
/// use std::sync::{
///     Arc,
///     atomic::{AtomicBool, Ordering},
/// };
///
/// use steamframe::callbacks::{
///     CallbackManager,
///     CallbackQueue,
///     DisconnectedCallback,
/// };
///
/// let queue = Arc::new(CallbackQueue::new());
/// let manager = CallbackManager::new(Arc::clone(&queue));
/// let seen = Arc::new(AtomicBool::new(false));
/// let flag = Arc::clone(&seen);
/// let _sub = manager.subscribe(move |cb: &DisconnectedCallback| {
///     flag.store(cb.user_initiated, Ordering::SeqCst);
/// });
///
/// queue.post(DisconnectedCallback { user_initiated: true });
/// assert!(manager.run_callbacks());
/// assert!(seen.load(Ordering::SeqCst));
/// ```
pub struct CallbackManager {
    queue: Arc<CallbackQueue>,
    registry: Arc<Registry>,
}

impl CallbackManager {
    /// Create a manager pulling from `queue`.
    #[must_use]
    pub fn new(queue: Arc<CallbackQueue>) -> Self {
        Self {
            queue,
            registry: Arc::new(Registry::default()),
        }
    }

    /// Queue this manager pulls from.
    #[must_use]
    pub fn queue(&self) -> &Arc<CallbackQueue> { &self.queue }

    /// Number of registered subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize { self.registry.entries.len() }

    /// Subscribe to items of type `T` for any job.
    pub fn subscribe<T, F>(&self, handler: F) -> Subscription
    where
        T: CallbackMsg,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_typed(JobFilter::Any, handler)
    }

    /// Subscribe to items of type `T` correlated with `job`.
    pub fn subscribe_job<T, F>(&self, job: JobId, handler: F) -> Subscription
    where
        T: CallbackMsg,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_typed(JobFilter::Job(job), handler)
    }

    /// Subscribe to every item whose kind is `kind` or one of its
    /// descendants.
    pub fn subscribe_kind<F>(&self, kind: CallbackKind, filter: JobFilter, handler: F) -> Subscription
    where
        F: Fn(&Callback) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Entry {
            kind,
            filter,
            live: AtomicBool::new(true),
            handler: Arc::new(handler),
        };
        self.registry.entries.insert(id, Arc::new(entry));
        trace!("subscription registered: id={id}, kind={kind:?}, filter={filter:?}");
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    fn subscribe_typed<T, F>(&self, filter: JobFilter, handler: F) -> Subscription
    where
        T: CallbackMsg,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.subscribe_kind(T::KIND, filter, move |callback| {
            if let Some(msg) = T::from_callback(callback) {
                handler(msg);
            }
        })
    }

    /// Deliver `callback` to every matching subscription.
    pub fn dispatch(&self, callback: &Callback) {
        for entry in self.registry.matching(callback) {
            if entry.live.load(Ordering::Acquire) {
                (entry.handler)(callback);
            }
        }
    }

    /// Dispatch at most one queued item without waiting.
    ///
    /// Returns `true` if an item was dispatched.
    pub fn run_callbacks(&self) -> bool {
        let Some(callback) = self.queue.try_pop() else {
            return false;
        };
        self.dispatch(&callback);
        true
    }

    /// Wait up to `timeout` for one item and dispatch it.
    ///
    /// Returns `true` if an item was dispatched.
    pub async fn run_wait_callbacks(&self, timeout: Duration) -> bool {
        let Some(callback) = self.queue.pop_timeout(timeout).await else {
            return false;
        };
        self.dispatch(&callback);
        true
    }

    /// Wait for exactly one item and dispatch it, matched or not.
    pub async fn run_wait_callbacks_forever(&self) {
        if let Some(callback) = self.queue.pop().await {
            self.dispatch(&callback);
        }
    }

    /// Wait up to `timeout` for one item, then dispatch it and every item
    /// available without waiting.
    ///
    /// Returns `true` if at least one item was dispatched.
    pub async fn run_wait_all_callbacks(&self, timeout: Duration) -> bool {
        if !self.run_wait_callbacks(timeout).await {
            return false;
        }
        while self.run_callbacks() {}
        true
    }
}
