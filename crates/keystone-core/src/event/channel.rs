use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::event::{Event, EventSystemError, SubscriptionId};

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;
type Filter<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

struct Subscription<E> {
    id: SubscriptionId,
    listener: Listener<E>,
    // Present only for one-shot subscriptions.
    once: Option<Filter<E>>,
}

impl<E> Clone for Subscription<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            listener: Arc::clone(&self.listener),
            once: self.once.clone(),
        }
    }
}

//--------------------------------------------------
// PublishReport
//--------------------------------------------------

/// A listener that panicked during delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerPanic {
    pub subscription: SubscriptionId,
    pub message: String,
}

/// Outcome of a single [`EventChannel::publish`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReport {
    pub event_name: &'static str,
    /// Listeners that ran to completion
    pub delivered: usize,
    pub panicked: Vec<ListenerPanic>,
}

impl PublishReport {
    fn new(event_name: &'static str) -> Self {
        Self { event_name, delivered: 0, panicked: Vec::new() }
    }

    pub fn is_clean(&self) -> bool {
        self.panicked.is_empty()
    }

    /// Turn isolated listener panics into an error for callers that want strict delivery.
    pub fn into_result(self) -> Result<usize, EventSystemError> {
        if self.panicked.is_empty() {
            return Ok(self.delivered);
        }
        let messages = self
            .panicked
            .iter()
            .map(|p| format!("#{}: {}", p.subscription, p.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(EventSystemError::ListenerPanicked {
            event_name: self.event_name,
            count: self.panicked.len(),
            messages,
        })
    }
}

//--------------------------------------------------
// EventChannel
//--------------------------------------------------

/// Named, synchronous publish/subscribe channel over a closed event type.
///
/// Delivery runs on the publisher's thread against a snapshot of the listener
/// table, so listeners may subscribe or unsubscribe (themselves included)
/// while being invoked. No lock is held while a listener runs.
pub struct EventChannel<E: Event> {
    listeners: Mutex<HashMap<&'static str, Vec<Subscription<E>>>>,
    next_id: AtomicU64,
}

impl<E: Event> fmt::Debug for EventChannel<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table();
        let listener_count: usize = table.values().map(Vec::len).sum();
        f.debug_struct("EventChannel")
            .field("event_names", &table.len())
            .field("listener_count", &listener_count)
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}

impl<E: Event> EventChannel<E> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    // The table is never left half-updated, so a poisoned lock is still usable.
    fn table(&self) -> MutexGuard<'_, HashMap<&'static str, Vec<Subscription<E>>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, event_name: &'static str, listener: Listener<E>, once: Option<Filter<E>>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.table()
            .entry(event_name)
            .or_default()
            .push(Subscription { id, listener, once });
        id
    }

    /// Invoke `listener` for every event published under `event_name`.
    pub fn subscribe<F>(&self, event_name: &'static str, listener: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.insert(event_name, Arc::new(listener), None)
    }

    /// Invoke `listener` for the next event published under `event_name` only.
    pub fn subscribe_once<F>(&self, event_name: &'static str, listener: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.insert(event_name, Arc::new(listener), Some(Arc::new(|_: &E| true)))
    }

    /// One-shot subscription that ignores events until `filter` matches one.
    ///
    /// The subscription is removed before the listener runs, so concurrent
    /// publishers can never deliver it twice.
    pub fn subscribe_once_when<P, F>(&self, event_name: &'static str, filter: P, listener: F) -> SubscriptionId
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.insert(event_name, Arc::new(listener), Some(Arc::new(filter)))
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut table = self.table();
        let mut found = false;
        table.values_mut().for_each(|subs| {
            let len_before = subs.len();
            subs.retain(|s| s.id != id);
            if subs.len() < len_before {
                found = true;
            }
        });
        table.retain(|_, subs| !subs.is_empty());
        found
    }

    /// Like [`unsubscribe`](Self::unsubscribe), but a missing ID is an error.
    pub fn try_unsubscribe(&self, id: SubscriptionId) -> Result<(), EventSystemError> {
        if self.unsubscribe(id) {
            Ok(())
        } else {
            Err(EventSystemError::UnknownSubscription { id })
        }
    }

    pub fn listener_count(&self, event_name: &str) -> usize {
        self.table().get(event_name).map_or(0, Vec::len)
    }

    /// Synchronously deliver `event` to every listener registered for its name.
    ///
    /// A panicking listener is caught and recorded in the report; the
    /// remaining listeners still run.
    pub fn publish(&self, event: &E) -> PublishReport {
        let event_name = event.name();
        let snapshot: Vec<Subscription<E>> = self
            .table()
            .get(event_name)
            .map(|subs| subs.to_vec())
            .unwrap_or_default();

        let mut report = PublishReport::new(event_name);
        for sub in snapshot {
            if let Some(filter) = &sub.once {
                match panic::catch_unwind(AssertUnwindSafe(|| filter(event))) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(payload) => {
                        report.panicked.push(record_panic(event_name, sub.id, payload.as_ref()));
                        continue;
                    }
                }
                // Whoever removes a one-shot owns its single delivery.
                if !self.unsubscribe(sub.id) {
                    continue;
                }
            }

            match panic::catch_unwind(AssertUnwindSafe(|| (sub.listener)(event))) {
                Ok(()) => report.delivered += 1,
                Err(payload) => report.panicked.push(record_panic(event_name, sub.id, payload.as_ref())),
            }
        }
        report
    }
}

impl<E: Event> Default for EventChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn record_panic(event_name: &'static str, subscription: SubscriptionId, payload: &(dyn Any + Send)) -> ListenerPanic {
    let message = panic_message(payload);
    log::warn!("Listener #{} panicked while handling '{}': {}", subscription, event_name, message);
    ListenerPanic { subscription, message }
}

//--------------------------------------------------
// Shared handle & guard
//--------------------------------------------------

/// Channel shared between the loader, the application context and modules
pub type SharedEventChannel<E> = Arc<EventChannel<E>>;

/// Create a new shared event channel
pub fn create_channel<E: Event>() -> SharedEventChannel<E> {
    Arc::new(EventChannel::new())
}

/// Unsubscribes every held subscription when dropped.
pub struct SubscriptionGuard<E: Event> {
    channel: SharedEventChannel<E>,
    ids: Vec<SubscriptionId>,
}

impl<E: Event> SubscriptionGuard<E> {
    pub fn new(channel: SharedEventChannel<E>) -> Self {
        Self { channel, ids: Vec::new() }
    }

    pub fn hold(&mut self, id: SubscriptionId) -> &mut Self {
        self.ids.push(id);
        self
    }

    pub fn ids(&self) -> &[SubscriptionId] {
        &self.ids
    }
}

impl<E: Event> fmt::Debug for SubscriptionGuard<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionGuard").field("ids", &self.ids).finish()
    }
}

impl<E: Event> Drop for SubscriptionGuard<E> {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            self.channel.unsubscribe(id);
        }
    }
}
