//! Replicated value with change listeners
//!
//! Listeners run synchronously, on the thread that calls [`Replicated::set`],
//! in registration order. A listener may subscribe or cancel subscriptions
//! (its own included) but must not call `set` on the value notifying it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Listener<T> = Box<dyn FnMut(&T, &T) + Send>;

struct Listeners<T> {
    entries: Vec<(u64, Listener<T>)>,
    /// Set while `entries` is checked out for a notification pass
    notifying: bool,
    /// Ids cancelled during the current notification pass
    cancelled: Vec<u64>,
}

struct Inner<T> {
    value: Mutex<T>,
    listeners: Mutex<Listeners<T>>,
    /// Serializes notification passes across threads
    notify: Mutex<()>,
    next_id: AtomicU64,
}

impl<T> Inner<T> {
    fn unregister(&self, id: u64) {
        let removed = {
            let mut listeners = self.listeners.lock();
            if listeners.notifying {
                listeners.cancelled.push(id);
            }
            let index = listeners.entries.iter().position(|(lid, _)| *lid == id);
            index.map(|i| listeners.entries.remove(i))
        };
        // Dropped unlocked: the listener may own further subscriptions
        drop(removed);
    }
}

/// A value written by one side and observed by the other
pub struct Replicated<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Clone + Send + 'static> Replicated<T> {
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: Mutex::new(initial),
                listeners: Mutex::new(Listeners {
                    entries: Vec::new(),
                    notifying: false,
                    cancelled: Vec::new(),
                }),
                notify: Mutex::new(()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Current value
    pub fn get(&self) -> T {
        self.inner.value.lock().clone()
    }

    /// Replace the value and notify every listener with `(previous, new)`.
    ///
    /// Listeners are called with no lock on the listener list held. One
    /// cancelled mid-pass is skipped if it has not run yet; one added mid-pass
    /// first hears the next change.
    pub fn set(&self, value: T) {
        let _pass = self.inner.notify.lock();

        let previous = {
            let mut current = self.inner.value.lock();
            std::mem::replace(&mut *current, value.clone())
        };

        let mut active = {
            let mut listeners = self.inner.listeners.lock();
            listeners.notifying = true;
            std::mem::take(&mut listeners.entries)
        };

        for (id, listener) in active.iter_mut() {
            if self.inner.listeners.lock().cancelled.contains(id) {
                continue;
            }
            listener(&previous, &value);
        }

        let removed: Vec<(u64, Listener<T>)> = {
            let mut listeners = self.inner.listeners.lock();
            listeners.notifying = false;
            let cancelled = std::mem::take(&mut listeners.cancelled);
            let (kept, removed): (Vec<_>, Vec<_>) =
                active.into_iter().partition(|(id, _)| !cancelled.contains(id));
            let added = std::mem::replace(&mut listeners.entries, kept);
            listeners.entries.extend(added);
            removed
        };
        drop(removed);
    }

    /// Register a change listener. It stays active until the returned handle
    /// is cancelled or dropped.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: FnMut(&T, &T) + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().entries.push((id, Box::new(listener)));

        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.unregister(id);
                }
            })),
        }
    }

    /// Registered listeners. Not meaningful from inside a listener.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().entries.len()
    }
}

impl<T> Clone for Replicated<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Handle for a registered listener
#[must_use = "dropping a Subscription unregisters the listener"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Unregister the listener now
    pub fn cancel(mut self) {
        self.run_cancel();
    }

    fn run_cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_sees_previous_and_new() {
        let value = Replicated::new(1);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let _sub = value.subscribe(move |prev: &i32, new: &i32| sink.lock().push((*prev, *new)));

        value.set(2);
        value.set(5);

        assert_eq!(*seen.lock(), vec![(1, 2), (2, 5)]);
        assert_eq!(value.get(), 5);
    }

    #[test]
    fn test_cancel_and_drop_unregister() {
        let value = Replicated::new(0u8);
        let first = value.subscribe(|_, _| {});
        let second = value.subscribe(|_, _| {});
        assert_eq!(value.listener_count(), 2);

        first.cancel();
        assert_eq!(value.listener_count(), 1);

        drop(second);
        assert_eq!(value.listener_count(), 0);
    }

    #[test]
    fn test_listener_may_cancel_itself_and_subscribe_others() {
        let value = Replicated::new(0);
        let once_calls = Arc::new(AtomicU64::new(0));
        let late_seen = Arc::new(Mutex::new(Vec::new()));

        // Fires once, then drops its own handle from inside the callback
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let once = {
            let slot = slot.clone();
            let calls = once_calls.clone();
            value.subscribe(move |_: &i32, _: &i32| {
                calls.fetch_add(1, Ordering::Relaxed);
                let own = slot.lock().take();
                drop(own);
            })
        };
        *slot.lock() = Some(once);

        // Registers a new listener from inside its first callback
        let held: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));
        let _spawner = {
            let value = value.clone();
            let held = held.clone();
            let late_seen = late_seen.clone();
            value.clone().subscribe(move |_: &i32, _: &i32| {
                let first = held.lock().is_empty();
                if first {
                    let seen = late_seen.clone();
                    let sub = value.subscribe(move |_: &i32, new: &i32| seen.lock().push(*new));
                    held.lock().push(sub);
                }
            })
        };

        value.set(1);
        value.set(2);
        value.set(3);

        assert_eq!(once_calls.load(Ordering::Relaxed), 1);
        assert_eq!(*late_seen.lock(), vec![2, 3]);
        assert_eq!(value.listener_count(), 2);

        held.lock().clear();
        assert_eq!(value.listener_count(), 1);
    }

    #[test]
    fn test_listener_cancelling_a_later_one_skips_it() {
        let value = Replicated::new(0u8);
        let later_calls = Arc::new(AtomicU64::new(0));

        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let _first = {
            let slot = slot.clone();
            value.subscribe(move |_, _| {
                slot.lock().take();
            })
        };
        let later = {
            let calls = later_calls.clone();
            value.subscribe(move |_, _| {
                calls.fetch_add(1, Ordering::Relaxed);
            })
        };
        *slot.lock() = Some(later);

        value.set(1);
        value.set(2);

        assert_eq!(later_calls.load(Ordering::Relaxed), 0);
        assert_eq!(value.listener_count(), 1);
    }
}
