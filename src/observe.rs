//! Observable state cells.
//!
//! An [`Observable`] holds one value and notifies subscribers only when the
//! value actually changes. Subscriptions are scoped: dropping the returned
//! [`Subscription`] unregisters the callback.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Callback<T> = Rc<dyn Fn(&T)>;

struct Inner<T> {
    value: T,
    subscribers: Vec<(usize, Callback<T>)>,
    next_id: usize,
}

/// A shared, single-threaded value cell with change notification.
///
/// Cloning an `Observable` yields another handle to the same cell.
pub struct Observable<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Observable")
            .field(&self.inner.borrow().value)
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create a cell holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                value,
                subscribers: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Current value.
    pub fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    /// Store `value` and notify subscribers if it differs from the current one.
    ///
    /// Returns whether a transition happened. Callbacks run after the cell is
    /// released, so they may read or write this observable.
    pub fn set(&self, value: T) -> bool {
        let callbacks: Vec<Callback<T>> = {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return false;
            }
            inner.value = value.clone();
            inner.subscribers.iter().map(|(_, cb)| Rc::clone(cb)).collect()
        };
        for cb in callbacks {
            cb(&value);
        }
        true
    }

    /// Apply `f` to the current value and store the result.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let next = f(&self.inner.borrow().value);
        self.set(next)
    }

    /// Register a callback for future transitions.
    ///
    /// The callback stays registered for as long as the returned
    /// [`Subscription`] is alive.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.push((id, Rc::new(callback)));
            id
        };

        let weak: Weak<RefCell<Inner<T>>> = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .borrow_mut()
                    .subscribers
                    .retain(|(sub_id, _)| *sub_id != id);
            }
        })
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }
}

/// Guard for a registered callback; unsubscribes on drop.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub(crate) fn new(release: impl FnOnce() + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// Unsubscribe now instead of waiting for drop.
    pub fn cancel(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_notifies_only_on_transition() {
        let cell = Observable::new(5);
        let hits = Rc::new(Cell::new(0));
        let counter = Rc::clone(&hits);
        let _sub = cell.subscribe(move |_| counter.set(counter.get() + 1));

        assert!(!cell.set(5));
        assert!(cell.set(6));
        assert!(!cell.set(6));
        assert_eq!(hits.get(), 1);
        assert_eq!(cell.get(), 6);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let cell = Observable::new(String::from("a"));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let sub = cell.subscribe(move |v: &String| log.borrow_mut().push(v.clone()));
        assert_eq!(cell.subscriber_count(), 1);

        cell.set("b".into());
        drop(sub);
        cell.set("c".into());

        assert_eq!(*seen.borrow(), vec!["b".to_string()]);
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn test_callback_may_read_cell() {
        let cell = Observable::new(1);
        let reader = cell.clone();
        let seen = Rc::new(Cell::new(0));
        let out = Rc::clone(&seen);
        let _sub = cell.subscribe(move |_| out.set(reader.get()));
        cell.update(|v| v + 1);
        assert_eq!(seen.get(), 2);
    }

    #[test]
    fn test_subscription_outlives_cell() {
        let cell = Observable::new(0u8);
        let sub = cell.subscribe(|_| {});
        drop(cell);
        sub.cancel();
    }
}
