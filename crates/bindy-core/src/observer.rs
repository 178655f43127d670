#![forbid(unsafe_code)]

//! Observer lists with RAII subscriptions.
//!
//! Value-changed and group-update events are delivered through an
//! [`ObserverList<T>`]. An empty list is a valid no-op, so call sites never
//! check for "no listeners".
//!
//! # Design
//!
//! Subscribers are stored as `Weak` callbacks; the strong `Rc` lives inside
//! the [`Subscription`] guard. Dropping the guard makes the callback
//! unreachable, and dead entries are pruned lazily during `notify`.
//!
//! # Invariants
//!
//! 1. Subscribers are notified in registration order.
//! 2. Callbacks run outside the list's borrow, so a callback may subscribe,
//!    unsubscribe or notify again without panicking.
//! 3. Cloning an `ObserverList` shares the same subscriber set.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

type CallbackRc<T> = Rc<dyn Fn(&T)>;
type CallbackWeak<T> = Weak<dyn Fn(&T)>;

/// Shared list of weakly held callbacks.
pub struct ObserverList<T> {
    subscribers: Rc<RefCell<Vec<CallbackWeak<T>>>>,
}

impl<T> Clone for ObserverList<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: Rc::clone(&self.subscribers),
        }
    }
}

impl<T> Default for ObserverList<T> {
    fn default() -> Self {
        Self {
            subscribers: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl<T> std::fmt::Debug for ObserverList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList")
            .field("subscriber_count", &self.subscribers.borrow().len())
            .finish()
    }
}

impl<T: 'static> ObserverList<T> {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`. It stays registered while the returned
    /// [`Subscription`] is alive.
    pub fn subscribe(&self, callback: impl Fn(&T) + 'static) -> Subscription {
        let strong: CallbackRc<T> = Rc::new(callback);
        self.subscribers.borrow_mut().push(Rc::downgrade(&strong));
        Subscription {
            _guard: Box::new(strong),
        }
    }

    /// Invoke every live callback with `value` and prune dead ones.
    pub fn notify(&self, value: &T) {
        let callbacks: Vec<CallbackRc<T>> = {
            let mut subscribers = self.subscribers.borrow_mut();
            subscribers.retain(|w| w.strong_count() > 0);
            subscribers.iter().filter_map(Weak::upgrade).collect()
        };
        for cb in &callbacks {
            cb(value);
        }
    }

    /// Number of registered entries, including dead ones not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Whether no entries are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.borrow().is_empty()
    }

    /// Forget every subscriber. Outstanding guards become inert.
    pub fn clear(&self) {
        self.subscribers.borrow_mut().clear();
    }
}

/// RAII guard for a registered callback.
///
/// Dropping the guard drops the only strong reference to the callback, so
/// it will not be invoked again.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    _guard: Box<dyn std::any::Any>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn empty_list_notify_is_noop() {
        let list: ObserverList<i32> = ObserverList::new();
        list.notify(&1);
        assert!(list.is_empty());
    }

    #[test]
    fn notifies_in_registration_order() {
        let list = ObserverList::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l1 = Rc::clone(&log);
        let _a = list.subscribe(move |v: &i32| l1.borrow_mut().push(('A', *v)));
        let l2 = Rc::clone(&log);
        let _b = list.subscribe(move |v: &i32| l2.borrow_mut().push(('B', *v)));

        list.notify(&7);
        assert_eq!(*log.borrow(), vec![('A', 7), ('B', 7)]);
    }

    #[test]
    fn dropped_subscription_is_pruned() {
        let list = ObserverList::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let sub = list.subscribe(move |_: &()| h.set(h.get() + 1));

        list.notify(&());
        drop(sub);
        list.notify(&());

        assert_eq!(hits.get(), 1);
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn callback_may_subscribe_during_notify() {
        let list: ObserverList<u8> = ObserverList::new();
        let inner = list.clone();
        let held = Rc::new(RefCell::new(Vec::new()));
        let held_in = Rc::clone(&held);
        let _outer = list.subscribe(move |_| {
            held_in.borrow_mut().push(inner.subscribe(|_| {}));
        });

        list.notify(&0);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn clones_share_subscribers() {
        let a: ObserverList<i32> = ObserverList::new();
        let b = a.clone();
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        let _sub = a.subscribe(move |v| s.set(*v));

        b.notify(&9);
        assert_eq!(seen.get(), 9);
    }
}
