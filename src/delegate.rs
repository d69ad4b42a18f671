//! Weak-reference multicast delegate.
//!
//! Generalizes `signals::SignalArbiter` (a `DashMap<String, Vec<Handler>>`
//! with `on`/`emit`/`merge_from`) from string-keyed signal fan-out to a
//! typed, weakly-referenced listener list attached to one task or one
//! observer registration.

use std::any::Any;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type AnyWeak = Weak<dyn Any + Send + Sync>;

/// One registered listener: an optional weak target plus the callback
/// invoked on it. `target: None` means the listener is detached — it lives
/// as long as the delegate itself.
struct Listener<T: ?Sized> {
    target: Option<AnyWeak>,
    callback: Arc<dyn Fn(&T) + Send + Sync>,
}

impl<T: ?Sized> Listener<T> {
    fn is_live(&self) -> bool {
        match &self.target {
            None => true,
            Some(w) => w.strong_count() > 0,
        }
    }
}

/// A set of listeners notified in registration order, pruned of dead targets
/// as they're iterated.
///
/// `invoke` takes a snapshot before calling out, so a listener that adds or
/// removes entries mid-invocation does not affect the current pass — the
/// same guarantee `SignalArbiter::emit` gives its handlers.
pub struct MulticastDelegate<T: ?Sized> {
    listeners: Mutex<Vec<Listener<T>>>,
}

impl<T: ?Sized> Default for MulticastDelegate<T> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl<T: ?Sized + 'static> MulticastDelegate<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener bound to `target`'s lifetime. Once `target` is
    /// dropped, the listener is silently skipped (and eventually pruned) on
    /// the next `invoke`.
    pub fn add<O: Any + Send + Sync>(&self, target: &Arc<O>, callback: impl Fn(&T) + Send + Sync + 'static) {
        self.listeners.lock().push(Listener {
            target: Some(Arc::downgrade(target)),
            callback: Arc::new(callback),
        });
    }

    /// Registers a listener with no owning target; it lives as long as the
    /// delegate itself.
    pub fn add_detached(&self, callback: impl Fn(&T) + Send + Sync + 'static) {
        self.listeners.lock().push(Listener {
            target: None,
            callback: Arc::new(callback),
        });
    }

    /// Removes every listener bound to `target`.
    pub fn remove<O: Any + Send + Sync>(&self, target: &Arc<O>) {
        let target_weak: AnyWeak = Arc::downgrade(target);
        self.listeners.lock().retain(|l| match &l.target {
            Some(w) => !Weak::ptr_eq(w, &target_weak),
            None => true,
        });
    }

    /// True once every listener has either been removed or gone dead.
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().iter().all(|l| !l.is_live())
    }

    /// Invokes `f` once per live listener, in registration order, pruning
    /// dead targets from the backing list as it goes.
    pub fn invoke(&self, value: &T) {
        let snapshot: Vec<Arc<dyn Fn(&T) + Send + Sync>> = {
            let mut guard = self.listeners.lock();
            guard.retain(|l| l.is_live());
            guard.iter().map(|l| l.callback.clone()).collect()
        };
        for callback in snapshot {
            callback(value);
        }
    }

    /// Appends every listener from `other` onto `self`, preserving order.
    /// Used when a new task's callbacks are folded into an in-flight one by
    /// the coalescer.
    pub fn merge_from(&self, other: &MulticastDelegate<T>) {
        let mut incoming = other.listeners.lock();
        self.listeners.lock().extend(incoming.drain(..));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn invokes_in_registration_order() {
        let delegate: MulticastDelegate<i32> = MulticastDelegate::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        delegate.add_detached(move |v| o1.lock().push((*v, 1)));
        delegate.add_detached(move |v| o2.lock().push((*v, 2)));
        delegate.invoke(&7);
        assert_eq!(*order.lock(), vec![(7, 1), (7, 2)]);
    }

    #[test]
    fn dead_target_is_pruned() {
        let delegate: MulticastDelegate<i32> = MulticastDelegate::new();
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let target = Arc::new(());
            let calls2 = calls.clone();
            delegate.add(&target, move |_| {
                calls2.fetch_add(1, Ordering::SeqCst);
            });
            delegate.invoke(&1);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
        // target dropped here
        delegate.invoke(&2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_listener_stops_firing() {
        let delegate: MulticastDelegate<i32> = MulticastDelegate::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let target = Arc::new(());
        let calls2 = calls.clone();
        delegate.add(&target, move |_| {
            calls2.fetch_add(1, Ordering::SeqCst);
        });
        delegate.remove(&target);
        delegate.invoke(&1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn merge_from_preserves_order() {
        let a: MulticastDelegate<i32> = MulticastDelegate::new();
        let b: MulticastDelegate<i32> = MulticastDelegate::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        a.add_detached(move |v| o1.lock().push((*v, "a")));
        b.add_detached(move |v| o2.lock().push((*v, "b")));
        a.merge_from(&b);
        a.invoke(&1);
        assert_eq!(*order.lock(), vec![(1, "a"), (1, "b")]);
    }

    #[test]
    fn is_empty_reflects_dead_targets() {
        let delegate: MulticastDelegate<i32> = MulticastDelegate::new();
        assert!(delegate.is_empty());
        {
            let target = Arc::new(());
            delegate.add(&target, |_| {});
            assert!(!delegate.is_empty());
        }
        assert!(delegate.is_empty());
    }
}
