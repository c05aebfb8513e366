//! Subscribable state container
//!
//! Backed by a `tokio::sync::watch` channel: any number of readers may
//! subscribe, writes go through `replace`/`update`, which are crate-private
//! so only the dispatcher and the store can mutate.

use tokio::sync::watch;

/// Typed container with subscribe/update semantics
#[derive(Debug)]
pub struct Registry<T> {
    tx: watch::Sender<T>,
}

impl<T> Registry<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// New receiver; sees the current value and every later write
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Read the current value without cloning.
    ///
    /// Holds a read lock: do not keep the guard across a write to the
    /// same registry.
    pub fn borrow(&self) -> watch::Ref<'_, T> {
        self.tx.borrow()
    }

    /// Replace the whole value, notifying subscribers. Returns the old value.
    pub(crate) fn replace(&self, value: T) -> T {
        self.tx.send_replace(value)
    }

    /// Modify in place, notifying subscribers
    pub(crate) fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }
}

impl<T: Clone> Registry<T> {
    /// Clone of the current value
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }
}

impl<T: Default> Default for Registry<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
