//! Copy-in/copy-out state cells shared between worker threads and callers.
//!
//! Writers mutate through a closure while the lock is held; readers get an
//! owned clone. Neither side may block on I/O inside the closure.

use crate::lock_or_recover;
use std::sync::Mutex;

pub struct SharedState<T> {
    inner: Mutex<T>,
    label: &'static str,
}

impl<T> SharedState<T> {
    pub fn new(label: &'static str, value: T) -> Self {
        Self {
            inner: Mutex::new(value),
            label,
        }
    }

    /// Run `f` against the guarded value and return its result.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = lock_or_recover(&self.inner, self.label);
        f(&mut guard)
    }

    /// Read a projection of the guarded value without cloning all of it.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = lock_or_recover(&self.inner, self.label);
        f(&guard)
    }
}

impl<T: Clone> SharedState<T> {
    pub fn snapshot(&self) -> T {
        self.read(T::clone)
    }
}
