//! Shared-state primitives.
//!
//! Every piece of mutable protocol state lives in a [`Shared`] cell: an
//! `embassy-sync` blocking mutex over a `RefCell`. Critical sections are
//! short and never call out to user code, transports or providers, so
//! re-entrant delivery (a transport that hands a reply back on the same
//! stack) never observes a held borrow.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

/// Interior-mutable state guarded by a critical section.
pub struct Shared<T> {
    inner: Mutex<CriticalSectionRawMutex, RefCell<T>>,
}

impl<T> Shared<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Run `f` with exclusive access to the state.
    ///
    /// `f` must not re-enter the same cell.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()))
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Detaches a previously registered handler, subscription or provider.
///
/// Returned by every `subscribe`/`on`/`watch` style operation. Dropping it
/// without calling [`Unsubscribe::call`] leaves the registration in place.
pub struct Unsubscribe {
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl Unsubscribe {
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Some(Box::new(teardown)),
        }
    }

    /// A handle with nothing to tear down.
    pub fn noop() -> Self {
        Self { teardown: None }
    }

    /// Run the teardown. Consumes the handle, so it runs at most once.
    pub fn call(mut self) {
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

impl core::fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("armed", &self.teardown.is_some())
            .finish()
    }
}
