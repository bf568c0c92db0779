//! Scoped access to the producer and consumer slots of a [`SpscData`].
//!
//! A scope claims its role on construction and gives it back on drop. Because
//! the release lives in `Drop`, it also runs on early return and on panic
//! unwind, so a role can never be leaked by the caller.
use std::marker::PhantomData;

use super::store::SpscData;

/// What a [`ReadScope`] got when it was opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Another read scope was alive; nothing was touched.
    Denied,
    /// Read access was acquired but the producer has not committed since the
    /// previous poll.
    Stale,
    /// A newly committed value is available through [`ReadScope::get`].
    Fresh,
}

/// RAII guard over the producer slot.
///
/// Dropping a valid scope commits the slot, even when it was not modified,
/// and then releases write access.
///
/// # Example
///
/// ```rust
/// use spsc_data::sync::store::SpscData;
///
/// let data = SpscData::<[u8; 4]>::new();
/// {
///     let mut scope = data.write();
///     assert!(scope.is_valid());
///     if let Some(buf) = scope.get_mut() {
///         buf[0] = 42;
///     }
/// } // published here
///
/// assert_eq!(data.read().get(), Some(&[42, 0, 0, 0]));
/// ```
pub struct WriteScope<'a, T> {
    store: Option<&'a SpscData<T>>,
    _not_sync: PhantomData<*const T>,
}

/// # Safety
///
/// Moving a scope to another thread moves the exclusive write role with it;
/// the flag it holds keeps every other writer out. `T: Send` because the value
/// is mutated from whichever thread the scope ends up on.
unsafe impl<T: Send> Send for WriteScope<'_, T> {}

impl<'a, T> WriteScope<'a, T> {
    /// Tries to claim write access on `store`.
    ///
    /// If a write scope is already alive, on this thread or any other, the
    /// returned scope is invalid: it exposes nothing and its drop does nothing.
    pub fn new(store: &'a SpscData<T>) -> Self {
        Self {
            store: store.try_begin_write().then_some(store),
            _not_sync: PhantomData,
        }
    }

    /// Whether write access was acquired.
    pub fn is_valid(&self) -> bool {
        self.store.is_some()
    }

    /// Shared view of the producer slot.
    pub fn get(&self) -> Option<&T> {
        // safety: holding write access makes the producer slot ours alone
        self.store.map(|store| unsafe { &*store.producer_value() })
    }

    /// Mutable view of the producer slot, for in-place updates.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        // safety: holding write access makes the producer slot ours alone, and
        //         `&mut self` rules out another borrow through this scope
        self.store.map(|store| unsafe { &mut *store.producer_value() })
    }

    /// Overwrites the producer slot. Returns `false` on an invalid scope.
    pub fn set(&mut self, value: T) -> bool {
        match self.get_mut() {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

impl<T> Drop for WriteScope<'_, T> {
    fn drop(&mut self) {
        if let Some(store) = self.store.take() {
            store.commit();
            store.end_write();
        }
    }
}

/// RAII guard over the consumer slot.
///
/// Opening the scope polls the store. The value is only exposed when the poll
/// found a fresh commit, and only as a shared reference: the slot goes back
/// into rotation on the next poll, so the consumer must never modify it.
///
/// # Example
///
/// ```rust
/// use spsc_data::sync::scope::ReadOutcome;
/// use spsc_data::sync::store::SpscData;
///
/// let data = SpscData::<i32>::new();
/// assert_eq!(data.read().outcome(), ReadOutcome::Stale);
///
/// data.write().set(3);
///
/// let scope = data.read();
/// assert_eq!(scope.outcome(), ReadOutcome::Fresh);
/// assert_eq!(scope.get(), Some(&3));
/// assert_eq!(data.read().outcome(), ReadOutcome::Denied);
/// ```
pub struct ReadScope<'a, T> {
    store: Option<&'a SpscData<T>>,
    fresh: bool,
    _not_sync: PhantomData<*const T>,
}

/// # Safety
///
/// Same reasoning as for [`WriteScope`]: the consumer role travels with the
/// scope and the flag it holds keeps every other reader out.
unsafe impl<T: Send> Send for ReadScope<'_, T> {}

impl<'a, T> ReadScope<'a, T> {
    /// Tries to claim read access on `store` and, if that worked, fetches.
    pub fn new(store: &'a SpscData<T>) -> Self {
        let store = store.try_begin_read().then_some(store);
        let fresh = store.is_some_and(|s| s.fetch());
        Self {
            store,
            fresh,
            _not_sync: PhantomData,
        }
    }

    /// Whether read access was acquired, regardless of freshness.
    pub fn is_valid(&self) -> bool {
        self.store.is_some()
    }

    /// Whether a new value is available.
    pub fn has_data(&self) -> bool {
        self.fresh
    }

    pub fn outcome(&self) -> ReadOutcome {
        match (self.store.is_some(), self.fresh) {
            (false, _) => ReadOutcome::Denied,
            (true, false) => ReadOutcome::Stale,
            (true, true) => ReadOutcome::Fresh,
        }
    }

    /// The newly fetched value, if any.
    pub fn get(&self) -> Option<&T> {
        if !self.fresh {
            return None;
        }
        // safety: holding read access makes the consumer slot ours alone until
        //         the next fetch, which needs this scope to be gone
        self.store.map(|store| unsafe { &*store.consumer_value() })
    }
}

impl<T> Drop for ReadScope<'_, T> {
    fn drop(&mut self) {
        if let Some(store) = self.store.take() {
            store.end_read();
        }
    }
}
