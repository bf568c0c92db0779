//! Storage unit rotated between the producer, consumer and handoff roles.
use std::cell::UnsafeCell;
use std::sync::atomic::Ordering;

use atomic_enum::atomic_enum;

/// Freshness tag carried by every [`Slot`].
///
/// Tags move `Invalid -> Updated -> Consumed -> Updated -> ...`. `Invalid` is
/// only ever seen on a slot that no producer has committed yet.
#[atomic_enum]
#[derive(PartialEq, Eq)]
pub enum SlotState {
    /// Never written.
    Invalid = 0,
    /// Committed by the producer and not yet picked up.
    Updated,
    /// Picked up by the consumer.
    Consumed,
}

/// One of the three fixed storage units of a store.
///
/// The tag is atomic only so that it can be touched through `&self`. Every
/// access happens from the thread currently holding the slot's role, and the
/// exchange on the shared index orders it across threads, so `Relaxed` is
/// enough here.
pub(crate) struct Slot<T> {
    value: UnsafeCell<T>,
    state: AtomicSlotState,
}

impl<T> Slot<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            value: UnsafeCell::new(value),
            state: AtomicSlotState::new(SlotState::Invalid),
        }
    }

    #[inline]
    pub(crate) fn state(&self) -> SlotState {
        self.state.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn mark(&self, state: SlotState) {
        self.state.store(state, Ordering::Relaxed);
    }

    /// Raw pointer to the stored value.
    ///
    /// Dereferencing is only sound for the holder of the role this slot
    /// currently plays.
    #[inline]
    pub(crate) fn value_ptr(&self) -> *mut T {
        self.value.get()
    }
}
