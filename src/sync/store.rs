//! Wait-free handoff of the latest value from one producer to one consumer.
//!
//! [`SpscData`] owns three [`Slot`]s. At any instant one of them belongs to
//! the producer, one to the consumer and one sits in the shared handoff
//! position. The producer publishes by swapping its slot into the handoff
//! position, the consumer polls by swapping its own slot in and checking the
//! tag of whatever it got back.
//!
//! ## Architecture
//!
//! ```text
//! Producer Thread                  Consumer Thread
//!     |                                |
//!     v                                v
//! WriteScope                       ReadScope
//!  (producer index)                 (consumer index)
//!     |                                |
//!     +--- commit --> shared <-- fetch-+
//!                   AtomicUsize
//!                      |
//!                      v
//!          [Slot0, Slot1, Slot2]
//! ```
//!
//! The three indices always form a permutation of `0..3`. The only operation
//! that moves a slot between roles is the `swap` on `shared`, and each role's
//! private index is only swapped by the single holder of that role.
//!
//! Intermediate values are overwritten without being seen when the producer
//! commits faster than the consumer polls. Only the most recent commit is
//! guaranteed to become visible.
//!
//! # Examples
//!
//! ```rust
//! use spsc_data::sync::store::SpscData;
//! use std::thread;
//!
//! let data = SpscData::<u64>::new();
//!
//! thread::scope(|s| {
//!     s.spawn(|| {
//!         for i in 1..=100 {
//!             let mut scope = data.write();
//!             if let Some(v) = scope.get_mut() {
//!                 *v = i;
//!             }
//!         }
//!     });
//!     s.spawn(|| {
//!         let mut last = 0;
//!         for _ in 0..100 {
//!             let scope = data.read();
//!             if let Some(v) = scope.get() {
//!                 assert!(*v > last);
//!                 last = *v;
//!             }
//!         }
//!     });
//! });
//! ```
//!
//! ## Preconditions
//!
//! The store is meant for one fixed producer thread and one fixed consumer
//! thread for its whole lifetime. The access flags turn a second concurrent
//! producer (or consumer) into a denied scope instead of a data race, and a
//! role handed to another thread between scopes stays memory safe, but the
//! latest-value semantics assume the roles do not migrate.
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::scope::{ReadScope, WriteScope};
use super::slot::{Slot, SlotState};

const PRODUCER_START: usize = 0;
const CONSUMER_START: usize = 1;
const SHARED_START: usize = 2;

/// Triple-slot store for single-producer single-consumer latest-value passing.
pub struct SpscData<T> {
    slots: [Slot<T>; 3],
    /// Index of the producer's private slot. Only touched while `writing` is held.
    producer: AtomicUsize,
    /// Index of the consumer's private slot. Only touched while `reading` is held.
    consumer: AtomicUsize,
    /// Index of the slot in the handoff position.
    shared: AtomicUsize,
    writing: AtomicBool,
    reading: AtomicBool,
}

/// # Safety
///
/// Slot contents are only reachable through a [`WriteScope`] or [`ReadScope`],
/// and each of those requires winning the matching access flag. The slot a scope
/// exposes is private to its role until the role holder swaps it into the shared
/// position, so no two threads ever alias the same value. Values do cross
/// threads, which is why `T: Send` is required.
unsafe impl<T: Send> Sync for SpscData<T> {}

impl<T: Default> SpscData<T> {
    /// Creates a store with all three slots holding `T::default()`.
    pub fn new() -> Self {
        Self::from_slots([
            Slot::new(T::default()),
            Slot::new(T::default()),
            Slot::new(T::default()),
        ])
    }
}

impl<T: Default> Default for SpscData<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> SpscData<T> {
    /// Creates a store with all three slots holding copies of `initial`.
    ///
    /// The tags still start `Invalid`, so the consumer sees nothing until the
    /// first commit.
    pub fn with_value(initial: T) -> Self {
        Self::from_slots([
            Slot::new(initial.clone()),
            Slot::new(initial.clone()),
            Slot::new(initial),
        ])
    }

    /// Clones out the latest value if one arrived since the previous poll.
    ///
    /// Returns `None` both when read access is denied and when there is no
    /// new data.
    pub fn try_latest(&self) -> Option<T> {
        self.read().get().cloned()
    }
}

impl<T> SpscData<T> {
    fn from_slots(slots: [Slot<T>; 3]) -> Self {
        Self {
            slots,
            producer: AtomicUsize::new(PRODUCER_START),
            consumer: AtomicUsize::new(CONSUMER_START),
            shared: AtomicUsize::new(SHARED_START),
            writing: AtomicBool::new(false),
            reading: AtomicBool::new(false),
        }
    }

    /// Opens a write scope. See [`WriteScope::new`].
    pub fn write(&self) -> WriteScope<'_, T> {
        WriteScope::new(self)
    }

    /// Opens a read scope. See [`ReadScope::new`].
    pub fn read(&self) -> ReadScope<'_, T> {
        ReadScope::new(self)
    }

    /// Replaces the producer slot with `value` and publishes it.
    ///
    /// Gives the value back if another write scope is alive.
    pub fn try_publish(&self, value: T) -> Result<(), T> {
        let mut scope = self.write();
        if !scope.is_valid() {
            return Err(value);
        }
        scope.set(value);
        Ok(())
    }

    /// Snapshot of the write flag.
    pub fn is_writing(&self) -> bool {
        self.writing.load(Ordering::Relaxed)
    }

    /// Snapshot of the read flag.
    pub fn is_reading(&self) -> bool {
        self.reading.load(Ordering::Relaxed)
    }

    /// Claims the producer role. A single CAS, never spins.
    pub(crate) fn try_begin_write(&self) -> bool {
        self.writing
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Gives the producer role back. Pairs with a successful `try_begin_write`.
    pub(crate) fn end_write(&self) {
        self.writing.store(false, Ordering::Release);
    }

    /// Claims the consumer role. A single CAS, never spins.
    pub(crate) fn try_begin_read(&self) -> bool {
        self.reading
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Gives the consumer role back. Pairs with a successful `try_begin_read`.
    pub(crate) fn end_read(&self) {
        self.reading.store(false, Ordering::Release);
    }

    /// Marks the producer slot `Updated` and swaps it into the shared position.
    ///
    /// Afterwards the producer owns whatever was shared before, which may be
    /// `Invalid`, an unread `Updated` or `Consumed`.
    ///
    /// Must only be called while holding write access.
    pub(crate) fn commit(&self) {
        let own = self.producer.load(Ordering::Relaxed);
        self.slots[own].mark(SlotState::Updated);
        // Release publishes the value and tag, Acquire makes the consumer's
        // last reads of the returned slot happen before we overwrite it.
        let previous = self.shared.swap(own, Ordering::AcqRel);
        self.producer.store(previous, Ordering::Relaxed);
    }

    /// Swaps the consumer slot into the shared position and checks what came
    /// back. Returns `true` and marks it `Consumed` when it was `Updated`.
    ///
    /// Must only be called while holding read access.
    pub(crate) fn fetch(&self) -> bool {
        let own = self.consumer.load(Ordering::Relaxed);
        let received = self.shared.swap(own, Ordering::AcqRel);
        self.consumer.store(received, Ordering::Relaxed);

        let slot = &self.slots[received];
        if slot.state() != SlotState::Updated {
            return false;
        }
        slot.mark(SlotState::Consumed);
        true
    }

    /// Pointer to the producer's value. Only valid while holding write access.
    pub(crate) fn producer_value(&self) -> *mut T {
        self.slots[self.producer.load(Ordering::Relaxed)].value_ptr()
    }

    /// Pointer to the consumer's value. Only valid while holding read access.
    pub(crate) fn consumer_value(&self) -> *const T {
        self.slots[self.consumer.load(Ordering::Relaxed)].value_ptr()
    }
}

impl<T> fmt::Debug for SpscData<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpscData")
            .field("shared", &self.shared.load(Ordering::Relaxed))
            .field("writing", &self.is_writing())
            .field("reading", &self.is_reading())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles<T>(data: &SpscData<T>) -> [usize; 3] {
        [
            data.producer.load(Ordering::Relaxed),
            data.consumer.load(Ordering::Relaxed),
            data.shared.load(Ordering::Relaxed),
        ]
    }

    fn assert_permutation<T>(data: &SpscData<T>) {
        let mut r = roles(data);
        r.sort_unstable();
        assert_eq!(r, [0, 1, 2], "roles are not a permutation: {:?}", roles(data));
    }

    fn write_raw(data: &SpscData<i64>, value: i64) {
        assert!(data.try_begin_write());
        // safety: write access is held
        unsafe { *data.producer_value() = value };
        data.commit();
        data.end_write();
    }

    fn fetch_raw(data: &SpscData<i64>) -> Option<i64> {
        assert!(data.try_begin_read());
        // safety: read access is held
        let out = data.fetch().then(|| unsafe { *data.consumer_value() });
        data.end_read();
        out
    }

    #[test]
    fn test_initial_roles() {
        let data = SpscData::<i64>::new();
        assert_eq!(roles(&data), [0, 1, 2]);
        for slot in &data.slots {
            assert_eq!(slot.state(), SlotState::Invalid);
        }
        assert!(!data.is_writing());
        assert!(!data.is_reading());
    }

    #[test]
    fn test_write_flag_is_exclusive() {
        let data = SpscData::<i64>::new();
        assert!(data.try_begin_write());
        assert!(data.is_writing());
        assert!(!data.try_begin_write());
        data.end_write();
        assert!(data.try_begin_write());
        data.end_write();
    }

    #[test]
    fn test_read_flag_independent_of_write_flag() {
        let data = SpscData::<i64>::new();
        assert!(data.try_begin_write());
        assert!(data.try_begin_read());
        assert!(!data.try_begin_read());
        data.end_read();
        data.end_write();
    }

    #[test]
    fn test_fetch_before_commit_is_stale() {
        let data = SpscData::<i64>::new();
        assert_eq!(fetch_raw(&data), None);
        assert_eq!(fetch_raw(&data), None);
        assert_permutation(&data);
    }

    #[test]
    fn test_commit_then_fetch() {
        let data = SpscData::<i64>::new();
        write_raw(&data, 11);
        assert_eq!(fetch_raw(&data), Some(11));
        assert_eq!(fetch_raw(&data), None);
    }

    #[test]
    fn test_last_commit_wins() {
        let data = SpscData::<i64>::new();
        write_raw(&data, 1);
        write_raw(&data, 2);
        assert_eq!(fetch_raw(&data), Some(2));
        assert_eq!(fetch_raw(&data), None);
    }

    #[test]
    fn test_commit_marks_updated_and_swaps() {
        let data = SpscData::<i64>::new();
        assert!(data.try_begin_write());
        data.commit();
        data.end_write();
        assert_eq!(roles(&data), [2, 1, 0]);
        assert_eq!(data.slots[0].state(), SlotState::Updated);
    }

    #[test]
    fn test_fetch_marks_consumed() {
        let data = SpscData::<i64>::new();
        write_raw(&data, 5);
        assert!(data.try_begin_read());
        assert!(data.fetch());
        let own = data.consumer.load(Ordering::Relaxed);
        assert_eq!(data.slots[own].state(), SlotState::Consumed);
        data.end_read();
    }

    #[test]
    fn test_roles_stay_a_permutation() {
        let data = SpscData::<i64>::new();
        // Deterministic mix of commits and fetches.
        let pattern = [true, true, false, true, false, false, true, false, true, true, true, false];
        let mut last_written = 0;
        for (i, commit) in pattern.iter().cycle().take(200).enumerate() {
            if *commit {
                last_written = i as i64;
                write_raw(&data, last_written);
            } else if let Some(v) = fetch_raw(&data) {
                assert_eq!(v, last_written);
            }
            assert_permutation(&data);
        }
    }

    #[test]
    fn test_with_value_starts_invalid() {
        let data = SpscData::with_value(9i64);
        assert_eq!(data.try_latest(), None);
        write_raw(&data, 10);
        assert_eq!(data.try_latest(), Some(10));
    }

    #[test]
    fn test_try_publish_denied_returns_value() {
        let data = SpscData::<String>::new();
        let held = data.write();
        assert!(held.is_valid());
        assert_eq!(data.try_publish("late".to_string()), Err("late".to_string()));
        drop(held);
        assert_eq!(data.try_publish("ok".to_string()), Ok(()));
        assert_eq!(data.try_latest().as_deref(), Some("ok"));
    }

    #[test]
    fn test_debug_omits_values() {
        let data = SpscData::with_value("secret");
        let shown = format!("{data:?}");
        assert!(shown.contains("SpscData"));
        assert!(!shown.contains("secret"));
    }
}
