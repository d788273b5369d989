use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{self, AtomicU8, Ordering};

/// A single slot of a submap.
///
/// A bucket moves through exactly three states over its lifetime:
///
/// - `EMPTY`: no entry has been written.
/// - `BUSY`: a writer won the claim and is writing the entry.
/// - `VALID`: the entry is published and immutable.
///
/// `VALID` is terminal. The payload is well-defined only after observing
/// `VALID` with acquire ordering.
pub(crate) struct Bucket<K, V> {
    /// The lifecycle state of this slot.
    state: AtomicU8,

    /// The entry payload, initialized by the claiming writer.
    entry: UnsafeCell<MaybeUninit<(K, V)>>,
}

// The bucket does not contain an entry.
const EMPTY: u8 = 0;

// An entry is being written.
const BUSY: u8 = 1;

// The bucket contains a published entry.
const VALID: u8 = 2;

/// The outcome of probing a bucket during a read.
pub(crate) enum ReadSlot<'a, K, V> {
    /// The bucket holds the entry for the probed key.
    Found(&'a (K, V)),

    /// The bucket is empty, so the key is absent at this position of the
    /// probe sequence.
    Empty,

    /// The bucket is busy, or holds a different key.
    Continue,
}

impl<K, V> Bucket<K, V> {
    pub(crate) fn new() -> Bucket<K, V> {
        Bucket {
            state: AtomicU8::new(EMPTY),
            entry: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Loads the raw state without synchronization.
    #[inline]
    fn state(&self) -> u8 {
        self.state.load(Ordering::Relaxed)
    }

    /// Attempts to move the bucket from `EMPTY` to `BUSY`, granting the
    /// caller exclusive write access on success.
    ///
    /// The claim itself needs no ordering: publication happens through the
    /// `VALID` release store in [`commit`](Bucket::commit).
    #[inline]
    pub(crate) fn try_claim(&self) -> bool {
        self.state
            .compare_exchange(EMPTY, BUSY, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Writes the entry and publishes the bucket as `VALID`.
    ///
    /// # Safety
    ///
    /// The caller must have claimed this bucket via a successful
    /// [`try_claim`](Bucket::try_claim) and must call `commit` exactly once.
    #[inline]
    pub(crate) unsafe fn commit(&self, key: K, value: V) -> &(K, V) {
        // Safety: The bucket is `BUSY` and we are the claiming thread, so no
        // other thread reads or writes the payload.
        let slot = unsafe { &mut *self.entry.get() };
        let entry = slot.write((key, value));

        // Publish the payload. Readers that observe `VALID` and issue an
        // acquire fence see the fully written entry.
        self.state.store(VALID, Ordering::Release);

        entry
    }

    /// Probes this bucket for `key`.
    #[inline]
    pub(crate) fn read(&self, key: &K) -> ReadSlot<'_, K, V>
    where
        K: Eq,
    {
        match self.state() {
            EMPTY => ReadSlot::Empty,
            VALID => {
                atomic::fence(Ordering::Acquire);

                // Safety: The bucket is `VALID`, the payload was published by
                // the release store in `commit`, and the acquire fence above
                // synchronizes with it. Entries are never modified once valid.
                let entry = unsafe { (*self.entry.get()).assume_init_ref() };
                if entry.0 == *key {
                    ReadSlot::Found(entry)
                } else {
                    ReadSlot::Continue
                }
            }
            _ => ReadSlot::Continue,
        }
    }

    /// Returns the entry if the bucket is valid, without comparing keys.
    ///
    /// Used by iteration, which visits every bucket once.
    #[inline]
    pub(crate) fn entry_if_valid(&self) -> Option<&(K, V)> {
        if self.state() != VALID {
            return None;
        }

        atomic::fence(Ordering::Acquire);

        // Safety: `VALID` observed, acquire fence issued; see `read`.
        Some(unsafe { (*self.entry.get()).assume_init_ref() })
    }

    /// Re-checks whether this bucket became valid with an entry for `key`.
    ///
    /// Called after a failed claim. Reloading the state here catches the
    /// race where another thread published the same key while we were
    /// preparing to write, which keeps duplicates rare.
    #[inline]
    pub(crate) fn read_after_claim_failed(&self, key: &K) -> Option<&(K, V)>
    where
        K: Eq,
    {
        match self.read(key) {
            ReadSlot::Found(entry) => Some(entry),
            _ => None,
        }
    }
}

// Safety: A bucket hands out `&(K, V)` to any thread that observes `VALID`,
// and the owning thread drops the payload, so both `Send` and `Sync` of the
// entry types are required.
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for Bucket<K, V> {}
unsafe impl<K: Send, V: Send> Send for Bucket<K, V> {}

impl<K, V> Drop for Bucket<K, V> {
    fn drop(&mut self) {
        if *self.state.get_mut() == VALID {
            // Safety: The bucket is valid, so the payload was initialized,
            // and `&mut self` means no concurrent readers exist.
            unsafe { self.entry.get_mut().assume_init_drop() };
        }
    }
}
