use std::sync::atomic::{AtomicUsize, Ordering};

use super::bucket::{Bucket, ReadSlot};
use super::LazyValue;

/// A fixed-capacity open-addressed table of buckets.
///
/// The capacity is prime and probing uses double hashing, so a full probe
/// cycle visits every bucket exactly once. A submap never grows; when it
/// runs out of room the segmented table allocates a larger sibling.
pub(crate) struct Submap<K, V> {
    /// The bucket array. Never reallocated, so entry references handed out
    /// by `find` and `insert` stay valid for the life of the submap.
    buckets: Box<[Bucket<K, V>]>,

    /// The number of valid buckets. Relaxed; only used for load estimates.
    len: AtomicUsize,

    /// The load factor beyond which this submap reports itself overloaded.
    max_load_factor: f64,
}

impl<K, V> Submap<K, V> {
    /// Allocates a submap with `capacity` buckets. `capacity` must be prime.
    pub(crate) fn new(capacity: usize, max_load_factor: f64) -> Submap<K, V> {
        let buckets = (0..capacity).map(|_| Bucket::new()).collect();

        Submap {
            buckets,
            len: AtomicUsize::new(0),
            max_load_factor,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Returns `true` if the submap is at or beyond its maximum load factor.
    #[inline]
    pub(crate) fn is_overloaded(&self) -> bool {
        self.len() as f64 / self.capacity() as f64 >= self.max_load_factor
    }

    /// The double-hashing probe increment for `h2`, in `[1, capacity - 1]`.
    ///
    /// The capacity is prime, so any increment in that range is coprime with
    /// it and the probe sequence covers the whole table.
    #[inline]
    fn probe_increment(&self, h2: u64) -> usize {
        1 + (h2 % (self.capacity() as u64 - 1)) as usize
    }

    #[inline]
    fn start_index(&self, h1: u64) -> usize {
        (h1 % self.capacity() as u64) as usize
    }

    /// Searches this submap for `key`.
    ///
    /// Stops at the first empty bucket: an entry for `key` can only live on
    /// its probe sequence before the first hole.
    pub(crate) fn find(&self, key: &K, h1: u64, h2: u64) -> Option<&(K, V)>
    where
        K: Eq,
    {
        let start = self.start_index(h1);
        let increment = self.probe_increment(h2);
        let mut index = start;

        loop {
            match self.buckets[index].read(key) {
                ReadSlot::Found(entry) => return Some(entry),
                ReadSlot::Empty => return None,
                ReadSlot::Continue => {}
            }

            index = (index + increment) % self.capacity();
            if index == start {
                // Scanned the whole submap without a hit.
                return None;
            }
        }
    }

    /// Inserts an entry for `key`, computing the value on demand.
    ///
    /// The value is produced the first time an empty bucket is sighted and
    /// memoized in `value` by the caller, so a later restart (after this
    /// submap reports itself full) does not recompute it.
    ///
    /// Returns the resident value and whether this call inserted it, or
    /// `None` when a full probe cycle found no insertable slot.
    ///
    /// Duplicate avoidance is best-effort: after we write to a claimed
    /// bucket we do not rescan, so a racing thread may publish the same key
    /// elsewhere. Callers must guarantee equal keys map to equal values.
    pub(crate) fn insert<'m>(
        &'m self,
        key: &K,
        h1: u64,
        h2: u64,
        value: &mut LazyValue<'_, K, V>,
    ) -> Option<(&'m V, bool)>
    where
        K: Eq + Clone,
    {
        let start = self.start_index(h1);
        let increment = self.probe_increment(h2);
        let mut index = start;

        loop {
            let bucket = &self.buckets[index];

            match bucket.read(key) {
                ReadSlot::Found(entry) => return Some((&entry.1, false)),
                ReadSlot::Empty => {
                    // Compute before claiming so the bucket is not held
                    // `BUSY` for the duration of a user callback.
                    value.force(key);

                    if bucket.try_claim() {
                        // Safety: The claim succeeded, so this thread has
                        // exclusive write access and commits exactly once.
                        let entry = unsafe { bucket.commit(key.clone(), value.take(key)) };
                        self.len.fetch_add(1, Ordering::Relaxed);
                        return Some((&entry.1, true));
                    }

                    // Lost the claim. The winner may have published this
                    // very key; re-check before moving on.
                    if let Some(entry) = bucket.read_after_claim_failed(key) {
                        return Some((&entry.1, false));
                    }
                }
                ReadSlot::Continue => {}
            }

            index = (index + increment) % self.capacity();
            if index == start {
                // Full probe cycle without an insertable slot.
                return None;
            }
        }
    }

    /// Returns the valid entry at `index`, if any. Used by iteration.
    #[inline]
    pub(crate) fn entry(&self, index: usize) -> Option<&(K, V)> {
        self.buckets[index].entry_if_valid()
    }
}
