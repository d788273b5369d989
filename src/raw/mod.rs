mod bucket;
mod submap;
pub(crate) mod utils;

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::thread;

use crate::error::Error;

pub(crate) use submap::Submap;

/// A value produced on demand and memoized across probe restarts.
///
/// The segmented table may have to retry an insertion after an expansion;
/// caching the computed value here guarantees the user's compute closure
/// runs at most once per insert call.
pub(crate) struct LazyValue<'f, K, V> {
    compute: &'f mut dyn FnMut(&K) -> V,
    cached: Option<V>,
}

impl<'f, K, V> LazyValue<'f, K, V> {
    pub(crate) fn new(compute: &'f mut dyn FnMut(&K) -> V) -> LazyValue<'f, K, V> {
        LazyValue {
            compute,
            cached: None,
        }
    }

    /// Ensures the value has been computed.
    #[inline]
    pub(crate) fn force(&mut self, key: &K) {
        if self.cached.is_none() {
            self.cached = Some((self.compute)(key));
        }
    }

    /// Takes the computed value, computing it now if it was never forced.
    #[inline]
    pub(crate) fn take(&mut self, key: &K) -> V {
        match self.cached.take() {
            Some(value) => value,
            None => (self.compute)(key),
        }
    }
}

/// The segmented, append-only store backing `MemoMap`.
///
/// Submaps are published by incrementing `num_submaps` with release
/// ordering after the new submap's slot is written; readers load the count
/// with acquire ordering, so every submap below the count is fully
/// initialized. Slots above the count are null until an expansion fills
/// them, and submaps are never deallocated before the table itself drops,
/// which is what makes `&V` borrows from `find` sound.
pub(crate) struct Table<K, V> {
    /// One slot per potential submap; the prefix `[0, num_submaps)` is live.
    slots: Box<[AtomicPtr<Submap<K, V>>]>,

    /// The number of published submaps.
    num_submaps: AtomicUsize,

    /// The total number of inserted entries, across all submaps. Relaxed;
    /// statistics only.
    num_entries: AtomicUsize,

    /// Serializes expansion. Held only while allocating a new submap.
    expanding: AtomicBool,

    /// Maximum load factor handed to each submap.
    max_load_factor: f64,
}

// Clears the expansion flag even when expansion fails, so a table that ran
// out of submaps does not leave other writers spinning forever.
struct ExpandGuard<'t>(&'t AtomicBool);

impl Drop for ExpandGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<K, V> Table<K, V> {
    /// Creates a table with one submap sized for `estimated_entries`.
    pub(crate) fn new(
        estimated_entries: usize,
        max_load_factor: f64,
        max_submaps: usize,
    ) -> Table<K, V> {
        let slots: Box<[AtomicPtr<Submap<K, V>>]> = (0..max_submaps)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect();

        let capacity = utils::first_submap_capacity(estimated_entries, max_load_factor);
        let first = Box::new(Submap::new(capacity, max_load_factor));
        slots[0].store(Box::into_raw(first), Ordering::Release);

        Table {
            slots,
            num_submaps: AtomicUsize::new(1),
            num_entries: AtomicUsize::new(0),
            expanding: AtomicBool::new(false),
            max_load_factor,
        }
    }

    #[inline]
    pub(crate) fn max_submaps(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn max_load_factor(&self) -> f64 {
        self.max_load_factor
    }

    #[inline]
    pub(crate) fn num_submaps(&self) -> usize {
        self.num_submaps.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.num_entries.load(Ordering::Relaxed)
    }

    /// Returns the published submap at `index`.
    ///
    /// `index` must be below a `num_submaps` value loaded by this thread.
    #[inline]
    pub(crate) fn submap(&self, index: usize) -> &Submap<K, V> {
        let ptr = self.slots[index].load(Ordering::Acquire);

        // Safety: The slot was written before `num_submaps` was published
        // with release ordering, the caller's acquire load of the count
        // ordered the pointer read after that publication, and submaps live
        // until the table drops.
        unsafe { &*ptr }
    }

    /// Searches submaps `[0, upto]` for `key`, newest first, so the
    /// latest-discovered occurrence wins.
    fn find_upto(&self, key: &K, h1: u64, h2: u64, upto: usize) -> Option<&(K, V)>
    where
        K: Eq,
    {
        for index in (0..=upto).rev() {
            if let Some(entry) = self.submap(index).find(key, h1, h2) {
                return Some(entry);
            }
        }

        None
    }

    pub(crate) fn find(&self, key: &K, h1: u64, h2: u64) -> Option<&(K, V)>
    where
        K: Eq,
    {
        self.find_upto(key, h1, h2, self.num_submaps() - 1)
    }

    /// Inserts an entry for `key` unless one already exists, producing the
    /// value lazily. Returns the resident value and whether it was inserted
    /// by this call.
    pub(crate) fn insert<'m>(
        &'m self,
        key: &K,
        h1: u64,
        h2: u64,
        value: &mut LazyValue<'_, K, V>,
    ) -> Result<(&'m V, bool), Error<K>>
    where
        K: Eq + Clone,
    {
        loop {
            let last = self.num_submaps() - 1;

            // Every submap but the last is immutable-in-practice (only the
            // last accepts inserts), so a hit below `last` is definitive.
            if last > 0 {
                if let Some(entry) = self.find_upto(key, h1, h2, last - 1) {
                    return Ok((&entry.1, false));
                }
            }

            let submap = self.submap(last);

            if submap.is_overloaded() {
                self.expand()?;
                continue;
            }

            match submap.insert(key, h1, h2, value) {
                Some((resident, inserted)) => {
                    if inserted {
                        self.num_entries.fetch_add(1, Ordering::Relaxed);
                    }
                    return Ok((resident, inserted));
                }
                // The submap filled up under us.
                None => {
                    self.expand()?;
                    continue;
                }
            }
        }
    }

    /// Adds a new submap if the current last one is still overloaded.
    ///
    /// Single-writer: the `expanding` flag serializes expansions, and the
    /// overload re-check under the flag makes concurrent requests collapse
    /// into one allocation.
    pub(crate) fn expand(&self) -> Result<bool, Error<K>> {
        while self.expanding.swap(true, Ordering::Acquire) {
            thread::yield_now();
        }
        let _guard = ExpandGuard(&self.expanding);

        let count = self.num_submaps();
        if count == self.max_submaps() {
            return Err(Error::CapacityExceeded {
                max_submaps: self.max_submaps(),
            });
        }

        let last = self.submap(count - 1);
        if !last.is_overloaded() {
            return Ok(false);
        }

        let capacity = utils::next_submap_capacity(last.capacity());
        let submap = Box::new(Submap::new(capacity, self.max_load_factor));
        self.slots[count].store(Box::into_raw(submap), Ordering::Release);
        self.num_submaps.fetch_add(1, Ordering::Release);

        Ok(true)
    }
}

impl<K, V> Drop for Table<K, V> {
    fn drop(&mut self) {
        let count = *self.num_submaps.get_mut();
        for slot in &mut self.slots[..count] {
            let ptr = *slot.get_mut();

            // Safety: Slots below the count hold submaps allocated with
            // `Box::into_raw` and never freed elsewhere.
            drop(unsafe { Box::from_raw(ptr) });
        }
    }
}
