use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::{BuildHasher, Hash};

use crate::error::Error;
use crate::raw::{self, LazyValue, Table};

/// An almost lock-free concurrent map for memoization.
///
/// The map supports only [`get`](MemoMap::get), insert-or-get (via
/// [`insert`](MemoMap::insert) and [`insert_with`](MemoMap::insert_with))
/// and iteration. Entries are immutable once published and are never
/// erased, which is what lets readers share them without locks: a reference
/// returned by `get` stays valid for as long as the map is borrowed.
///
/// Duplicate keys are avoided but their total absence is not guaranteed:
/// two threads racing on the same key may transiently publish it twice.
/// This is harmless as long as equal keys always map to equal values, which
/// is the contract memoized computations satisfy by construction.
///
/// Two independent hash function families drive double-hashed open
/// addressing; the defaults pair the standard library's [`RandomState`]
/// with [`ahash::RandomState`].
///
/// # Examples
///
/// ```
/// use memodag::MemoMap;
///
/// let map: MemoMap<u64, u64> = MemoMap::new();
/// map.insert(1, 10).unwrap();
///
/// let (value, inserted) = map.insert_with(&2, |_| 20).unwrap();
/// assert_eq!((value, inserted), (&20, true));
///
/// assert_eq!(map.get(&1), Some(&10));
/// assert_eq!(map.len(), 2);
/// ```
pub struct MemoMap<K, V, S1 = RandomState, S2 = ahash::RandomState> {
    raw: Table<K, V>,
    hash_builder1: S1,
    hash_builder2: S2,
}

// Safety: Insertion moves keys and values in from the calling thread and
// the map drops them wherever it is dropped, so `Sync` additionally
// requires `Send` of both. Shared references to entries are handed out to
// any thread holding `&MemoMap`.
unsafe impl<K: Send, V: Send, S1: Send, S2: Send> Send for MemoMap<K, V, S1, S2> {}
unsafe impl<K: Send + Sync, V: Send + Sync, S1: Sync, S2: Sync> Sync for MemoMap<K, V, S1, S2> {}

/// A builder for a [`MemoMap`].
///
/// # Examples
///
/// ```
/// use memodag::MemoMap;
///
/// let map: MemoMap<u64, u64> = MemoMap::builder()
///     // Size the first submap for an expected entry count.
///     .estimated_entries(1 << 20)
///     // Submaps report themselves overloaded beyond this load factor.
///     .max_load_factor(0.6)
///     // Cap the number of submaps the map may grow to.
///     .max_submaps(64)
///     .build()
///     .unwrap();
/// # let _ = map;
/// ```
pub struct MemoMapBuilder<K, V, S1 = RandomState, S2 = ahash::RandomState> {
    estimated_entries: usize,
    max_load_factor: f64,
    max_submaps: usize,
    hash_builder1: S1,
    hash_builder2: S2,
    _kv: std::marker::PhantomData<(K, V)>,
}

impl<K, V, S1, S2> MemoMapBuilder<K, V, S1, S2> {
    /// Set the expected number of entries. The first submap is sized so
    /// that this many entries fit below the maximum load factor.
    pub fn estimated_entries(mut self, estimated_entries: usize) -> Self {
        self.estimated_entries = estimated_entries;
        self
    }

    /// Set the maximum load factor of each submap. Must lie in the open
    /// interval `(0, 1)`.
    pub fn max_load_factor(mut self, max_load_factor: f64) -> Self {
        self.max_load_factor = max_load_factor;
        self
    }

    /// Set the maximum number of submaps. Must be at least 1. Inserting
    /// beyond what this many submaps can hold fails with
    /// [`Error::CapacityExceeded`].
    pub fn max_submaps(mut self, max_submaps: usize) -> Self {
        self.max_submaps = max_submaps;
        self
    }

    /// Set the first hash function family.
    pub fn hasher1<T>(self, hash_builder: T) -> MemoMapBuilder<K, V, T, S2> {
        MemoMapBuilder {
            estimated_entries: self.estimated_entries,
            max_load_factor: self.max_load_factor,
            max_submaps: self.max_submaps,
            hash_builder1: hash_builder,
            hash_builder2: self.hash_builder2,
            _kv: std::marker::PhantomData,
        }
    }

    /// Set the second hash function family.
    ///
    /// Double hashing relies on the two families being statistically
    /// independent; do not pass the same family as
    /// [`hasher1`](MemoMapBuilder::hasher1).
    pub fn hasher2<T>(self, hash_builder: T) -> MemoMapBuilder<K, V, S1, T> {
        MemoMapBuilder {
            estimated_entries: self.estimated_entries,
            max_load_factor: self.max_load_factor,
            max_submaps: self.max_submaps,
            hash_builder1: self.hash_builder1,
            hash_builder2: hash_builder,
            _kv: std::marker::PhantomData,
        }
    }

    /// Construct the [`MemoMap`], validating the configuration.
    pub fn build(self) -> Result<MemoMap<K, V, S1, S2>, Error<K>> {
        if !(self.max_load_factor > 0.0 && self.max_load_factor < 1.0) {
            return Err(Error::InvalidConfig(
                "the maximum load factor must lie in (0, 1)",
            ));
        }

        if self.max_submaps < 1 {
            return Err(Error::InvalidConfig(
                "the maximum number of submaps must be at least 1",
            ));
        }

        Ok(MemoMap {
            raw: Table::new(
                self.estimated_entries,
                self.max_load_factor,
                self.max_submaps,
            ),
            hash_builder1: self.hash_builder1,
            hash_builder2: self.hash_builder2,
        })
    }
}

impl<K, V> MemoMap<K, V> {
    /// Creates an empty `MemoMap` with default configuration.
    pub fn new() -> MemoMap<K, V> {
        MemoMap::with_estimated_entries(0)
    }

    /// Creates an empty `MemoMap` sized for an expected number of entries.
    pub fn with_estimated_entries(estimated_entries: usize) -> MemoMap<K, V> {
        MemoMap {
            raw: Table::new(
                estimated_entries,
                raw::utils::DEFAULT_MAX_LOAD_FACTOR,
                raw::utils::DEFAULT_MAX_SUBMAPS,
            ),
            hash_builder1: RandomState::new(),
            hash_builder2: ahash::RandomState::new(),
        }
    }

    /// Returns a builder for a `MemoMap`.
    pub fn builder() -> MemoMapBuilder<K, V> {
        MemoMapBuilder {
            estimated_entries: 0,
            max_load_factor: raw::utils::DEFAULT_MAX_LOAD_FACTOR,
            max_submaps: raw::utils::DEFAULT_MAX_SUBMAPS,
            hash_builder1: RandomState::new(),
            hash_builder2: ahash::RandomState::new(),
            _kv: std::marker::PhantomData,
        }
    }
}

impl<K, V, S1, S2> Default for MemoMap<K, V, S1, S2>
where
    S1: Default + BuildHasher,
    S2: Default + BuildHasher,
{
    fn default() -> Self {
        MemoMap {
            raw: Table::new(
                0,
                raw::utils::DEFAULT_MAX_LOAD_FACTOR,
                raw::utils::DEFAULT_MAX_SUBMAPS,
            ),
            hash_builder1: S1::default(),
            hash_builder2: S2::default(),
        }
    }
}

impl<K, V, S1, S2> MemoMap<K, V, S1, S2> {
    /// Returns the number of entries in the map.
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Returns `true` if the map is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// An iterator over the entries of the map.
    ///
    /// The iterator is never invalidated by concurrent insertions; entries
    /// published while iterating may or may not be observed. Each valid
    /// bucket is visited exactly once.
    ///
    /// # Examples
    ///
    /// ```
    /// use memodag::MemoMap;
    ///
    /// let map: MemoMap<u32, u32> = MemoMap::new();
    /// map.insert(1, 2).unwrap();
    /// map.insert(3, 4).unwrap();
    ///
    /// let mut entries: Vec<(u32, u32)> = map.iter().map(|(&k, &v)| (k, v)).collect();
    /// entries.sort_unstable();
    /// assert_eq!(entries, [(1, 2), (3, 4)]);
    /// ```
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            table: &self.raw,
            submap_index: 0,
            bucket_index: 0,
        }
    }

    /// Returns statistics about the map's submaps, useful for debugging
    /// and benchmarking.
    ///
    /// # Examples
    ///
    /// ```
    /// use memodag::MemoMap;
    ///
    /// let map: MemoMap<u32, u32> = MemoMap::new();
    /// map.insert(1, 1).unwrap();
    ///
    /// let stats = map.stats();
    /// assert_eq!(stats.num_entries, 1);
    /// assert_eq!(stats.num_submaps, 1);
    /// ```
    pub fn stats(&self) -> MapStats {
        let num_submaps = self.raw.num_submaps();
        let submaps = (0..num_submaps)
            .map(|index| {
                let submap = self.raw.submap(index);
                SubmapStats {
                    capacity: submap.capacity(),
                    len: submap.len(),
                    load_factor: submap.len() as f64 / submap.capacity() as f64,
                }
            })
            .collect();

        MapStats {
            num_entries: self.len(),
            num_submaps,
            submaps,
        }
    }

    pub(crate) fn hasher1(&self) -> &S1 {
        &self.hash_builder1
    }
}

impl<K, V, S1, S2> MemoMap<K, V, S1, S2>
where
    K: Hash + Eq,
    S1: BuildHasher,
    S2: BuildHasher,
{
    #[inline]
    fn hashes(&self, key: &K) -> (u64, u64) {
        (
            self.hash_builder1.hash_one(key),
            self.hash_builder2.hash_one(key),
        )
    }

    /// Returns a reference to the value for `key`, if present.
    ///
    /// When the same key was transiently duplicated by racing inserts, the
    /// latest-discovered occurrence is returned; by the map's contract both
    /// hold equal values.
    ///
    /// # Examples
    ///
    /// ```
    /// use memodag::MemoMap;
    ///
    /// let map: MemoMap<u32, &str> = MemoMap::new();
    /// map.insert(1, "a").unwrap();
    ///
    /// assert_eq!(map.get(&1), Some(&"a"));
    /// assert_eq!(map.get(&2), None);
    /// ```
    #[inline]
    pub fn get(&self, key: &K) -> Option<&V> {
        let (h1, h2) = self.hashes(key);
        self.raw.find(key, h1, h2).map(|entry| &entry.1)
    }

    /// Returns `true` if the map contains a value for `key`.
    #[inline]
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Inserts an entry for `key` unless one already exists, producing the
    /// value on demand.
    ///
    /// `compute` runs at most once, and only when an empty slot for the key
    /// was actually found; when another thread got there first the resident
    /// value is returned instead. Returns the resident value and whether
    /// this call inserted it.
    ///
    /// # Examples
    ///
    /// ```
    /// use memodag::MemoMap;
    ///
    /// let map: MemoMap<&str, usize> = MemoMap::new();
    /// assert_eq!(map.insert_with(&"a", |_| 1).unwrap(), (&1, true));
    /// // The resident entry wins; the closure is not invoked.
    /// assert_eq!(map.insert_with(&"a", |_| 2).unwrap(), (&1, false));
    /// ```
    pub fn insert_with<F>(&self, key: &K, compute: F) -> Result<(&V, bool), Error<K>>
    where
        K: Clone,
        F: FnMut(&K) -> V,
    {
        let (h1, h2) = self.hashes(key);
        let mut compute = compute;
        let mut value = LazyValue::new(&mut compute);
        self.raw.insert(key, h1, h2, &mut value)
    }

    /// Inserts an already-computed entry unless the key is present.
    ///
    /// Returns `true` if the entry was inserted by this call.
    ///
    /// # Examples
    ///
    /// ```
    /// use memodag::MemoMap;
    ///
    /// let map: MemoMap<u32, u32> = MemoMap::new();
    /// assert!(map.insert(1, 10).unwrap());
    ///
    /// // Entries are immutable; a later insert for the same key loses.
    /// assert!(!map.insert(1, 11).unwrap());
    /// assert_eq!(map.get(&1), Some(&10));
    /// ```
    pub fn insert(&self, key: K, value: V) -> Result<bool, Error<K>>
    where
        K: Clone,
        V: Clone,
    {
        let mut produce = |_: &K| value.clone();
        let (h1, h2) = self.hashes(&key);
        let mut lazy = LazyValue::new(&mut produce);
        let (_, inserted) = self.raw.insert(&key, h1, h2, &mut lazy)?;
        Ok(inserted)
    }

    /// Returns a new map holding the entries for which `pred` returns
    /// `true`.
    ///
    /// The copy is sized to the current entry count and implicitly strips
    /// transient duplicates. Concurrent insertions during the copy may or
    /// may not be picked up; the result reflects whatever was published at
    /// visit time.
    ///
    /// # Examples
    ///
    /// ```
    /// use memodag::MemoMap;
    ///
    /// let map: MemoMap<u32, u32> = MemoMap::new();
    /// for key in 0..10 {
    ///     map.insert(key, key).unwrap();
    /// }
    ///
    /// let even = map.filter(|&key, _| key % 2 == 0).unwrap();
    /// assert_eq!(even.len(), 5);
    /// ```
    pub fn filter<P>(&self, mut pred: P) -> Result<Self, Error<K>>
    where
        K: Clone,
        V: Clone,
        S1: Clone,
        S2: Clone,
        P: FnMut(&K, &V) -> bool,
    {
        let filtered = MemoMapBuilder {
            estimated_entries: self.len(),
            max_load_factor: self.raw.max_load_factor(),
            max_submaps: self.raw.max_submaps(),
            hash_builder1: self.hash_builder1.clone(),
            hash_builder2: self.hash_builder2.clone(),
            _kv: std::marker::PhantomData,
        }
        .build()?;

        for (key, value) in self.iter() {
            if pred(key, value) {
                filtered.insert(key.clone(), value.clone())?;
            }
        }

        Ok(filtered)
    }

    /// Returns a deep copy of the map.
    ///
    /// The copy can hold fewer entries than [`len`](MemoMap::len) reports
    /// on the original, since duplicate occurrences of a key collapse into
    /// one.
    pub fn try_clone(&self) -> Result<Self, Error<K>>
    where
        K: Clone,
        V: Clone,
        S1: Clone,
        S2: Clone,
    {
        self.filter(|_, _| true)
    }
}

impl<K, V, S1, S2> fmt::Debug for MemoMap<K, V, S1, S2>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S1, S2> PartialEq for MemoMap<K, V, S1, S2>
where
    K: Hash + Eq,
    V: PartialEq,
    S1: BuildHasher,
    S2: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.iter().all(|(key, value)| other.get(key) == Some(value))
            && other.iter().all(|(key, value)| self.get(key) == Some(value))
    }
}

impl<K, V, S1, S2> Eq for MemoMap<K, V, S1, S2>
where
    K: Hash + Eq,
    V: Eq,
    S1: BuildHasher,
    S2: BuildHasher,
{
}

impl<'m, K, V, S1, S2> IntoIterator for &'m MemoMap<K, V, S1, S2> {
    type Item = (&'m K, &'m V);
    type IntoIter = Iter<'m, K, V>;

    fn into_iter(self) -> Iter<'m, K, V> {
        self.iter()
    }
}

/// A forward iterator over the entries of a [`MemoMap`].
///
/// Scans submaps in creation order, yielding every valid bucket once.
pub struct Iter<'m, K, V> {
    table: &'m Table<K, V>,
    submap_index: usize,
    bucket_index: usize,
}

impl<'m, K, V> Iterator for Iter<'m, K, V> {
    type Item = (&'m K, &'m V);

    fn next(&mut self) -> Option<(&'m K, &'m V)> {
        // `num_submaps` is re-read on each submap boundary, so submaps
        // published during iteration are visited too.
        while self.submap_index < self.table.num_submaps() {
            let submap = self.table.submap(self.submap_index);

            while self.bucket_index < submap.capacity() {
                let index = self.bucket_index;
                self.bucket_index += 1;

                if let Some(entry) = submap.entry(index) {
                    return Some((&entry.0, &entry.1));
                }
            }

            self.submap_index += 1;
            self.bucket_index = 0;
        }

        None
    }
}

/// Statistics for a single submap. See [`MemoMap::stats`].
#[derive(Clone, Debug)]
pub struct SubmapStats {
    /// Bucket count of the submap.
    pub capacity: usize,
    /// Number of valid buckets.
    pub len: usize,
    /// `len / capacity`.
    pub load_factor: f64,
}

/// Statistics for a [`MemoMap`]. See [`MemoMap::stats`].
#[derive(Clone, Debug)]
pub struct MapStats {
    /// Total number of inserted entries.
    pub num_entries: usize,
    /// Number of live submaps.
    pub num_submaps: usize,
    /// Per-submap statistics, in creation order.
    pub submaps: Vec<SubmapStats>,
}
