use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hash};
use std::panic;
use std::thread;

use crate::error::Error;
use crate::map::{MemoMap, MemoMapBuilder};
use crate::stack::WorkStack;

/// The shape of an explicit prerequisite declaration callback.
///
/// Declarations run once per discovery step and are not on the hot path,
/// so they are type-erased the way the value computation is not.
type DeclareFn<'d, K, V, S1, S2> = dyn Fn(&K, &mut PrereqGatherer<'_, K, V, S1, S2>) + Sync + 'd;

/// A parallel memoization engine for computations over a dependency DAG.
///
/// Given a root key, a `Memoizer` computes its value bottom-up: the
/// prerequisites of each key are materialized before the key itself, using
/// an explicit per-worker stack rather than recursion, so arbitrarily deep
/// dependency chains evaluate without overflowing the call stack. Results
/// are stored in a shared [`MemoMap`]; with more than one thread, workers
/// race over the same DAG and deduplicate through the map.
///
/// Prerequisites are discovered in one of two ways:
///
/// - **Dry run**: the compute callback itself is executed with a recording
///   [`PrereqProvider`] that returns default values for missing
///   prerequisites. The callback must be a pure function of its key and
///   the prerequisite values it reads, and it may run more than once per
///   key.
/// - **Explicit declaration**: a separate callback names the prerequisites
///   of a key through a [`PrereqGatherer`].
///
/// # Examples
///
/// ```
/// use memodag::Memoizer;
///
/// let memo: Memoizer<u64, u64> = Memoizer::new();
///
/// // Prerequisites are discovered by dry-running the computation.
/// let fib = memo
///     .get_or_compute(&30, |&n, prereqs| {
///         if n <= 2 {
///             1
///         } else {
///             prereqs.get(&(n - 1)) + prereqs.get(&(n - 2))
///         }
///     })
///     .unwrap();
///
/// assert_eq!(fib, 832040);
/// ```
pub struct Memoizer<K, V, S1 = RandomState, S2 = ahash::RandomState> {
    values: MemoMap<K, V, S1, S2>,
    default_num_threads: usize,
    detect_circular_dependencies: bool,
}

/// A builder for a [`Memoizer`].
///
/// # Examples
///
/// ```
/// use memodag::Memoizer;
///
/// let memo: Memoizer<u32, u32> = Memoizer::builder()
///     .default_num_threads(4)
///     .estimated_entries(1 << 16)
///     .detect_circular_dependencies(true)
///     .build()
///     .unwrap();
/// # let _ = memo;
/// ```
pub struct MemoizerBuilder<K, V, S1 = RandomState, S2 = ahash::RandomState> {
    map: MemoMapBuilder<K, V, S1, S2>,
    default_num_threads: usize,
    detect_circular_dependencies: bool,
}

impl<K, V, S1, S2> MemoizerBuilder<K, V, S1, S2> {
    /// Set the number of worker threads used when no explicit count is
    /// passed. Must be at least 1.
    pub fn default_num_threads(mut self, default_num_threads: usize) -> Self {
        self.default_num_threads = default_num_threads;
        self
    }

    /// Enable or disable circular dependency detection.
    ///
    /// Detection costs a per-worker set of stacked keys and is off by
    /// default.
    pub fn detect_circular_dependencies(mut self, detect: bool) -> Self {
        self.detect_circular_dependencies = detect;
        self
    }

    /// Set the expected number of distinct keys, used to size the value
    /// map.
    pub fn estimated_entries(mut self, estimated_entries: usize) -> Self {
        self.map = self.map.estimated_entries(estimated_entries);
        self
    }

    /// Set the maximum load factor of the value map's submaps.
    pub fn max_load_factor(mut self, max_load_factor: f64) -> Self {
        self.map = self.map.max_load_factor(max_load_factor);
        self
    }

    /// Set the maximum number of submaps of the value map.
    pub fn max_submaps(mut self, max_submaps: usize) -> Self {
        self.map = self.map.max_submaps(max_submaps);
        self
    }

    /// Set the first hash function family.
    pub fn hasher1<T>(self, hash_builder: T) -> MemoizerBuilder<K, V, T, S2> {
        MemoizerBuilder {
            map: self.map.hasher1(hash_builder),
            default_num_threads: self.default_num_threads,
            detect_circular_dependencies: self.detect_circular_dependencies,
        }
    }

    /// Set the second hash function family. It must be independent from
    /// the first.
    pub fn hasher2<T>(self, hash_builder: T) -> MemoizerBuilder<K, V, S1, T> {
        MemoizerBuilder {
            map: self.map.hasher2(hash_builder),
            default_num_threads: self.default_num_threads,
            detect_circular_dependencies: self.detect_circular_dependencies,
        }
    }

    /// Construct the [`Memoizer`], validating the configuration.
    pub fn build(self) -> Result<Memoizer<K, V, S1, S2>, Error<K>> {
        if self.default_num_threads < 1 {
            return Err(Error::InvalidConfig(
                "the default number of threads must be at least 1",
            ));
        }

        Ok(Memoizer {
            values: self.map.build()?,
            default_num_threads: self.default_num_threads,
            detect_circular_dependencies: self.detect_circular_dependencies,
        })
    }
}

impl<K, V> Memoizer<K, V> {
    /// Creates a `Memoizer` with default configuration: single-threaded
    /// evaluation, no cycle detection.
    pub fn new() -> Memoizer<K, V> {
        Memoizer {
            values: MemoMap::new(),
            default_num_threads: 1,
            detect_circular_dependencies: false,
        }
    }

    /// Creates a `Memoizer` whose value map is sized for an expected
    /// number of distinct keys.
    pub fn with_estimated_entries(estimated_entries: usize) -> Memoizer<K, V> {
        Memoizer {
            values: MemoMap::with_estimated_entries(estimated_entries),
            default_num_threads: 1,
            detect_circular_dependencies: false,
        }
    }

    /// Returns a builder for a `Memoizer`.
    pub fn builder() -> MemoizerBuilder<K, V> {
        MemoizerBuilder {
            map: MemoMap::builder(),
            default_num_threads: 1,
            detect_circular_dependencies: false,
        }
    }
}

impl<K, V> Default for Memoizer<K, V> {
    fn default() -> Self {
        Memoizer::new()
    }
}

impl<K, V, S1, S2> Memoizer<K, V, S1, S2> {
    /// The number of worker threads used when no explicit count is passed.
    pub fn default_num_threads(&self) -> usize {
        self.default_num_threads
    }

    /// Sets the default number of worker threads. Fails with
    /// [`Error::InvalidConfig`] when `default_num_threads` is zero.
    ///
    /// Configuration setters take `&mut self`, so they cannot race an
    /// in-progress evaluation.
    pub fn set_default_num_threads(&mut self, default_num_threads: usize) -> Result<(), Error<K>> {
        if default_num_threads < 1 {
            return Err(Error::InvalidConfig(
                "the default number of threads must be at least 1",
            ));
        }

        self.default_num_threads = default_num_threads;
        Ok(())
    }

    /// Whether circular dependency detection is enabled.
    pub fn detect_circular_dependencies(&self) -> bool {
        self.detect_circular_dependencies
    }

    /// Enables or disables circular dependency detection.
    pub fn set_detect_circular_dependencies(&mut self, detect: bool) {
        self.detect_circular_dependencies = detect;
    }

    /// Read access to the underlying value map, for iteration, statistics
    /// or reconstruction walks over already-computed results.
    ///
    /// # Examples
    ///
    /// ```
    /// use memodag::Memoizer;
    ///
    /// let memo: Memoizer<u32, u32> = Memoizer::new();
    /// memo.get_or_compute(&4, |&n, p| if n == 0 { 1 } else { n * p.get(&(n - 1)) })
    ///     .unwrap();
    ///
    /// // Every intermediate factorial is memoized.
    /// assert_eq!(memo.values().len(), 5);
    /// assert_eq!(memo.values().get(&3), Some(&6));
    /// ```
    pub fn values(&self) -> &MemoMap<K, V, S1, S2> {
        &self.values
    }
}

impl<K, V, S1, S2> Memoizer<K, V, S1, S2>
where
    K: Hash + Eq,
    S1: BuildHasher,
    S2: BuildHasher,
{
    /// Returns the memoized value for `key` without computing anything.
    ///
    /// Fails with [`Error::NotMemoized`] when the key has not been
    /// evaluated yet.
    ///
    /// # Examples
    ///
    /// ```
    /// use memodag::{Error, Memoizer};
    ///
    /// let memo: Memoizer<u32, u32> = Memoizer::new();
    /// assert!(matches!(memo.get(&3), Err(Error::NotMemoized)));
    ///
    /// memo.get_or_compute(&3, |&n, p| if n == 0 { 0 } else { n + p.get(&(n - 1)) })
    ///     .unwrap();
    /// assert_eq!(memo.get(&3).unwrap(), 6);
    /// ```
    pub fn get(&self, key: &K) -> Result<V, Error<K>>
    where
        V: Clone,
    {
        self.values.get(key).cloned().ok_or(Error::NotMemoized)
    }
}

impl<K, V, S1, S2> Memoizer<K, V, S1, S2>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Clone + Default + Send + Sync,
    S1: BuildHasher + Clone + Sync,
    S2: BuildHasher + Sync,
{
    /// Computes (or fetches) the value for `key`, discovering
    /// prerequisites by dry-running `compute`, using the default number of
    /// threads.
    pub fn get_or_compute<C>(&self, key: &K, compute: C) -> Result<V, Error<K>>
    where
        C: Fn(&K, &mut PrereqProvider<'_, K, V, S1, S2>) -> V + Sync,
    {
        self.evaluate(key, &compute, None, self.default_num_threads)
    }

    /// Like [`get_or_compute`](Memoizer::get_or_compute), with an explicit
    /// thread count.
    pub fn get_or_compute_threads<C>(
        &self,
        key: &K,
        compute: C,
        num_threads: usize,
    ) -> Result<V, Error<K>>
    where
        C: Fn(&K, &mut PrereqProvider<'_, K, V, S1, S2>) -> V + Sync,
    {
        self.evaluate(key, &compute, None, num_threads)
    }

    /// Computes (or fetches) the value for `key`, discovering
    /// prerequisites through the explicit `declare` callback, using the
    /// default number of threads.
    ///
    /// `declare` must name every key whose value `compute` will read;
    /// `compute` then runs exactly when all of them are available.
    ///
    /// # Examples
    ///
    /// ```
    /// use memodag::Memoizer;
    ///
    /// let memo: Memoizer<u32, u32> = Memoizer::new();
    /// let value = memo
    ///     .get_or_compute_declared(
    ///         &200,
    ///         |&n, prereqs| if n == 0 { 0 } else { 1 + prereqs.get(&(n - 1)) },
    ///         |&n, deps| {
    ///             if n != 0 {
    ///                 deps.declare(&(n - 1));
    ///             }
    ///         },
    ///     )
    ///     .unwrap();
    ///
    /// assert_eq!(value, 200);
    /// ```
    pub fn get_or_compute_declared<C, D>(
        &self,
        key: &K,
        compute: C,
        declare: D,
    ) -> Result<V, Error<K>>
    where
        C: Fn(&K, &mut PrereqProvider<'_, K, V, S1, S2>) -> V + Sync,
        D: Fn(&K, &mut PrereqGatherer<'_, K, V, S1, S2>) + Sync,
    {
        self.evaluate(key, &compute, Some(&declare), self.default_num_threads)
    }

    /// Like [`get_or_compute_declared`](Memoizer::get_or_compute_declared),
    /// with an explicit thread count.
    pub fn get_or_compute_declared_threads<C, D>(
        &self,
        key: &K,
        compute: C,
        declare: D,
        num_threads: usize,
    ) -> Result<V, Error<K>>
    where
        C: Fn(&K, &mut PrereqProvider<'_, K, V, S1, S2>) -> V + Sync,
        D: Fn(&K, &mut PrereqGatherer<'_, K, V, S1, S2>) + Sync,
    {
        self.evaluate(key, &compute, Some(&declare), num_threads)
    }

    fn evaluate<C>(
        &self,
        key: &K,
        compute: &C,
        declare: Option<&DeclareFn<'_, K, V, S1, S2>>,
        num_threads: usize,
    ) -> Result<V, Error<K>>
    where
        C: Fn(&K, &mut PrereqProvider<'_, K, V, S1, S2>) -> V + Sync,
    {
        if num_threads < 1 {
            return Err(Error::InvalidConfig(
                "the number of threads must be at least 1",
            ));
        }

        // Fast path: no thread is spawned for an already-memoized root.
        if let Some(value) = self.values.get(key) {
            return Ok(value.clone());
        }

        if num_threads == 1 {
            self.run_worker(0, key, compute, declare)?;
        } else {
            let results: Vec<Result<(), Error<K>>> = thread::scope(|scope| {
                let handles: Vec<_> = (0..num_threads)
                    .map(|thread_no| {
                        scope.spawn(move || self.run_worker(thread_no, key, compute, declare))
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|handle| match handle.join() {
                        Ok(result) => result,
                        // A panic in a user callback propagates as-is.
                        Err(payload) => panic::resume_unwind(payload),
                    })
                    .collect()
            });

            // All workers have been joined; surface the most specific
            // error, or the first by thread index.
            let mut first = None;
            for result in results {
                if let Err(error) = result {
                    if matches!(error, Error::CircularDependency { .. }) {
                        return Err(error);
                    }
                    if first.is_none() {
                        first = Some(error);
                    }
                }
            }
            if let Some(error) = first {
                return Err(error);
            }
        }

        // Every worker drained its stack, so the root is present.
        self.values.get(key).cloned().ok_or(Error::NotMemoized)
    }

    /// The DFS loop of one worker thread.
    ///
    /// Each key is visited twice: a discovery visit that pushes its
    /// missing prerequisites as a group, and a ready revisit that computes
    /// and publishes the value once the prerequisites are below it on the
    /// stack, hence already in the map. Workers never wait for each other;
    /// racing workers deduplicate through the map.
    fn run_worker<C>(
        &self,
        thread_no: usize,
        root: &K,
        compute: &C,
        declare: Option<&DeclareFn<'_, K, V, S1, S2>>,
    ) -> Result<(), Error<K>>
    where
        C: Fn(&K, &mut PrereqProvider<'_, K, V, S1, S2>) -> V + Sync,
    {
        let mut stack = WorkStack::new(
            thread_no,
            self.detect_circular_dependencies,
            self.values.hasher1().clone(),
        );

        stack.push(root.clone())?;
        stack.finalize_group();

        loop {
            let (key, ready) = match stack.last() {
                Some(item) => (item.key.clone(), item.ready),
                None => break,
            };

            if !ready {
                stack.set_ready();

                if self.values.contains_key(&key) {
                    // Another worker finished it. Do not pop yet: the
                    // ready revisit performs the pop.
                    continue;
                }

                match declare {
                    Some(declare) => {
                        let mut gatherer = PrereqGatherer {
                            values: &self.values,
                            stack: &mut stack,
                            error: None,
                        };
                        declare(&key, &mut gatherer);
                        if let Some(error) = gatherer.error.take() {
                            return Err(error);
                        }
                        stack.finalize_group();
                    }
                    None => {
                        if self.dry_run_step(&key, compute, &mut stack)? {
                            stack.pop();
                        }
                        stack.finalize_group();
                    }
                }
            } else if declare.is_some() {
                // Declared mode: every prerequisite is memoized, compute
                // for real. The insertion is idempotent; if the key was
                // published meanwhile, `compute` is not invoked at all.
                let mut provider = PrereqProvider {
                    values: &self.values,
                    stack: &mut stack,
                    dry_run: false,
                    error: None,
                };
                self.values
                    .insert_with(&key, |key| compute(key, &mut provider))?;
                stack.pop();
            } else {
                // Dry-run mode: re-run the computation. When every
                // prerequisite it asks for is memoized, the result is
                // final; otherwise the missing ones were discovered
                // incrementally and this key stays for another round.
                if self.values.contains_key(&key) {
                    stack.pop();
                    continue;
                }

                if self.dry_run_step(&key, compute, &mut stack)? {
                    stack.pop();
                }
                stack.finalize_group();
            }
        }

        Ok(())
    }

    /// Runs `compute` under a recording provider. Returns `true` when no
    /// prerequisite was missing, in which case the value is final and has
    /// been published; otherwise the missing prerequisites joined the
    /// current stack group and the tentative value was discarded.
    fn dry_run_step<C>(
        &self,
        key: &K,
        compute: &C,
        stack: &mut WorkStack<K, S1>,
    ) -> Result<bool, Error<K>>
    where
        C: Fn(&K, &mut PrereqProvider<'_, K, V, S1, S2>) -> V + Sync,
    {
        let mut provider = PrereqProvider {
            values: &self.values,
            stack: &mut *stack,
            dry_run: true,
            error: None,
        };
        let tentative = compute(key, &mut provider);
        if let Some(error) = provider.error.take() {
            return Err(error);
        }

        if stack.group_size() == 0 {
            self.values.insert(key.clone(), tentative)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Hands prerequisite values to a compute callback.
///
/// In normal mode, [`get`](PrereqProvider::get) returns the memoized value
/// of a prerequisite. During dry-run discovery it returns
/// [`Default::default`] for prerequisites that are not memoized yet and
/// records them for evaluation; the driver then discards the tentative
/// result of the enclosing computation.
pub struct PrereqProvider<'w, K, V, S1 = RandomState, S2 = ahash::RandomState> {
    values: &'w MemoMap<K, V, S1, S2>,
    stack: &'w mut WorkStack<K, S1>,
    dry_run: bool,
    error: Option<Error<K>>,
}

impl<K, V, S1, S2> PrereqProvider<'_, K, V, S1, S2>
where
    K: Hash + Eq + Clone,
    V: Clone + Default,
    S1: BuildHasher,
    S2: BuildHasher,
{
    /// Returns the value of the prerequisite `key`.
    ///
    /// # Panics
    ///
    /// Outside of dry-run discovery, requesting a key that was never
    /// declared as a prerequisite is a caller bug and panics.
    pub fn get(&mut self, key: &K) -> V {
        if let Some(value) = self.values.get(key) {
            return value.clone();
        }

        if !self.dry_run {
            panic!("prerequisite is not memoized; the declaration callback missed a key");
        }

        // Record the missing prerequisite; after the first error the
        // remaining requests are ignored and the worker re-raises it.
        if self.error.is_none() {
            if let Err(error) = self.stack.push(key.clone()) {
                self.error = Some(error);
            }
        }

        V::default()
    }
}

/// Collects the prerequisite declarations of a key.
///
/// Handed to the `declare` callback of
/// [`get_or_compute_declared`](Memoizer::get_or_compute_declared).
/// Declaring a key that is already memoized is a no-op.
pub struct PrereqGatherer<'w, K, V, S1 = RandomState, S2 = ahash::RandomState> {
    values: &'w MemoMap<K, V, S1, S2>,
    stack: &'w mut WorkStack<K, S1>,
    error: Option<Error<K>>,
}

impl<K, V, S1, S2> PrereqGatherer<'_, K, V, S1, S2>
where
    K: Hash + Eq + Clone,
    S1: BuildHasher,
    S2: BuildHasher,
{
    /// Declares `key` as a prerequisite of the key being discovered.
    pub fn declare(&mut self, key: &K) {
        if self.error.is_some() || self.values.contains_key(key) {
            return;
        }

        if let Err(error) = self.stack.push(key.clone()) {
            self.error = Some(error);
        }
    }
}
