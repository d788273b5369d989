use std::collections::HashSet;
use std::hash::{BuildHasher, Hash};

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::Error;

/// One pending key on a worker's evaluation stack.
///
/// `ready` is `false` on the first visit, when prerequisites are
/// discovered, and `true` on the revisit, when the value is computed and
/// published.
pub(crate) struct StackItem<K> {
    pub(crate) key: K,
    pub(crate) ready: bool,
}

/// The explicit DFS stack of one worker thread.
///
/// Prerequisites pushed by a single discovery step form a group. When the
/// group is finalized, worker 0 keeps the declared order (deterministic
/// single-threaded behavior), worker 1 reverses it, and workers 2 and up
/// shuffle it with a PRNG seeded by the thread index, so workers diverge
/// onto disjoint subtrees quickly.
pub(crate) struct WorkStack<K, S> {
    items: Vec<StackItem<K>>,
    thread_no: usize,
    rng: SmallRng,

    /// Number of items pushed since the last `finalize_group`.
    group_size: usize,

    /// The keys currently on the stack, when cycle detection is enabled.
    on_stack: Option<HashSet<K, S>>,
}

impl<K, S> WorkStack<K, S>
where
    K: Hash + Eq + Clone,
    S: BuildHasher,
{
    pub(crate) fn new(thread_no: usize, detect_cycles: bool, hash_builder: S) -> WorkStack<K, S> {
        WorkStack {
            items: Vec::new(),
            thread_no,
            rng: SmallRng::seed_from_u64(thread_no as u64),
            group_size: 0,
            on_stack: detect_cycles.then(|| HashSet::with_hasher(hash_builder)),
        }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub(crate) fn group_size(&self) -> usize {
        self.group_size
    }

    #[inline]
    pub(crate) fn last(&self) -> Option<&StackItem<K>> {
        self.items.last()
    }

    /// Marks the top item as visited.
    #[inline]
    pub(crate) fn set_ready(&mut self) {
        if let Some(item) = self.items.last_mut() {
            item.ready = true;
        }
    }

    /// Pushes a key in the not-ready state, growing the current group.
    ///
    /// With cycle detection enabled, pushing a key that is already on the
    /// stack fails with [`Error::CircularDependency`] carrying the stack
    /// bottom-to-top, ending with the repeated key.
    pub(crate) fn push(&mut self, key: K) -> Result<(), Error<K>> {
        if let Some(on_stack) = &self.on_stack {
            if on_stack.contains(&key) {
                let mut keys: Vec<K> = self.items.iter().map(|item| item.key.clone()).collect();
                keys.push(key);
                return Err(Error::CircularDependency { keys });
            }
        }

        self.items.push(StackItem { key, ready: false });
        self.group_size += 1;
        Ok(())
    }

    /// Closes the group pushed by a discovery step: reorders it according
    /// to the thread's heuristic and registers its keys for cycle
    /// detection.
    pub(crate) fn finalize_group(&mut self) {
        if self.group_size == 0 {
            return;
        }

        let start = self.items.len() - self.group_size;

        if self.thread_no != 0 && self.group_size > 1 {
            let group = &mut self.items[start..];
            if self.thread_no == 1 {
                // A cheap deterministic perturbation.
                group.reverse();
            } else {
                group.shuffle(&mut self.rng);
            }
        }

        if let Some(on_stack) = &mut self.on_stack {
            for item in &self.items[start..] {
                on_stack.insert(item.key.clone());
            }
        }

        self.group_size = 0;
    }

    /// Removes the top item. Must not be called with an open group.
    pub(crate) fn pop(&mut self) {
        debug_assert_eq!(self.group_size, 0, "pop with an unfinalized group");

        if let Some(item) = self.items.pop() {
            if let Some(on_stack) = &mut self.on_stack {
                on_stack.remove(&item.key);
            }
        }
    }
}
