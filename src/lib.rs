//! Parallel memoization over dependency DAGs.
//!
//! This crate evaluates computations whose result at a key depends on
//! results at other keys, forming a directed acyclic graph. Evaluation is
//! driven bottom-up with explicit per-worker stacks, never recursion, so
//! dependency chains of arbitrary depth are safe, and multiple worker
//! threads can cooperate on one evaluation.
//!
//! Two types make up the public surface:
//!
//! - [`MemoMap`]: an almost lock-free, insert-only concurrent map. Entries
//!   are immutable once published and never erased, which lets readers
//!   access them without locks or guards.
//! - [`Memoizer`]: the evaluation driver. Given a root key and a compute
//!   callback it materializes every prerequisite in dependency order,
//!   sharing the [`MemoMap`] between workers.
//!
//! Prerequisites are discovered either by *dry-running* the compute
//! callback (missing prerequisites read as [`Default::default`] and are
//! recorded), or through an explicit *declaration* callback. See
//! [`Memoizer`] for details and caveats.
//!
//! # Examples
//!
//! ```
//! use memodag::Memoizer;
//!
//! let memo: Memoizer<u64, u64> = Memoizer::new();
//!
//! let fib = memo
//!     .get_or_compute_threads(
//!         &30,
//!         |&n, prereqs| {
//!             if n <= 2 {
//!                 1
//!             } else {
//!                 prereqs.get(&(n - 1)) + prereqs.get(&(n - 2))
//!             }
//!         },
//!         4,
//!     )
//!     .unwrap();
//!
//! assert_eq!(fib, 832040);
//! ```

mod error;
mod map;
mod memo;
mod raw;
mod stack;

#[cfg(feature = "serde")]
mod serde_impls;

pub use error::Error;
pub use map::{Iter, MapStats, MemoMap, MemoMapBuilder, SubmapStats};
pub use memo::{Memoizer, MemoizerBuilder, PrereqGatherer, PrereqProvider};
