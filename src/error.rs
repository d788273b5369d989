use std::error;
use std::fmt;

/// Errors returned by [`MemoMap`](crate::MemoMap) and [`Memoizer`](crate::Memoizer).
///
/// Every variant is fatal to the call that produced it; the library never
/// retries on its own.
#[derive(Clone, PartialEq, Eq)]
pub enum Error<K> {
    /// A read-only lookup was performed for a key that has not been computed.
    NotMemoized,

    /// A dependency cycle was found while cycle detection was enabled.
    ///
    /// The keys are the evaluation stack at detection time, from the root at
    /// the front to the offending key at the back. The final key is a repeat
    /// of an earlier entry, closing the cycle.
    CircularDependency {
        /// The key stack, bottom to top.
        keys: Vec<K>,
    },

    /// The map reached its maximum number of submaps and cannot grow further.
    CapacityExceeded {
        /// The configured submap limit.
        max_submaps: usize,
    },

    /// A constructor or setter was given an out-of-range parameter.
    InvalidConfig(&'static str),
}

impl<K> fmt::Display for Error<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotMemoized => write!(f, "the value for this key has not been computed"),
            Error::CircularDependency { keys } => {
                write!(f, "circular dependency detected ({} keys on stack)", keys.len())
            }
            Error::CapacityExceeded { max_submaps } => {
                write!(f, "reached the maximum number of submaps: {max_submaps}")
            }
            Error::InvalidConfig(reason) => write!(f, "invalid configuration: {reason}"),
        }
    }
}

impl<K: fmt::Debug> fmt::Debug for Error<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotMemoized => f.debug_struct("NotMemoized").finish(),
            Error::CircularDependency { keys } => f
                .debug_struct("CircularDependency")
                .field("keys", keys)
                .finish(),
            Error::CapacityExceeded { max_submaps } => f
                .debug_struct("CapacityExceeded")
                .field("max_submaps", max_submaps)
                .finish(),
            Error::InvalidConfig(reason) => f.debug_tuple("InvalidConfig").field(reason).finish(),
        }
    }
}

impl<K: fmt::Debug> error::Error for Error<K> {}
