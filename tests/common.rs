use memodag::MemoMap;

// Run the test on different configurations of a `MemoMap`.
#[allow(dead_code)]
pub fn with_map<K: std::fmt::Debug, V>(mut test: impl FnMut(&dyn Fn() -> MemoMap<K, V>)) {
    // Default configuration.
    test(&MemoMap::new);

    // An aggressive load factor, so expansion kicks in earlier.
    test(
        &(|| {
            MemoMap::builder()
                .max_load_factor(0.5)
                .build()
                .unwrap()
        }),
    );
}

// The number of threads to use for concurrency tests.
#[allow(dead_code)]
pub fn threads() -> usize {
    std::thread::available_parallelism()
        .map(Into::into)
        .unwrap_or(4)
        .clamp(2, 8)
}
