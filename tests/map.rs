use std::collections::HashMap;
use std::sync::Barrier;
use std::thread;

use memodag::MemoMap;

mod common;
use common::{threads, with_map};

#[test]
fn new() {
    with_map::<usize, usize>(|map| drop(map()));
}

#[test]
fn get_empty() {
    with_map::<usize, usize>(|map| {
        let map = map();
        assert!(map.get(&42).is_none());
        assert!(!map.contains_key(&42));
        assert!(map.is_empty());
    });
}

#[test]
fn insert_and_get() {
    with_map::<usize, usize>(|map| {
        let map = map();
        assert!(map.insert(42, 0).unwrap());
        assert_eq!(map.get(&42), Some(&0));
        assert_eq!(map.len(), 1);
    });
}

#[test]
fn insert_is_final() {
    with_map::<usize, usize>(|map| {
        let map = map();
        assert!(map.insert(42, 0).unwrap());

        // The second insert is a no-op; the resident value wins.
        assert!(!map.insert(42, 1).unwrap());
        assert_eq!(map.get(&42), Some(&0));
        assert_eq!(map.len(), 1);
    });
}

#[test]
fn insert_with_is_lazy() {
    with_map::<usize, usize>(|map| {
        let map = map();
        let (value, inserted) = map.insert_with(&1, |_| 10).unwrap();
        assert_eq!((value, inserted), (&10, true));

        // The closure must not run when the key is resident.
        let (value, inserted) = map
            .insert_with(&1, |_| panic!("value recomputed"))
            .unwrap();
        assert_eq!((value, inserted), (&10, false));
    });
}

#[test]
fn iterator_completeness() {
    with_map::<usize, usize>(|map| {
        let map = map();
        for key in 0..1000 {
            map.insert(key, key * 2).unwrap();
        }

        let mut seen: Vec<usize> = map.iter().map(|(&key, &value)| {
            assert_eq!(value, key * 2);
            key
        }).collect();
        seen.sort_unstable();

        assert_eq!(seen.len(), map.len());
        assert_eq!(seen, (0..1000).collect::<Vec<_>>());
    });
}

#[test]
fn expansion_keeps_entries() {
    // Enough entries to overload the first submap several times over.
    const ENTRIES: usize = 150_000;

    let map: MemoMap<usize, usize> = MemoMap::new();
    for key in 0..ENTRIES {
        map.insert(key, !key).unwrap();
    }

    let stats = map.stats();
    assert!(stats.num_submaps >= 2, "expected expansion: {stats:?}");
    assert_eq!(stats.num_entries, ENTRIES);
    assert_eq!(
        stats.submaps.iter().map(|s| s.len).sum::<usize>(),
        ENTRIES
    );

    for key in 0..ENTRIES {
        assert_eq!(map.get(&key), Some(&!key));
    }
}

#[test]
fn no_lost_inserts() {
    // Concurrent insertions of distinct keys across an expansion: all of
    // them must land and be found.
    const PER_THREAD: usize = 30_000;

    let map: MemoMap<usize, usize> = MemoMap::new();
    let threads = threads();
    let barrier = Barrier::new(threads);

    thread::scope(|s| {
        for t in 0..threads {
            let map = &map;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    let key = t * PER_THREAD + i;
                    assert!(map.insert(key, key + 1).unwrap());
                }
            });
        }
    });

    assert_eq!(map.len(), threads * PER_THREAD);
    for key in 0..threads * PER_THREAD {
        assert_eq!(map.get(&key), Some(&(key + 1)));
    }
}

#[test]
fn racing_same_key_inserts_agree() {
    // Many threads compute the same key; whoever wins, every reader must
    // observe the same value and the compute must be deterministic.
    let map: MemoMap<u32, u32> = MemoMap::new();
    let threads = threads();
    let barrier = Barrier::new(threads);

    thread::scope(|s| {
        for _ in 0..threads {
            let map = &map;
            let barrier = &barrier;
            s.spawn(move || {
                barrier.wait();
                for key in 0..1000 {
                    let (value, _) = map.insert_with(&key, |&k| k * 3).unwrap();
                    assert_eq!(*value, key * 3);
                }
            });
        }
    });

    for key in 0..1000 {
        assert_eq!(map.get(&key), Some(&(key * 3)));
    }

    // Every occurrence of a key in the table holds the same value.
    for (&key, &value) in map.iter() {
        assert_eq!(value, key * 3);
    }
}

#[test]
fn filter_partitions_entries() {
    with_map::<usize, usize>(|map| {
        let map = map();
        for key in 0..500 {
            map.insert(key, key).unwrap();
        }

        let even = map.filter(|&key, _| key % 2 == 0).unwrap();
        assert_eq!(even.len(), 250);
        for (&key, &value) in even.iter() {
            assert_eq!(key % 2, 0);
            assert_eq!(value, key);
        }
        assert!(even.get(&1).is_none());
    });
}

#[test]
fn clone_equals_source() {
    let map: MemoMap<u16, u16> = MemoMap::new();
    for key in 0..1000u16 {
        map.insert(key, key.wrapping_mul(7)).unwrap();
    }

    let clone = map.try_clone().unwrap();
    assert_eq!(clone.len(), map.len());
    assert_eq!(clone, map);
}

quickcheck::quickcheck! {
    fn prop_clone_roundtrip(entries: Vec<(u16, u16)>) -> bool {
        let map: MemoMap<u16, u16> = MemoMap::new();
        for &(key, value) in &entries {
            map.insert(key, value).unwrap();
        }

        map.try_clone().unwrap() == map
    }

    fn prop_filter_subset(entries: Vec<(u16, u16)>) -> bool {
        let map: MemoMap<u16, u16> = MemoMap::new();
        // First insertion per key wins, matching the map's semantics.
        let mut expected: HashMap<u16, u16> = HashMap::new();
        for &(key, value) in &entries {
            map.insert(key, value).unwrap();
            expected.entry(key).or_insert(value);
        }

        let filtered = map.filter(|&key, _| key % 3 == 0).unwrap();
        let expected: HashMap<u16, u16> = expected
            .into_iter()
            .filter(|&(key, _)| key % 3 == 0)
            .collect();

        filtered.len() == expected.len()
            && filtered
                .iter()
                .all(|(key, value)| expected.get(key) == Some(value))
    }

    fn prop_iteration_matches_lookup(entries: Vec<(u16, u16)>) -> bool {
        let map: MemoMap<u16, u16> = MemoMap::new();
        let mut distinct = 0;
        for &(key, value) in &entries {
            if map.insert(key, value).unwrap() {
                distinct += 1;
            }
        }

        map.len() == distinct
            && map.iter().count() == distinct
            && map.iter().all(|(key, value)| map.get(key) == Some(value))
    }
}

#[test]
fn stats_reports_configuration() {
    let map: MemoMap<u64, u64> = MemoMap::builder()
        .estimated_entries(1 << 20)
        .build()
        .unwrap();

    let stats = map.stats();
    assert_eq!(stats.num_submaps, 1);
    assert_eq!(stats.num_entries, 0);
    // Sized so the estimate fits below the load factor.
    assert!(stats.submaps[0].capacity > 1 << 20);
}

#[test]
fn invalid_configuration() {
    use memodag::Error;

    let result = MemoMap::<u64, u64>::builder().max_load_factor(1.5).build();
    assert!(matches!(result, Err(Error::InvalidConfig(_))));

    let result = MemoMap::<u64, u64>::builder().max_load_factor(0.0).build();
    assert!(matches!(result, Err(Error::InvalidConfig(_))));

    let result = MemoMap::<u64, u64>::builder().max_submaps(0).build();
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[test]
fn debug_and_default() {
    let map: MemoMap<u8, u8> = MemoMap::default();
    map.insert(1, 2).unwrap();
    assert_eq!(format!("{map:?}"), "{1: 2}");
}
