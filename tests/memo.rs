use memodag::{Error, Memoizer, PrereqProvider};

fn fib(n: &u64, prereqs: &mut PrereqProvider<'_, u64, u64>) -> u64 {
    if *n <= 2 {
        1
    } else {
        prereqs.get(&(n - 1)) + prereqs.get(&(n - 2))
    }
}

#[test]
fn fibonacci_dry_run() {
    let memo: Memoizer<u64, u64> = Memoizer::new();
    assert_eq!(memo.get_or_compute(&30, fib).unwrap(), 832040);

    // Single-threaded evaluation computes each key exactly once.
    assert_eq!(memo.values().len(), 30);
}

#[test]
fn fibonacci_is_deterministic_across_threads() {
    for num_threads in [1, 2, 4, 8] {
        let memo: Memoizer<u64, u64> = Memoizer::new();
        let value = memo.get_or_compute_threads(&30, fib, num_threads).unwrap();
        assert_eq!(value, 832040, "with {num_threads} threads");
    }
}

#[test]
fn memoized_root_skips_computation() {
    let memo: Memoizer<u64, u64> = Memoizer::new();
    memo.get_or_compute(&10, fib).unwrap();

    // The fast path returns without invoking the callback.
    let value = memo
        .get_or_compute(&10, |_, _| panic!("recomputed a memoized root"))
        .unwrap();
    assert_eq!(value, 55);
}

#[test]
fn read_only_get() {
    let memo: Memoizer<u64, u64> = Memoizer::new();
    assert!(matches!(memo.get(&7), Err(Error::NotMemoized)));

    memo.get_or_compute(&7, fib).unwrap();
    assert_eq!(memo.get(&7).unwrap(), 13);
}

fn chain_compute(n: &u32, prereqs: &mut PrereqProvider<'_, u32, u32>) -> u32 {
    if *n == 0 {
        0
    } else {
        1 + prereqs.get(&(n - 1))
    }
}

#[test]
fn linear_chain_declared() {
    for num_threads in [1, 4] {
        let memo: Memoizer<u32, u32> = Memoizer::new();
        let value = memo
            .get_or_compute_declared_threads(
                &200,
                chain_compute,
                |&n, deps| {
                    if n != 0 {
                        deps.declare(&(n - 1));
                    }
                },
                num_threads,
            )
            .unwrap();
        assert_eq!(value, 200, "with {num_threads} threads");
    }
}

#[test]
fn circular_dependency_is_detected() {
    let memo: Memoizer<u32, u32> = Memoizer::builder()
        .detect_circular_dependencies(true)
        .build()
        .unwrap();

    // A linear chain with a back edge: 8 additionally depends on 13,
    // which depends back down through 12, 11, 10, 9 onto the chain.
    // The back edge is declared first, so the cycle is caught before any
    // unrelated sibling joins the stack.
    let err = memo
        .get_or_compute_declared(
            &200,
            chain_compute,
            |&n, deps| {
                if n == 8 {
                    deps.declare(&13);
                    deps.declare(&7);
                } else if n != 0 {
                    deps.declare(&(n - 1));
                }
            },
        )
        .unwrap_err();

    let keys = match err {
        Error::CircularDependency { keys } => keys,
        other => panic!("expected a circular dependency, got {other:?}"),
    };

    // The stack runs from the root to the offender, which repeats an
    // earlier key and closes the cycle.
    let offender = *keys.last().unwrap();
    let first = keys.iter().position(|&k| k == offender).unwrap();
    assert!(first < keys.len() - 1);
    assert_eq!(keys[0], 200);

    // From the repeated key's first occurrence to its reappearance the
    // snapshot holds exactly the cycle, with no interleaved siblings.
    assert_eq!(keys[first..], [13, 12, 11, 10, 9, 8, 13]);
}

#[test]
fn cycle_detection_off_by_default() {
    let memo: Memoizer<u32, u32> = Memoizer::new();
    assert!(!memo.detect_circular_dependencies());

    // An acyclic graph evaluates identically with detection enabled.
    let mut detecting: Memoizer<u32, u32> = Memoizer::new();
    detecting.set_detect_circular_dependencies(true);
    assert!(detecting.detect_circular_dependencies());

    let value = detecting
        .get_or_compute_declared(&100, chain_compute, |&n, deps| {
            if n != 0 {
                deps.declare(&(n - 1));
            }
        })
        .unwrap();
    assert_eq!(value, 100);
}

mod knapsack {
    use super::*;

    const WEIGHTS: [i32; 51] = [
        0, // the 0-th element is never used
        3851, 29521, 18550, 2453, 18807, 20622, 17505, 18855, 75601, 8657, 9411, 15447, 20454,
        96502, 56825, 15199, 25559, 56504, 95545, 8580, 8441, 48557, 41552, 10441, 15485, 35246,
        4561, 5451, 8759, 4771, 5647, 1834, 5537, 15234, 19375, 74982, 3452, 3314, 35453, 15583,
        9853, 11252, 2123, 5324, 7572, 3142, 6733, 25051, 26523, 15642,
    ];

    const VALUES: [i32; 51] = [
        0, // the 0-th element is never used
        124, 32, 15, 23, 8, 12, 34, 11, 23, 4, 41, 45, 87, 41, 52, 65, 71, 101, 25, 254, 415, 24,
        142, 98, 42, 46, 41, 99, 101, 52, 372, 34, 23, 102, 324, 31, 87, 23, 12, 87, 12, 54, 123,
        45, 12, 78, 231, 32, 12, 99,
    ];

    const CAPACITY: i32 = 50000;
    const NUM_ITEMS: i32 = 49;

    // Roughly the number of reachable (items, weight) states.
    const ESTIMATED_STATES: usize = 900_000;

    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    struct Key {
        items: i32,
        weight: i32,
    }

    fn best_value(key: &Key, prereqs: &mut PrereqProvider<'_, Key, i32>) -> i32 {
        if key.items == 0 {
            return 0;
        }

        let without = Key {
            items: key.items - 1,
            weight: key.weight,
        };

        if WEIGHTS[key.items as usize] > key.weight {
            prereqs.get(&without)
        } else {
            let with = Key {
                items: key.items - 1,
                weight: key.weight - WEIGHTS[key.items as usize],
            };
            prereqs
                .get(&without)
                .max(prereqs.get(&with) + VALUES[key.items as usize])
        }
    }

    #[test]
    fn same_result_for_any_thread_count() {
        let root = Key {
            items: NUM_ITEMS,
            weight: CAPACITY,
        };

        for num_threads in [1, 2, 4, 8] {
            let memo: Memoizer<Key, i32> = Memoizer::with_estimated_entries(ESTIMATED_STATES);
            let max_value = memo
                .get_or_compute_threads(&root, best_value, num_threads)
                .unwrap();
            assert_eq!(max_value, 1817, "with {num_threads} threads");
        }
    }

    #[test]
    fn selected_items_reconstruct_the_maximum() {
        let root = Key {
            items: NUM_ITEMS,
            weight: CAPACITY,
        };

        let memo: Memoizer<Key, i32> = Memoizer::with_estimated_entries(ESTIMATED_STATES);
        let max_value = memo.get_or_compute(&root, best_value).unwrap();
        assert_eq!(max_value, 1817);

        // Walk the memoized table back down, collecting the items whose
        // inclusion changed the optimum.
        let mut selected = Vec::new();
        let mut weight = CAPACITY;
        for items in (1..=NUM_ITEMS).rev() {
            let with = memo.get(&Key { items, weight }).unwrap();
            let without = memo.get(&Key { items: items - 1, weight }).unwrap();
            if with != without {
                selected.push(items);
                weight -= WEIGHTS[items as usize];
            }
        }

        let total_weight: i32 = selected.iter().map(|&i| WEIGHTS[i as usize]).sum();
        let total_value: i32 = selected.iter().map(|&i| VALUES[i as usize]).sum();
        assert!(total_weight <= CAPACITY);
        assert_eq!(total_value, 1817);
    }
}

mod matrix_chain {
    use super::*;
    use memodag::PrereqGatherer;

    // Dimensions p = [5, 4, 6, 2, 7]: A0 is 5x4, A1 is 4x6, A2 is 6x2,
    // A3 is 2x7.
    const DIMS: [i32; 5] = [5, 4, 6, 2, 7];

    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
    struct Range {
        from: i32,
        to: i32,
    }

    #[derive(Clone, Copy, Debug, Default)]
    struct Parenthesization {
        lowest_cost: i32,
        best_split: i32,
    }

    fn declare_splits(range: &Range, deps: &mut PrereqGatherer<'_, Range, Parenthesization>) {
        for split in range.from..range.to {
            deps.declare(&Range {
                from: range.from,
                to: split,
            });
            deps.declare(&Range {
                from: split + 1,
                to: range.to,
            });
        }
    }

    fn cheapest_split(
        range: &Range,
        prereqs: &mut PrereqProvider<'_, Range, Parenthesization>,
    ) -> Parenthesization {
        if range.from == range.to {
            return Parenthesization {
                lowest_cost: 0,
                best_split: range.from,
            };
        }

        let mut best = Parenthesization {
            lowest_cost: i32::MAX,
            best_split: 0,
        };

        for split in range.from..range.to {
            let left = Range {
                from: range.from,
                to: split,
            };
            let right = Range {
                from: split + 1,
                to: range.to,
            };

            let rows = DIMS[left.from as usize];
            let inner = DIMS[(left.to + 1) as usize];
            let columns = DIMS[(right.to + 1) as usize];

            let cost = prereqs.get(&left).lowest_cost
                + prereqs.get(&right).lowest_cost
                + rows * inner * columns;

            if cost < best.lowest_cost {
                best = Parenthesization {
                    lowest_cost: cost,
                    best_split: split,
                };
            }
        }

        best
    }

    fn parenthesize(range: Range, memo: &Memoizer<Range, Parenthesization>) -> String {
        if range.from == range.to {
            return format!("A{}", range.from);
        }

        let split = memo.get(&range).unwrap().best_split;
        let left = parenthesize(
            Range {
                from: range.from,
                to: split,
            },
            memo,
        );
        let right = parenthesize(
            Range {
                from: split + 1,
                to: range.to,
            },
            memo,
        );

        format!("({left} {right})")
    }

    #[test]
    fn optimal_order() {
        let full = Range { from: 0, to: 3 };

        let memo: Memoizer<Range, Parenthesization> = Memoizer::new();
        let result = memo
            .get_or_compute_declared(&full, cheapest_split, declare_splits)
            .unwrap();

        assert_eq!(result.lowest_cost, 158);
        assert_eq!(parenthesize(full, &memo), "((A0 (A1 A2)) A3)");
    }

    #[test]
    fn declared_and_dry_run_agree() {
        let full = Range { from: 0, to: 3 };

        let declared: Memoizer<Range, Parenthesization> = Memoizer::new();
        let by_declaration = declared
            .get_or_compute_declared_threads(&full, cheapest_split, declare_splits, 4)
            .unwrap();

        let dry: Memoizer<Range, Parenthesization> = Memoizer::new();
        let by_dry_run = dry.get_or_compute(&full, cheapest_split).unwrap();

        assert_eq!(by_declaration.lowest_cost, by_dry_run.lowest_cost);
        assert_eq!(by_declaration.best_split, by_dry_run.best_split);
    }
}

#[test]
fn incremental_dry_run_discovery() {
    // The second prerequisite only becomes visible once the first one has
    // a real value, so discovery takes several rounds.
    let memo: Memoizer<u8, i64> = Memoizer::new();

    let value = memo
        .get_or_compute(&2, |&key, prereqs| match key {
            0 => 5,
            1 => 1,
            _ => {
                if prereqs.get(&1) == 1 {
                    prereqs.get(&0) + 10
                } else {
                    99
                }
            }
        })
        .unwrap();

    assert_eq!(value, 15);
    assert_eq!(memo.values().len(), 3);
}

#[test]
fn duplicate_computations_deduplicate() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    // A diamond: both 1 and 2 depend on the shared leaf 0. The leaf's
    // compute may run more than once across workers, but the map keeps a
    // single result and both parents observe the same one.
    let calls = AtomicUsize::new(0);
    let memo: Memoizer<u8, u64> = Memoizer::new();

    let value = memo
        .get_or_compute_threads(
            &3,
            |&key, prereqs| match key {
                0 => {
                    calls.fetch_add(1, Ordering::Relaxed);
                    7
                }
                1 => prereqs.get(&0) + 1,
                2 => prereqs.get(&0) + 2,
                _ => prereqs.get(&1) + prereqs.get(&2),
            },
            4,
        )
        .unwrap();

    assert_eq!(value, 17);
    assert_eq!(memo.get(&0).unwrap(), 7);

    // Every occurrence of every key agrees on its value.
    for (&key, &value) in memo.values().iter() {
        assert_eq!(value, memo.get(&key).unwrap(), "key {key}");
    }
    assert!(calls.load(Ordering::Relaxed) >= 1);
}

#[test]
fn invalid_thread_configuration() {
    let memo: Memoizer<u64, u64> = Memoizer::new();
    assert!(matches!(
        memo.get_or_compute_threads(&1, fib, 0),
        Err(Error::InvalidConfig(_))
    ));

    let mut memo: Memoizer<u64, u64> = Memoizer::new();
    assert!(matches!(
        memo.set_default_num_threads(0),
        Err(Error::InvalidConfig(_))
    ));
    memo.set_default_num_threads(4).unwrap();
    assert_eq!(memo.default_num_threads(), 4);

    assert!(matches!(
        Memoizer::<u64, u64>::builder().default_num_threads(0).build(),
        Err(Error::InvalidConfig(_))
    ));
}
