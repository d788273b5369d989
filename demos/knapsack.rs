use std::process::exit;
use std::time::Instant;

use memodag::{Memoizer, PrereqProvider};

const WEIGHTS: [i32; 51] = [
    0, // the 0-th element is never used
    3851, 29521, 18550, 2453, 18807, 20622, 17505, 18855, 75601, 8657, 9411, 15447, 20454, 96502,
    56825, 15199, 25559, 56504, 95545, 8580, 8441, 48557, 41552, 10441, 15485, 35246, 4561, 5451,
    8759, 4771, 5647, 1834, 5537, 15234, 19375, 74982, 3452, 3314, 35453, 15583, 9853, 11252,
    2123, 5324, 7572, 3142, 6733, 25051, 26523, 15642,
];

const VALUES: [i32; 51] = [
    0, // the 0-th element is never used
    124, 32, 15, 23, 8, 12, 34, 11, 23, 4, 41, 45, 87, 41, 52, 65, 71, 101, 25, 254, 415, 24, 142,
    98, 42, 46, 41, 99, 101, 52, 372, 34, 23, 102, 324, 31, 87, 23, 12, 87, 12, 54, 123, 45, 12,
    78, 231, 32, 12, 99,
];

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
struct Key {
    items: i32,
    weight: i32,
}

fn knapsack(key: &Key, prereqs: &mut PrereqProvider<'_, Key, i32>) -> i32 {
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

fn main() {
    let mut args = std::env::args().skip(1);
    let (num_threads, capacity) = match (
        args.next().and_then(|a| a.parse::<usize>().ok()),
        args.next().and_then(|a| a.parse::<i32>().ok()),
    ) {
        (Some(threads), Some(capacity)) => (threads, capacity),
        _ => {
            eprintln!("usage: knapsack NUMBER_OF_THREADS KNAPSACK_CAPACITY");
            exit(1);
        }
    };

    let num_items = WEIGHTS.len() as i32 - 1;
    let memo: Memoizer<Key, i32> =
        Memoizer::with_estimated_entries(num_items as usize * capacity as usize);

    let start = Instant::now();
    // Prerequisites are found by dry-running the compute function.
    let max_value = memo
        .get_or_compute_threads(
            &Key {
                items: num_items,
                weight: capacity,
            },
            knapsack,
            num_threads,
        )
        .unwrap();
    let elapsed = start.elapsed();

    // Walk the table back down to recover the selected items.
    let mut selected = Vec::new();
    let mut weight = capacity;
    for items in (1..=num_items).rev() {
        let with = memo.get(&Key { items, weight }).unwrap();
        let without = memo.get(&Key { items: items - 1, weight }).unwrap();
        if with != without {
            selected.push(items);
            weight -= WEIGHTS[items as usize];
        }
    }

    println!("Max value: {max_value}");
    println!(
        "Selected items: {}",
        selected
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    );
    println!();
    println!("Elapsed time (sec.): {}", elapsed.as_secs_f64());
}
