use std::process::exit;
use std::time::Instant;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use memodag::{Memoizer, PrereqGatherer, PrereqProvider};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
struct Range {
    from: i32,
    to: i32,
}

#[derive(Clone, Copy, Debug, Default)]
struct Parenthesization {
    lowest_cost: i64,
    best_split: i32,
}

struct Chain {
    // dims[i] x dims[i + 1] is the shape of matrix i.
    dims: Vec<i64>,
}

impl Chain {
    fn declare_splits(&self, range: &Range, deps: &mut PrereqGatherer<'_, Range, Parenthesization>) {
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
        &self,
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
            lowest_cost: i64::MAX,
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

            let rows = self.dims[left.from as usize];
            let inner = self.dims[(left.to + 1) as usize];
            let columns = self.dims[(right.to + 1) as usize];

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

const MATRIX_MIN_DIM: i64 = 3;
const MATRIX_MAX_DIM: i64 = 10;

fn main() {
    let mut args = std::env::args().skip(1);
    let (num_threads, num_matrices) = match (
        args.next().and_then(|a| a.parse::<usize>().ok()),
        args.next().and_then(|a| a.parse::<i32>().ok()),
    ) {
        (Some(threads), Some(matrices)) if matrices > 0 => (threads, matrices),
        _ => {
            eprintln!("usage: matrix_chain NUMBER_OF_THREADS NUMBER_OF_MATRICES");
            exit(1);
        }
    };

    let mut rng = SmallRng::seed_from_u64(0);
    let dims: Vec<i64> = (0..=num_matrices)
        .map(|_| rng.gen_range(MATRIX_MIN_DIM..=MATRIX_MAX_DIM))
        .collect();
    println!("dims: {dims:?}");
    println!();

    let chain = Chain { dims };
    let memo: Memoizer<Range, Parenthesization> =
        Memoizer::with_estimated_entries((num_matrices * num_matrices) as usize);

    let full = Range {
        from: 0,
        to: num_matrices - 1,
    };

    let start = Instant::now();
    let result = memo
        .get_or_compute_declared_threads(
            &full,
            |range, prereqs| chain.cheapest_split(range, prereqs),
            |range, deps| chain.declare_splits(range, deps),
            num_threads,
        )
        .unwrap();
    let elapsed = start.elapsed();

    println!("Best parenthesization: {}", parenthesize(full, &memo));
    println!("Cost: {}", result.lowest_cost);
    println!();
    println!("Elapsed time (sec.): {}", elapsed.as_secs_f64());
}
