use memodag::{Memoizer, PrereqProvider};

fn fibonacci(n: &u64, prereqs: &mut PrereqProvider<'_, u64, u64>) -> u64 {
    if *n <= 2 {
        1
    } else {
        prereqs.get(&(n - 1)) + prereqs.get(&(n - 2))
    }
}

const ELEM_NO: u64 = 30;

fn main() {
    // Prerequisites are found by dry-running the compute function.
    let memo: Memoizer<u64, u64> = Memoizer::new();
    let result = memo.get_or_compute(&ELEM_NO, fibonacci).unwrap();

    println!("Fibonacci #{ELEM_NO}: {result}");
}
