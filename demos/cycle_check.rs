use memodag::{Error, Memoizer};

const ELEM_NO: u32 = 200;

fn main() {
    // A linear chain with an intentional back edge: 8 depends on 24,
    // which depends back down onto the chain.
    let memo: Memoizer<u32, u32> = Memoizer::builder()
        .detect_circular_dependencies(true)
        .build()
        .unwrap();

    let result = memo.get_or_compute_declared(
        &ELEM_NO,
        |&n, prereqs| if n == 0 { 0 } else { 1 + prereqs.get(&(n - 1)) },
        |&n, deps| {
            if n == 8 {
                deps.declare(&24);
            } else if n != 0 {
                deps.declare(&(n - 1));
            }
        },
    );

    match result {
        Err(Error::CircularDependency { keys }) => {
            println!("{}", Error::CircularDependency { keys: keys.clone() });
            println!("cycle tail: {:?}", &keys[keys.len().saturating_sub(6)..]);
            println!("TEST SUCCEEDED");
        }
        other => {
            println!("You shouldn't read this message: {other:?}");
            std::process::exit(1);
        }
    }
}
