use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use deferred::prelude::*;

/// A boolean computation that counts how often it runs.
fn counted(outcome: bool, calls: &AtomicUsize) -> impl Computation<Output = bool> + '_ {
    from_fn(move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(outcome)
    })
}

#[test]
fn and_stops_at_first_false() {
    let calls = AtomicUsize::new(0);
    let all = And::new([
        counted(true, &calls),
        counted(false, &calls),
        counted(true, &calls),
    ]);
    assert!(!all.value().unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn and_skips_third_true() {
    let third = AtomicUsize::new(0);
    let children: Vec<BoxedCondition<'_>> = vec![
        Box::new(True),
        Box::new(False),
        Box::new(from_fn(|| {
            third.fetch_add(1, Ordering::SeqCst);
            True.value()
        })),
    ];
    assert!(!And::new(children).value().unwrap());
    assert_eq!(third.load(Ordering::SeqCst), 0);
}

#[test]
fn empty_and_is_true_and_empty_or_is_false() {
    assert!(And::<True>::new([]).value().unwrap());
    assert!(!Or::<True>::new([]).value().unwrap());
    assert!(And::over(|_: &u8| Ok(false), []).value().unwrap());
}

#[test]
fn ternary_reads_input_once_per_call() {
    let counter = AtomicUsize::new(0);
    let reads = AtomicUsize::new(0);
    let ternary = Ternary::new(
        from_fn(|| {
            reads.fetch_add(1, Ordering::SeqCst);
            Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
        }),
        |n: &usize| Ok(*n == 1),
        |n: usize| Ok(format!("{n} equals 1")),
        |n: usize| Ok(format!("else: {n}")),
    );
    assert_eq!(ternary.value().unwrap(), "1 equals 1");
    assert_eq!(ternary.value().unwrap(), "else: 2");
    assert_eq!(ternary.value().unwrap(), "else: 3");
    assert_eq!(reads.load(Ordering::SeqCst), 3);
}

#[test]
fn branch_runs_only_chosen_side() {
    let untouched = AtomicUsize::new(0);
    let chosen = branch(
        False,
        from_fn(|| {
            untouched.fetch_add(1, Ordering::SeqCst);
            Ok(6)
        }),
        Constant(16),
    );
    assert_eq!(chosen.value().unwrap(), 16);
    assert_eq!(untouched.load(Ordering::SeqCst), 0);
}

#[test]
fn binary_runs_consequent_when_true() {
    let ran = AtomicUsize::new(0);
    let consequent = || -> Result<()> {
        ran.fetch_add(1, Ordering::SeqCst);
        Ok(())
    };
    assert!(Binary::new(True, consequent).value().unwrap());
    assert!(!Binary::new(False, consequent).value().unwrap());
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn repeated_rejects_non_positive_counts() {
    for count in [0, -1] {
        let calls = AtomicUsize::new(0);
        let repeated = Repeated::new(counted(true, &calls), count);
        let failure = repeated.value().unwrap_err();
        assert!(matches!(
            failure.downcast_ref::<Error>(),
            Some(Error::NonPositiveCount(n)) if *n == count
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

#[test]
fn repeated_runs_exact_count() {
    let calls = AtomicUsize::new(0);
    let repeated = Repeated::new(
        from_fn(|| Ok(calls.fetch_add(1, Ordering::SeqCst))),
        3,
    );
    assert_eq!(repeated.value().unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[test]
fn repeated_stops_at_first_failure() {
    let calls = AtomicUsize::new(0);
    let repeated = Repeated::new(
        from_fn(|| {
            if calls.fetch_add(1, Ordering::SeqCst) == 1 {
                Err(anyhow!("second run failed"))
            } else {
                Ok(())
            }
        }),
        5,
    );
    assert_eq!(repeated.value().unwrap_err().to_string(), "second run failed");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn reduced_concatenates_in_order() {
    let joined = Reduced::of_values(
        |a: String, b: String| Ok(a + &b),
        ["One", "Two", "Three"].map(String::from),
    );
    assert_eq!(joined.value().unwrap(), "OneTwoThree");
}

#[test]
fn folded_changes_type() {
    let lengths = Folded::new(
        Vec::new(),
        |mut acc: Vec<usize>, word: &&str| {
            acc.push(word.len());
            Ok(acc)
        },
        ["a", "bb", "ccc"],
    );
    assert_eq!(lengths.value().unwrap(), [1, 2, 3]);
}

#[test]
fn computations_run_again_unless_sticky() {
    let calls = AtomicUsize::new(0);
    let plain = from_fn(|| Ok(calls.fetch_add(1, Ordering::SeqCst)));
    let both = And::new([
        Box::new(from_fn(|| Ok(plain.value()? < 10))) as BoxedCondition<'_>,
        Box::new(from_fn(|| Ok(plain.value()? < 10))),
    ]);
    assert!(both.value().unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let sticky = Sticky::new(&plain);
    assert_eq!(sticky.value().unwrap(), 2);
    assert_eq!(sticky.value().unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
