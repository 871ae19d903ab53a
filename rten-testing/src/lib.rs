//! Internal testing utilities for rten-symbolic-shapes.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

/// Utility for creating table-driven tests.
///
/// Define a `Debug` struct, conventionally named `Case`, holding the data for
/// one test case, build a collection of cases and call `test_each` with the
/// test function. Every case is run, even if earlier cases panic. If any
/// case fails, `test_each` panics with the number of failures and the debug
/// representation of each failing case.
///
/// ```
/// use rten_testing::TestCases;
///
/// #[derive(Debug)]
/// struct Case {
///     dims: Vec<i64>,
///     expected_len: usize,
/// }
///
/// let cases = [
///     Case { dims: vec![], expected_len: 0 },
///     Case { dims: vec![2, 3], expected_len: 2 },
/// ];
///
/// cases.test_each(|case| {
///     assert_eq!(case.dims.len(), case.expected_len);
/// });
/// ```
///
/// Test cases and the values captured by the test function must be
/// [unwind safe](https://doc.rust-lang.org/std/panic/fn.catch_unwind.html).
/// Values with interior mutability should be created inside the test
/// function, or wrapped with [`AssertUnwindSafe`](std::panic::AssertUnwindSafe).
pub trait TestCases {
    /// The data for a single test case.
    type Case;

    /// Call `test` with a reference to each test case, catching any panics.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Variant of [`test_each`](TestCases::test_each) which passes an owned
    /// clone of each test case to the test function.
    fn test_each_clone(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + Clone + UnwindSafe;
}

fn report_failures<T: Debug>(failures: &[T]) {
    assert_eq!(
        failures.len(),
        0,
        "{} test cases failed: {:?}",
        failures.len(),
        failures
    );
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe,
    {
        let failures: Vec<_> = self
            .into_iter()
            .filter(|case| std::panic::catch_unwind(|| test(case)).is_err())
            .collect();
        report_failures(&failures);
    }

    fn test_each_clone(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + Clone + UnwindSafe,
    {
        let test = &test;
        let failures: Vec<_> = self
            .into_iter()
            .filter(|case| {
                let value = case.clone();
                std::panic::catch_unwind(move || test(value)).is_err()
            })
            .collect();
        report_failures(&failures);
    }
}
