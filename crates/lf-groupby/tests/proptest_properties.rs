#![forbid(unsafe_code)]

//! Property-based checks for the label index, aligned series, and the
//! aggregation engine.
//!
//! Strategies produce arbitrary but well-formed inputs; each property states
//! an invariant that must hold for all of them.

use std::collections::HashSet;

use proptest::prelude::*;

use lf_groupby::{Aggregate, GroupBySeriesExt, RollingOptions};
use lf_index::{Index, IndexLabel, SortPolicy};
use lf_series::Series;
use lf_types::{ErrorKind, NullKind, ReduceOptions, Scalar};

// ---------------------------------------------------------------------------
// Strategy generators
// ---------------------------------------------------------------------------

/// Finite floats, occasionally missing.
fn arb_value() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        6 => (-1e6_f64..1e6_f64).prop_map(Scalar::Float64),
        1 => Just(Scalar::Null(NullKind::Null)),
        1 => Just(Scalar::Null(NullKind::NaN)),
    ]
}

fn arb_finite_values(max_len: usize) -> impl Strategy<Value = Vec<Scalar>> {
    proptest::collection::vec(
        (-1e6_f64..1e6_f64).prop_map(Scalar::Float64),
        1..max_len,
    )
}

fn arb_label() -> impl Strategy<Value = IndexLabel> {
    prop_oneof![
        3 => (0i64..40).prop_map(IndexLabel::Int64),
        1 => "[a-e]{1,2}".prop_map(IndexLabel::Utf8),
    ]
}

fn dedupe(labels: Vec<IndexLabel>) -> Vec<IndexLabel> {
    let mut seen = HashSet::new();
    labels
        .into_iter()
        .filter(|l| seen.insert(l.clone()))
        .collect()
}

/// Integer labels without repeats.
fn arb_unique_int_labels(max_len: usize) -> impl Strategy<Value = Vec<IndexLabel>> {
    proptest::collection::vec((0i64..40).prop_map(IndexLabel::Int64), 0..max_len)
        .prop_map(dedupe)
}

/// Labels with at least one repeat.
fn arb_duplicated_labels(max_len: usize) -> impl Strategy<Value = Vec<IndexLabel>> {
    proptest::collection::vec(arb_label(), 1..max_len).prop_map(|mut labels| {
        labels.push(labels[0].clone());
        labels
    })
}

fn arb_unique_series(name: &'static str, max_len: usize) -> impl Strategy<Value = Series> {
    arb_unique_int_labels(max_len).prop_flat_map(move |labels| {
        let len = labels.len();
        proptest::collection::vec(arb_value(), len).prop_map(move |values| {
            Series::from_values(name, labels.clone(), values)
                .expect("labels and values have equal length")
        })
    })
}

fn arb_sorted_int_index(max_len: usize) -> impl Strategy<Value = Index> {
    proptest::collection::btree_set(-50i64..50, 1..max_len)
        .prop_map(|set| Index::from_i64(set.into_iter().collect()))
}

fn close(left: f64, right: f64, scale: f64) -> bool {
    (left - right).abs() <= 1e-9 * (1.0 + scale)
}

// ---------------------------------------------------------------------------
// Property: uniqueness invariant
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Label lookup and set algebra refuse indexes with repeats.
    #[test]
    fn prop_duplicates_fail_keyed_operations(labels in arb_duplicated_labels(12)) {
        let index = Index::new(labels.clone());
        let other = Index::new(vec![IndexLabel::Int64(0)]);
        for label in &labels {
            prop_assert_eq!(
                index.index_of(label).map_err(|e| e.kind()),
                Err(ErrorKind::KeyError)
            );
            prop_assert_eq!(
                index.loc(label).map_err(|e| e.kind()),
                Err(ErrorKind::KeyError)
            );
        }
        for result in [
            index.union(&other, SortPolicy::Default),
            index.intersection(&other, SortPolicy::Default),
            index.difference(&other, SortPolicy::Default),
            other.union(&index, SortPolicy::Never),
        ] {
            prop_assert_eq!(result.map_err(|e| e.kind()).err(), Some(ErrorKind::KeyError));
        }
    }

    /// Unique indexes answer every member label with its position.
    #[test]
    fn prop_unique_index_resolves_members(labels in arb_unique_int_labels(20)) {
        let index = Index::new(labels.clone());
        prop_assert!(index.is_unique());
        for (pos, label) in labels.iter().enumerate() {
            prop_assert_eq!(index.index_of(label), Ok(pos));
        }
        prop_assert!(index.union(&index, SortPolicy::Default).is_ok());
    }
}

// ---------------------------------------------------------------------------
// Property: alignment is an outer join
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Every label of either operand appears once in the sum, and only labels
    /// present on both sides carry a combined value.
    #[test]
    fn prop_addition_outer_joins(
        left in arb_unique_series("left", 12),
        right in arb_unique_series("right", 12),
    ) {
        let out = left.add(&right).expect("unique operands align");
        let mut expected: HashSet<IndexLabel> = left.index().labels().iter().cloned().collect();
        expected.extend(right.index().labels().iter().cloned());

        prop_assert!(out.index().is_unique());
        prop_assert_eq!(out.len(), expected.len());

        for (label, value) in out.iter() {
            prop_assert!(expected.contains(label));
            match (left.loc(label), right.loc(label)) {
                (Ok(a), Ok(b)) => match (a.as_f64(), b.as_f64()) {
                    (Some(a), Some(b)) => prop_assert_eq!(value, &Scalar::from_f64(a + b)),
                    _ => prop_assert!(value.is_missing()),
                },
                _ => prop_assert!(value.is_missing()),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Property: as-of lookup agrees with a linear scan
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_asof_matches_linear_scan(index in arb_sorted_int_index(20), target in -60i64..60) {
        let expected = index
            .labels()
            .iter()
            .rev()
            .find(|l| matches!(l, IndexLabel::Int64(v) if *v <= target));
        match expected {
            Some(label) => prop_assert_eq!(index.asof(&IndexLabel::Int64(target)), Ok(label)),
            None => prop_assert_eq!(
                index.asof(&IndexLabel::Int64(target)).map_err(|e| e.kind()).err(),
                Some(ErrorKind::OutOfRange)
            ),
        }
    }

    /// Descending indexes also resolve to the largest label not above the target.
    #[test]
    fn prop_descending_asof_matches_linear_scan(
        index in arb_sorted_int_index(20),
        target in -60i64..60,
    ) {
        let reversed = index.reverse();
        let expected = reversed
            .labels()
            .iter()
            .find(|l| matches!(l, IndexLabel::Int64(v) if *v <= target));
        match expected {
            Some(label) => prop_assert_eq!(reversed.asof(&IndexLabel::Int64(target)), Ok(label)),
            None => prop_assert_eq!(
                reversed.asof(&IndexLabel::Int64(target)).map_err(|e| e.kind()).err(),
                Some(ErrorKind::OutOfRange)
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Property: round trips and ordering
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn prop_reverse_twice_is_identity(labels in proptest::collection::vec(arb_label(), 0..20)) {
        let index = Index::new(labels);
        prop_assert_eq!(index.reverse().reverse(), index);
    }

    /// Sorted numeric values are non-decreasing with missing values last.
    #[test]
    fn prop_sort_values_is_monotone(values in proptest::collection::vec(arb_value(), 0..30)) {
        let series = Series::new(values.clone());
        let sorted = series.sort_values().expect("numeric values are comparable");
        prop_assert_eq!(sorted.len(), values.len());

        let present: Vec<f64> = sorted.values().iter().filter_map(Scalar::as_f64).collect();
        prop_assert!(present.windows(2).all(|w| w[0] <= w[1]));
        prop_assert!(
            sorted.values()[present.len()..].iter().all(Scalar::is_missing),
            "missing values must trail"
        );
        prop_assert_eq!(series.values(), values.as_slice());
    }
}

// ---------------------------------------------------------------------------
// Property: grouping conserves totals
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn prop_group_sums_add_up(values in arb_finite_values(40), modulus in 1usize..6) {
        let series = Series::new(values.clone());
        let grouper = series.groupby(|_, pos, _| (pos % modulus) as i64);

        let distinct: HashSet<usize> = (0..values.len()).map(|p| p % modulus).collect();
        prop_assert_eq!(grouper.len(), distinct.len());

        let sums = grouper.sum().expect("sum over groups");
        let regrouped: f64 = sums.values().iter().filter_map(Scalar::as_f64).sum();
        let total = series.sum().as_f64().expect("non-empty finite input");
        let scale: f64 = values.iter().filter_map(Scalar::as_f64).map(f64::abs).sum();
        prop_assert!(close(regrouped, total, scale), "{regrouped} != {total}");

        let members: usize = grouper.groups().iter().map(|g| g.values.len()).sum();
        prop_assert_eq!(members, values.len());
    }
}

// ---------------------------------------------------------------------------
// Property: rolling window boundary
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn prop_rolling_sum_matches_window_recomputation(
        values in proptest::collection::vec(arb_value(), 0..30),
        window in 1usize..8,
    ) {
        let series = Series::new(values.clone());
        let out = series
            .rolling(RollingOptions::new(window))
            .expect("positive window")
            .sum()
            .expect("sum over windows");

        prop_assert_eq!(out.index(), series.index());
        for (i, value) in out.values().iter().enumerate() {
            if i + 1 < window {
                prop_assert_eq!(value, &Scalar::nan());
            } else {
                let expected = lf_types::nansum(&values[i + 1 - window..=i], ReduceOptions::default());
                prop_assert_eq!(value, &expected);
            }
        }
    }
}
