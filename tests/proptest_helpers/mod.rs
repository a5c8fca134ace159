#![allow(dead_code)]

use std::collections::BTreeSet;

use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(32);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// A manifest's subjects: unique, in arbitrary order.
pub fn arb_subjects(max: u32, max_len: usize) -> impl Strategy<Value = Vec<u32>> {
    prop::collection::btree_set(0..max, 0..=max_len)
        .prop_map(|set| set.into_iter().collect::<Vec<_>>())
        .prop_shuffle()
}

/// Subjects of `first` that appear in every other list, in `first`'s order.
pub fn ordered_intersection(first: &[u32], others: &[&[u32]]) -> Vec<u32> {
    let others: Vec<BTreeSet<u32>> = others
        .iter()
        .map(|subjects| subjects.iter().copied().collect())
        .collect();
    first
        .iter()
        .copied()
        .filter(|s| others.iter().all(|set| set.contains(s)))
        .collect()
}
