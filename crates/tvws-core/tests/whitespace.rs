// crates/tvws-core/tests/whitespace.rs
// ============================================================================
// Module: Whitespace Summary Tests
// Description: Contiguous-run statistics over free channel sets.
// ============================================================================
//! ## Overview
//! Fixed cases for the run scan plus property checks on arbitrary free sets.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeSet;

use proptest::prelude::*;
use tvws_core::WhitespaceSummary;
use tvws_core::whitespace_summary;

#[test]
fn runs_are_measured_left_to_right() {
    let free: BTreeSet<u32> = [2, 3, 4, 7, 8, 10].into_iter().collect();
    let summary = whitespace_summary(&free, 2, 10);
    assert_eq!(
        summary,
        WhitespaceSummary {
            free_channels: 6,
            run_count: 3,
            min_run_width: 1,
            median_run_width: 2,
            max_run_width: 3,
        }
    );
}

#[test]
fn empty_set_yields_zero_summary() {
    let summary = whitespace_summary(&BTreeSet::new(), 2, 51);
    assert_eq!(summary, WhitespaceSummary::default());
}

#[test]
fn fully_free_range_is_one_run() {
    let free: BTreeSet<u32> = (21 ..= 60).collect();
    let summary = whitespace_summary(&free, 21, 60);
    assert_eq!(summary.run_count, 1);
    assert_eq!(summary.max_run_width, 40);
    assert_eq!(summary.median_run_width, 40);
}

#[test]
fn channels_outside_range_are_ignored() {
    let free: BTreeSet<u32> = [1, 5, 6, 70].into_iter().collect();
    let summary = whitespace_summary(&free, 2, 51);
    assert_eq!(summary.free_channels, 2);
    assert_eq!(summary.run_count, 1);
}

#[test]
fn even_run_count_takes_upper_median() {
    let free: BTreeSet<u32> = [2, 4, 5, 7, 8, 9, 11, 12, 13, 14].into_iter().collect();
    let summary = whitespace_summary(&free, 2, 14);
    assert_eq!(summary.run_count, 4);
    assert_eq!(summary.median_run_width, 3);
}

proptest! {
    #[test]
    fn widths_partition_free_channels(free in prop::collection::btree_set(2_u32 ..= 51, 0 .. 50)) {
        let summary = whitespace_summary(&free, 2, 51);
        prop_assert_eq!(summary.free_channels, free.len());
        if free.is_empty() {
            prop_assert_eq!(summary.run_count, 0);
        } else {
            prop_assert!(summary.run_count >= 1);
            prop_assert!(summary.min_run_width <= summary.median_run_width);
            prop_assert!(summary.median_run_width <= summary.max_run_width);
            prop_assert!(summary.run_count * summary.min_run_width <= summary.free_channels);
            prop_assert!(summary.max_run_width <= summary.free_channels);
        }
    }
}
