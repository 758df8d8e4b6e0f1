// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    ping = { "ping", true },
    get_value = { "get_value", true },
    run_solver = { "run_solver", true },
)]
fn empty_lists_log_everything(command: &str, expected: bool) {
    let filter = CommandFilter::all();
    assert_eq!(filter.should_log(command), expected);
}

#[parameterized(
    excluded = { "ping", false },
    other_excluded = { "get_bundle", false },
    kept = { "get_value", true },
)]
fn exclude_list_drops_members(command: &str, expected: bool) {
    let filter = CommandFilter::from_lists("", "ping, get_bundle");
    assert_eq!(filter.should_log(command), expected);
}

#[parameterized(
    included = { "run_compute", true },
    not_included = { "ping", false },
    also_not_included = { "get_value", false },
)]
fn include_list_is_exhaustive(command: &str, expected: bool) {
    let filter = CommandFilter::from_lists("run_compute, run_solver", "");
    assert_eq!(filter.should_log(command), expected);
}

#[test]
fn include_wins_over_exclude() {
    // a command in both lists is logged: include takes precedence
    let filter = CommandFilter::from_lists("ping", "ping");
    assert!(filter.should_log("ping"));
    assert!(!filter.should_log("get_value"));
}

#[test]
fn whitespace_and_empty_entries_are_dropped() {
    let filter = CommandFilter::from_lists("", " ping , , get_bundle ,");
    assert!(!filter.should_log("ping"));
    assert!(!filter.should_log("get_bundle"));
    assert!(filter.should_log(""));
}
