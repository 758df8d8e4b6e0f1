// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_is_recent() {
    let now = SystemClock.epoch_secs();
    // 2020-01-01 in epoch seconds; anything earlier means a broken clock
    assert!(now > 1_577_836_800.0);
}

#[test]
fn fake_clock_advances() {
    let clock = FakeClock::at(100.0);
    assert_eq!(clock.epoch_secs(), 100.0);
    clock.advance(2.5);
    assert_eq!(clock.epoch_secs(), 102.5);
    clock.set(50.0);
    assert_eq!(clock.epoch_secs(), 50.0);
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::new();
    let other = clock.clone();
    clock.advance(10.0);
    assert_eq!(other.epoch_secs(), 10.0);
}
