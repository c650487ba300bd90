// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn fake_clock_advances_both_views() {
    let clock = FakeClock::new();
    let t0 = clock.now();
    let e0 = clock.epoch_ms();

    clock.advance(Duration::from_millis(2_500));

    assert_eq!(clock.now() - t0, Duration::from_millis(2_500));
    assert_eq!(clock.epoch_ms() - e0, 2_500);
}

#[test]
fn fake_clock_epoch_is_settable() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(42);
    assert_eq!(clock.epoch_ms(), 42);
}

#[test]
fn system_clock_epoch_is_nonzero() {
    assert!(SystemClock.epoch_ms() > 0);
}
