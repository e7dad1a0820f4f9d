// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    first  = { 0, 15 },
    second = { 1, 60 },
    third  = { 2, 180 },
    fourth = { 3, 600 },
    capped = { 9, 600 },
)]
fn backoff_increases_then_caps(attempt: u32, expected_secs: u64) {
    assert_eq!(backoff_delay(attempt), Duration::from_secs(expected_secs));
}

#[test]
fn requeue_carries_no_record() {
    let d = Disposition::Requeue {
        attempt: 0,
        delay: Duration::from_secs(15),
    };
    assert!(d.record().is_none());
}
