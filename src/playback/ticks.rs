// Copyright (C) 2024 the freshet authors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exact conversions between real time and media time.
//!
//! Playback stitches many segments onto one timeline, so conversions must not
//! drift: integer arithmetic throughout, and `ticks_to_duration` is the exact
//! inverse of `duration_to_ticks` on whole tick values.

use std::time::Duration;

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Converts a duration to media time at the given timescale, truncating any
/// sub-tick remainder.
pub fn duration_to_ticks(d: Duration, timescale: u32) -> u64 {
    let timescale = u64::from(timescale);
    d.as_secs() * timescale + u64::from(d.subsec_nanos()) * timescale / NANOS_PER_SEC
}

/// Converts media time at the given timescale back to a duration.
///
/// The subsecond part rounds up to the next nanosecond, which makes this the
/// exact inverse of [`duration_to_ticks`]: `duration_to_ticks` truncates, so
/// rounding down here as well would lose one tick per conversion pair.
pub fn ticks_to_duration(v: u64, timescale: u32) -> Duration {
    let timescale = u64::from(timescale);
    let secs = v / timescale;
    let rem = v % timescale;
    let nanos = (rem * NANOS_PER_SEC).div_ceil(timescale);
    Duration::new(secs, nanos as u32)
}
