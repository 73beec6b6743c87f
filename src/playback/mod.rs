// Copyright (C) 2024 the freshet authors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fragmented-MP4 segment engine for recorded playback.
//!
//! A recorded segment is a byte sequence of `ftyp`, exactly one `moov`, then
//! zero or more `(moof, mdat)` pairs in order. The operations here walk that
//! structure directly: extract the init section ([`read_init`]), read the
//! segment duration ([`read_max_duration`]), and copy samples from a
//! wall-clock window into a [`Muxer`], re-timed onto the playback timeline
//! ([`seek_and_mux_parts`], [`write_parts`]).
//!
//! All timeline math happens at a fixed 90 kHz tick rate ([`TIMESCALE`]);
//! per-track media timescales are never consulted.

use std::time::Duration;

use bytes::Bytes;

use crate::Error;

mod segment;
mod ticks;

pub use segment::{can_concatenate, read_init, read_max_duration, seek_and_mux_parts, write_parts};
pub use ticks::{duration_to_ticks, ticks_to_duration};

/// Tick rate for all engine-level timeline math, in Hz.
pub const TIMESCALE: u32 = 90_000;

/// Wall-clock slack allowed between the end of one segment and the start of
/// the next for the two to still count as continuous. Absorbs jitter in
/// segment boundaries without gluing across real gaps.
pub const CONCATENATION_TOLERANCE: Duration = Duration::from_millis(500);

/// `sample_flags` bit marking a non-sync (non-keyframe) sample,
/// ISO/IEC 14496-12 section 8.8.3.1.
pub(crate) const SAMPLE_FLAG_IS_NON_SYNC: u32 = 1 << 16;

/// One sample copied out of a segment, ready to be re-emitted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartSample {
    /// Duration in [`TIMESCALE`] ticks.
    pub duration: u32,

    /// Signed composition-time (PTS) offset from the decode time, in ticks.
    pub pts_offset: i32,

    /// Whether decoding may *not* begin at this sample.
    pub is_non_sync: bool,

    pub payload: Bytes,
}

/// Sink the segment engine feeds when copying samples.
///
/// The engine is oblivious to how the muxer buffers or serializes; it only
/// promises to select a track before writing to it and to call
/// [`Muxer::flush`] at the end of each source fragment.
pub trait Muxer {
    /// Selects the track subsequent [`Muxer::write_sample`] calls refer to.
    fn set_track(&mut self, track_id: u32);

    /// Emits one sample at the given position on the output timeline, in
    /// [`TIMESCALE`] ticks.
    fn write_sample(&mut self, elapsed: i64, sample: PartSample) -> Result<(), Error>;

    /// Marks the end of the current fragment.
    fn flush(&mut self) -> Result<(), Error>;
}
