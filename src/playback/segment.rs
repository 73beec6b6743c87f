// Copyright (C) 2024 the freshet authors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Byte-level reader for recorded fMP4 segments.
//!
//! Boxes are walked with a handwritten parser rather than a general-purpose
//! MP4 library: the recorder only ever produces `ftyp moov (moof mdat)*`, and
//! playback touches exactly the boxes named here (`mfhd` is skipped, `tfhd`,
//! `tfdt` and `trun` are decoded, everything else is opaque). A box header is
//! a 4-byte big-endian size (which includes the header itself) followed by a
//! 4-byte tag.

use std::io::{Read, Seek, SeekFrom};
use std::time::{Duration, SystemTime};

use bytes::{Buf, Bytes};

use crate::error::ErrorInt;
use crate::Error;

use super::{
    duration_to_ticks, ticks_to_duration, Muxer, PartSample, CONCATENATION_TOLERANCE,
    SAMPLE_FLAG_IS_NON_SYNC, TIMESCALE,
};

const HEADER_LEN: u64 = 8;

const TRUN_FLAG_DATA_OFFSET: u32 = 0x000001;
const TRUN_FLAG_FIRST_SAMPLE_FLAGS: u32 = 0x000004;
const TRUN_FLAG_SAMPLE_DURATION: u32 = 0x000100;
const TRUN_FLAG_SAMPLE_SIZE: u32 = 0x000200;
const TRUN_FLAG_SAMPLE_FLAGS: u32 = 0x000400;
const TRUN_FLAG_SAMPLE_CTS: u32 = 0x000800;

struct BoxHeader {
    size: u32,
    tag: [u8; 4],
}

fn read_header<R: Read>(r: &mut R) -> std::io::Result<BoxHeader> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(BoxHeader {
        size: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
        tag: [buf[4], buf[5], buf[6], buf[7]],
    })
}

fn malformed<S: Into<String>>(description: S) -> Error {
    wrap!(ErrorInt::MalformedSegment {
        description: description.into(),
    })
}

fn check_size(header: &BoxHeader) -> Result<(), Error> {
    if u64::from(header.size) < HEADER_LEN {
        return Err(malformed(format!(
            "invalid {} box size {}",
            String::from_utf8_lossy(&header.tag),
            header.size
        )));
    }
    Ok(())
}

/// Reads the next box header and requires it to carry the given tag.
fn expect_box<R: Read>(r: &mut R, tag: &[u8; 4]) -> Result<BoxHeader, Error> {
    let header = read_header(r)?;
    if &header.tag != tag {
        return Err(malformed(format!(
            "{} box not found",
            String::from_utf8_lossy(tag)
        )));
    }
    check_size(&header)?;
    Ok(header)
}

/// Reads the payload of a box whose header was just consumed.
fn read_payload<R: Read>(r: &mut R, box_size: u32) -> Result<Vec<u8>, Error> {
    let mut payload = vec![0; box_size as usize - HEADER_LEN as usize];
    r.read_exact(&mut payload)?;
    Ok(payload)
}

fn take_u32(buf: &mut &[u8], what: &str) -> Result<u32, Error> {
    if buf.remaining() < 4 {
        return Err(malformed(format!("truncated {what} box")));
    }
    Ok(buf.get_u32())
}

fn take_u64(buf: &mut &[u8], what: &str) -> Result<u64, Error> {
    if buf.remaining() < 8 {
        return Err(malformed(format!("truncated {what} box")));
    }
    Ok(buf.get_u64())
}

/// Decodes a `tfhd` payload far enough to learn the track id.
fn parse_tfhd<R: Read>(r: &mut R, box_size: u32) -> Result<u32, Error> {
    let payload = read_payload(r, box_size)?;
    let mut buf = &payload[..];
    take_u32(&mut buf, "tfhd")?; // version + flags
    take_u32(&mut buf, "tfhd")
}

/// Decodes a `tfdt` payload, returning the base media decode time.
fn parse_tfdt<R: Read>(r: &mut R, box_size: u32) -> Result<u64, Error> {
    let payload = read_payload(r, box_size)?;
    let mut buf = &payload[..];
    let version = (take_u32(&mut buf, "tfdt")? >> 24) as u8;
    match version {
        0 => Ok(u64::from(take_u32(&mut buf, "tfdt")?)),
        1 => take_u64(&mut buf, "tfdt"),
        v => Err(malformed(format!("unsupported tfdt version {v}"))),
    }
}

struct TrunEntry {
    duration: u32,
    size: u32,
    flags: u32,
    pts_offset: i32,
}

struct Trun {
    data_offset: i32,
    entries: Vec<TrunEntry>,
}

/// Decodes a `trun` payload. Per-sample fields missing from the flag word
/// default to zero; `first_sample_flags` applies to the first sample only.
fn parse_trun<R: Read>(r: &mut R, box_size: u32) -> Result<Trun, Error> {
    let payload = read_payload(r, box_size)?;
    let mut buf = &payload[..];

    let verflags = take_u32(&mut buf, "trun")?;
    let version = (verflags >> 24) as u8;
    let flags = verflags & 0x00ff_ffff;
    let sample_count = take_u32(&mut buf, "trun")?;

    let mut data_offset = 0i32;
    if flags & TRUN_FLAG_DATA_OFFSET != 0 {
        data_offset = take_u32(&mut buf, "trun")? as i32;
    }
    let mut first_sample_flags = None;
    if flags & TRUN_FLAG_FIRST_SAMPLE_FLAGS != 0 {
        first_sample_flags = Some(take_u32(&mut buf, "trun")?);
    }

    let mut entries = Vec::with_capacity(sample_count.min(4096) as usize);
    for i in 0..sample_count {
        let mut entry = TrunEntry {
            duration: 0,
            size: 0,
            flags: 0,
            pts_offset: 0,
        };
        if flags & TRUN_FLAG_SAMPLE_DURATION != 0 {
            entry.duration = take_u32(&mut buf, "trun")?;
        }
        if flags & TRUN_FLAG_SAMPLE_SIZE != 0 {
            entry.size = take_u32(&mut buf, "trun")?;
        }
        if flags & TRUN_FLAG_SAMPLE_FLAGS != 0 {
            entry.flags = take_u32(&mut buf, "trun")?;
        } else if i == 0 {
            entry.flags = first_sample_flags.unwrap_or(0);
        }
        if flags & TRUN_FLAG_SAMPLE_CTS != 0 {
            let raw = take_u32(&mut buf, "trun")?;
            // Unsigned in version 0, signed from version 1 on.
            entry.pts_offset = if version == 0 {
                i32::try_from(raw).map_err(|_| malformed("trun composition offset out of range"))?
            } else {
                raw as i32
            };
        }
        entries.push(entry);
    }
    Ok(Trun {
        data_offset,
        entries,
    })
}

/// Reads the init section (`ftyp` and `moov`, exactly as stored) of the
/// segment. The returned bytes are only ever compared for identity.
pub fn read_init<R: Read + Seek>(r: &mut R) -> Result<Bytes, Error> {
    let ftyp = expect_box(r, b"ftyp")?;
    r.seek(SeekFrom::Start(u64::from(ftyp.size)))?;
    let moov = expect_box(r, b"moov")?;

    r.seek(SeekFrom::Start(0))?;
    let mut buf = vec![0; ftyp.size as usize + moov.size as usize];
    r.read_exact(&mut buf)?;
    Ok(Bytes::from(buf))
}

/// Returns the duration of the segment: the largest elapsed time any track
/// reaches in the last complete `moof`/`mdat` pair.
///
/// Short reads while scanning for that pair are not errors; a truncated
/// trailer (the recorder may have been interrupted mid-flush) simply ends the
/// scan at the last pair that made it to storage. Returns a
/// no-fragments-found error for a segment with no complete pair at all.
pub fn read_max_duration<R: Read + Seek>(r: &mut R) -> Result<Duration, Error> {
    let ftyp = expect_box(r, b"ftyp")?;
    r.seek(SeekFrom::Start(u64::from(ftyp.size)))?;
    let moov = expect_box(r, b"moov")?;
    r.seek(SeekFrom::Current(i64::from(moov.size) - 8))?;

    // Find the last complete moof/mdat pair.
    let mut last_moof_pos = None;
    loop {
        let moof_pos = r.stream_position()?;
        let moof = match read_header(r) {
            Ok(h) => h,
            Err(_) => break,
        };
        if &moof.tag != b"moof" {
            return Err(malformed("moof box not found"));
        }
        check_size(&moof)?;
        if r.seek(SeekFrom::Current(i64::from(moof.size) - 8)).is_err() {
            break;
        }
        let mdat = match read_header(r) {
            Ok(h) => h,
            Err(_) => break,
        };
        if &mdat.tag != b"mdat" {
            return Err(malformed("mdat box not found"));
        }
        check_size(&mdat)?;
        if r.seek(SeekFrom::Current(i64::from(mdat.size) - 8)).is_err() {
            break;
        }
        last_moof_pos = Some(moof_pos);
    }
    let Some(last_moof_pos) = last_moof_pos else {
        bail!(ErrorInt::NoFragmentsFound);
    };

    // Walk the trafs of that last fragment. From here on errors are real:
    // the pair scan above proved these boxes are complete.
    r.seek(SeekFrom::Start(last_moof_pos + HEADER_LEN))?;
    let mfhd = expect_box(r, b"mfhd")?;
    r.seek(SeekFrom::Current(i64::from(mfhd.size) - 8))?;

    let mut max_elapsed: u64 = 0;
    loop {
        let header = read_header(r)?;
        match &header.tag {
            b"mdat" => break,
            b"traf" => {}
            _ => return Err(malformed("traf box not found")),
        }
        let tfhd = expect_box(r, b"tfhd")?;
        r.seek(SeekFrom::Current(i64::from(tfhd.size) - 8))?;
        let tfdt = expect_box(r, b"tfdt")?;
        let base = parse_tfdt(r, tfdt.size)?;
        let trun_header = expect_box(r, b"trun")?;
        let trun = parse_trun(r, trun_header.size)?;

        let elapsed = trun
            .entries
            .iter()
            .fold(base, |t, e| t + u64::from(e.duration));
        max_elapsed = max_elapsed.max(elapsed);
    }
    Ok(ticks_to_duration(max_elapsed, TIMESCALE))
}

enum Window {
    /// First segment of a request: samples before `min` are skipped and the
    /// survivors are re-timed so `min` maps to zero.
    Seek { min: u64 },
    /// Follow-on segment: every sample is emitted, shifted forward onto the
    /// virtual timeline where the previous segment ended.
    Shift { start: u64 },
}

/// Copies samples in `[min_time, max_time)` to the muxer, re-timed so
/// `min_time` maps to zero. Samples before the window are never delivered.
///
/// Returns the elapsed time the segment contributes to the response. Returns
/// a no-fragments-found error if the window contains no samples, which the
/// caller treats as an empty segment.
pub fn seek_and_mux_parts<R, M>(
    r: &mut R,
    min_time: Duration,
    max_time: Duration,
    muxer: &mut M,
) -> Result<Duration, Error>
where
    R: Read + Seek,
    M: Muxer + ?Sized,
{
    mux_window(
        r,
        Window::Seek {
            min: duration_to_ticks(min_time, TIMESCALE),
        },
        duration_to_ticks(max_time, TIMESCALE),
        muxer,
    )
}

/// Copies every sample up to `max_time` to the muxer, shifted forward by
/// `start_time`. Used for segments concatenated onto a previous one, so the
/// first sample lands where the prior segment ended.
pub fn write_parts<R, M>(
    r: &mut R,
    start_time: Duration,
    max_time: Duration,
    muxer: &mut M,
) -> Result<Duration, Error>
where
    R: Read + Seek,
    M: Muxer + ?Sized,
{
    mux_window(
        r,
        Window::Shift {
            start: duration_to_ticks(start_time, TIMESCALE),
        },
        duration_to_ticks(max_time, TIMESCALE),
        muxer,
    )
}

fn mux_window<R, M>(r: &mut R, window: Window, max: u64, muxer: &mut M) -> Result<Duration, Error>
where
    R: Read + Seek,
    M: Muxer + ?Sized,
{
    let mut max_elapsed: u64 = 0;
    let mut wrote_any = false;

    let mut pos: u64 = 0;
    'walk: loop {
        r.seek(SeekFrom::Start(pos))?;
        let header = match read_header(r) {
            Ok(h) => h,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        check_size(&header)?;
        let box_end = pos + u64::from(header.size);
        match &header.tag {
            b"moof" => {
                // Sample payloads are addressed relative to the moof start.
                let moof_offset = pos;
                let mut child_pos = pos + HEADER_LEN;
                while child_pos < box_end {
                    r.seek(SeekFrom::Start(child_pos))?;
                    let child = read_header(r)?;
                    check_size(&child)?;
                    if &child.tag == b"traf" {
                        let tfhd = expect_box(r, b"tfhd")?;
                        let track_id = parse_tfhd(r, tfhd.size)?;
                        let tfdt = expect_box(r, b"tfdt")?;
                        let base = parse_tfdt(r, tfdt.size)?;
                        // Fragments are stored in decode order, so once one
                        // starts at or past the window end nothing later can
                        // fall inside it.
                        if base >= max {
                            break 'walk;
                        }
                        muxer.set_track(track_id);
                        let trun_header = expect_box(r, b"trun")?;
                        let trun = parse_trun(r, trun_header.size)?;

                        let data_pos = moof_offset
                            .checked_add_signed(i64::from(trun.data_offset))
                            .ok_or_else(|| {
                                malformed(format!("invalid trun data offset {}", trun.data_offset))
                            })?;
                        r.seek(SeekFrom::Start(data_pos))?;

                        let mut elapsed = base;
                        for entry in &trun.entries {
                            if elapsed >= max {
                                break;
                            }
                            let mut payload = vec![0; entry.size as usize];
                            r.read_exact(&mut payload)?;
                            let timestamp = match window {
                                Window::Seek { min } => elapsed as i64 - min as i64,
                                Window::Shift { start } => (elapsed + start) as i64,
                            };
                            if timestamp >= 0 {
                                wrote_any = true;
                                muxer.write_sample(
                                    timestamp,
                                    PartSample {
                                        duration: entry.duration,
                                        pts_offset: entry.pts_offset,
                                        is_non_sync: entry.flags & SAMPLE_FLAG_IS_NON_SYNC != 0,
                                        payload: Bytes::from(payload),
                                    },
                                )?;
                            }
                            elapsed += u64::from(entry.duration);
                        }
                        max_elapsed = max_elapsed.max(elapsed);
                    }
                    child_pos += u64::from(child.size);
                }
            }
            b"mdat" => muxer.flush()?,
            _ => {}
        }
        pos = box_end;
    }

    match window {
        Window::Seek { min } => {
            if !wrote_any {
                bail!(ErrorInt::NoFragmentsFound);
            }
            Ok(ticks_to_duration(max_elapsed - min, TIMESCALE))
        }
        Window::Shift { .. } => Ok(ticks_to_duration(max_elapsed, TIMESCALE)),
    }
}

/// Whether a segment starting at `cur_start` may be served as a continuation
/// of one ending at `prev_end`: identical codec parameters (init sections
/// compare equal byte-for-byte) and a boundary within
/// [`CONCATENATION_TOLERANCE`] either way.
pub fn can_concatenate(
    prev_init: &[u8],
    prev_end: SystemTime,
    cur_init: &[u8],
    cur_start: SystemTime,
) -> bool {
    if prev_init != cur_init {
        return false;
    }
    let delta = match cur_start.duration_since(prev_end) {
        Ok(d) => d,
        Err(e) => e.duration(),
    };
    delta <= CONCATENATION_TOLERANCE
}
