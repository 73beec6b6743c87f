// Copyright (C) 2024 the freshet authors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core workers for a streaming media server.
//!
//! Two independent pieces:
//!
//! *   [`source`]: a long-running RTSP pull source. It maintains one session
//!     against a remote RTSP URL, publishes the discovered tracks to a parent
//!     path, forwards RTP/RTCP packets to the parent's stream, and retries on
//!     failure until closed.
//! *   [`playback`]: a fragmented-MP4 segment engine for recorded playback.
//!     It locates samples by time inside `.mp4` segments, re-times them onto a
//!     playback timeline, and decides whether consecutive segments can be
//!     served as one continuous stream.
//!
//! Neither piece depends on the enclosing process; the path manager, the
//! playback HTTP server, and the RTSP client transport are reached through
//! the traits each module declares.

#![forbid(clippy::print_stderr, clippy::print_stdout)]

mod error;

pub use error::Error;

/// Wraps the supplied `ErrorInt` and returns it as an `Err`.
macro_rules! bail {
    ($e:expr) => {
        return Err(crate::error::Error(std::sync::Arc::new($e)))
    };
}

macro_rules! wrap {
    ($e:expr) => {
        crate::error::Error(std::sync::Arc::new($e))
    };
}

pub mod playback;
pub mod source;
