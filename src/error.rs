// Copyright (C) 2024 the freshet authors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{fmt::Display, sync::Arc};

use thiserror::Error;

/// An opaque `std::error::Error + Send + Sync + 'static` implementation.
///
/// The focus is on detailed human-readable messages; errors are cheap to
/// clone and to ship across task boundaries. The few cases callers are
/// expected to branch on have dedicated predicates
/// ([`Error::is_no_fragments_found`]).
#[derive(Clone)]
pub struct Error(pub(crate) Arc<ErrorInt>);

impl Error {
    /// The supplied configuration can never work (bad URL, bad fingerprint hex).
    pub fn invalid_config<S: Into<String>>(description: S) -> Self {
        Error(Arc::new(ErrorInt::InvalidConfig(description.into())))
    }

    /// Failure establishing or using the transport (connect, TLS, network).
    pub fn transport<S: Into<String>>(description: S) -> Self {
        Error(Arc::new(ErrorInt::Transport {
            description: description.into(),
        }))
    }

    /// An RTSP request failed or the peer violated the protocol.
    pub fn protocol<S: Into<String>>(description: S) -> Self {
        Error(Arc::new(ErrorInt::Protocol {
            description: description.into(),
        }))
    }

    /// The parent refused the readiness handshake.
    pub fn parent_rejected<S: Into<String>>(description: S) -> Self {
        Error(Arc::new(ErrorInt::ParentRejected {
            description: description.into(),
        }))
    }

    /// Returns true for the empty-segment sentinel returned by the segment
    /// engine when a requested window holds no samples. Callers typically
    /// treat this as "skip this segment" rather than as a failure.
    pub fn is_no_fragments_found(&self) -> bool {
        matches!(self.0.as_ref(), ErrorInt::NoFragmentsFound)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.0, f)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error(Arc::new(ErrorInt::Io(e)))
    }
}

#[derive(Debug, Error)]
pub(crate) enum ErrorInt {
    /// The caller supplied configuration that can never work.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("transport failure: {description}")]
    Transport { description: String },

    #[error("protocol failure: {description}")]
    Protocol { description: String },

    #[error("source refused: {description}")]
    ParentRejected { description: String },

    /// Unexpected box tag or truncated header in an fMP4 segment.
    #[error("malformed segment: {description}")]
    MalformedSegment { description: String },

    /// The segment holds no usable `moof`/`mdat` pair for the request.
    #[error("no fragments found")]
    NoFragmentsFound,

    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}
