//! Error types for the shuffle fetcher.
//!
//! Mirrors the error kinds enumerated in the fetcher's error handling
//! design: every variant here is converted into a `fetch_failed` callback
//! or an un-fetched entry by the caller — none of these propagate out of
//! [`crate::fetcher::Fetcher::run`] as a hard failure.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while fetching one host's batch of attempts.
#[derive(Debug, Error)]
pub enum FetchError {
    /// DNS, TCP, TLS, or HMAC-validation failure during connect.
    ///
    /// Treated as host-level: every attempt in the batch is attributed to
    /// this failure.
    #[error("connect failed for {host}:{port}: {source}")]
    Connect {
        /// Host that refused or failed to connect.
        host: String,
        /// Port that refused or failed to connect.
        port: u16,
        /// Underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The first read after connect failed, or the echoed auth token did
    /// not match what this client sent.
    #[error("validation failed for {host}:{port}: {reason}")]
    Validation {
        /// Host the validation failure occurred against.
        host: String,
        /// Port the validation failure occurred against.
        port: u16,
        /// Human-readable reason (token mismatch, missing header, read error).
        reason: String,
    },

    /// A `ShuffleHeader` was malformed, or its path component did not
    /// resolve to a known attempt.
    #[error("bad header: {reason}")]
    BadHeader {
        /// Human-readable reason.
        reason: String,
    },

    /// Header was well-formed but named a partition other than the one
    /// this fetcher was assigned.
    #[error("wrong partition: expected {expected}, got {actual}")]
    WrongPartition {
        /// Partition this fetcher was assigned.
        expected: i32,
        /// Partition the header actually carried.
        actual: i32,
    },

    /// Header resolved to an [`crate::attempt::AttemptId`] that is no
    /// longer in the fetcher's `remaining` set.
    #[error("unexpected attempt for path component {path_component}")]
    UnexpectedAttempt {
        /// The path component from the header.
        path_component: String,
    },

    /// Short read, checksum/decompression failure, or write failure while
    /// streaming a payload to its destination.
    #[error("payload I/O error for {path_component}: {source}")]
    PayloadIo {
        /// Path component of the attempt being streamed when the error
        /// occurred.
        path_component: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Disk destination creation failed.
    #[error("failed to allocate disk destination at {path}: {source}")]
    Alloc {
        /// Temp path the allocator attempted to create.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Creates a [`FetchError::Connect`].
    pub fn connect(host: impl Into<String>, port: u16, source: reqwest::Error) -> Self {
        Self::Connect {
            host: host.into(),
            port,
            source,
        }
    }

    /// Creates a [`FetchError::Validation`].
    pub fn validation(host: impl Into<String>, port: u16, reason: impl Into<String>) -> Self {
        Self::Validation {
            host: host.into(),
            port,
            reason: reason.into(),
        }
    }

    /// Creates a [`FetchError::BadHeader`].
    pub fn bad_header(reason: impl Into<String>) -> Self {
        Self::BadHeader {
            reason: reason.into(),
        }
    }

    /// Creates a [`FetchError::PayloadIo`].
    pub fn payload_io(path_component: impl Into<String>, source: std::io::Error) -> Self {
        Self::PayloadIo {
            path_component: path_component.into(),
            source,
        }
    }

    /// Creates a [`FetchError::Alloc`].
    pub fn alloc(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Alloc {
            path: path.into(),
            source,
        }
    }
}
