//! Shuffle Fetch
//!
//! A client-side shuffle fetcher: drains intermediate map outputs for one
//! `(host, port, partition)` from a remote serving daemon over HTTP into
//! memory or on-disk destinations, and reports per-attempt success or
//! failure back to a scheduler.
//!
//! # Architecture
//!
//! - [`attempt`] - stable identity of one producer attempt
//! - [`output`] - the reserved-destination model ([`output::FetchedOutput`])
//!   and the allocator that places each attempt in memory or on disk
//! - [`wire`] - the per-attempt header, framing, and decompression codec
//! - [`fetcher`] - the state machine that drives one host's batch
//! - [`callback`] - the event surface delivered back to the scheduler
//! - [`collaborators`] - external interfaces the core depends on but does
//!   not implement (task-output path allocation, the merger)
//! - [`config`] - the client configuration surface
//! - [`hmac_auth`] - outbound request signing and reply verification
//! - [`http`] - `mapOutput` request construction
//!
//! Out of scope (owned by callers): the serving daemon, the merger's
//! sort/merge algorithm, job-level scheduling, metrics transport, and
//! authentication key distribution.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod attempt;
pub mod callback;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod hmac_auth;
pub mod http;
pub mod output;
pub mod wire;

pub use attempt::AttemptId;
pub use callback::{FetchEventSink, FetchResult};
pub use config::{ShuffleClientConfig, ShuffleClientConfigBuilder};
pub use error::FetchError;
pub use fetcher::{Fetcher, FetcherBuilder, ShutdownHandle};
pub use output::{FetchedOutput, MemorySegment, OutputAllocator, OutputKind};
pub use wire::{CompressionCodec, ShuffleHeader, WireFramer};
