//! Per-fetcher state: the assigned batch, lookup tables, and shutdown flag.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;
use tokio::sync::Notify;

use crate::attempt::AttemptId;

/// The sticky shutdown flag plus the `Notify` that lets a blocked `.await`
/// wake up the instant shutdown is requested, instead of waiting for the
/// next cooperative checkpoint to happen to run.
#[derive(Default)]
pub(crate) struct ShutdownSignal {
    flag: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    /// Requests shutdown. Idempotent; safe to call from any thread.
    pub(crate) fn signal(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub(crate) fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `signal` has been called. Checking `is_set` before
    /// awaiting this (as [`Fetcher::race_with_shutdown`](crate::fetcher::Fetcher)
    /// does) avoids the missed-wakeup race where shutdown lands between the
    /// check and the subscribe.
    pub(crate) async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// State for one fetcher's run against one `(host, port, partition)`.
///
/// Invariants (§3): `remaining` only ever shrinks and only loses an entry
/// on a successful commit; every attempt in `remaining` has an entry in
/// `path_to_attempt`; once `shutdown` is observed set it never clears.
pub struct FetcherState {
    pub host: String,
    pub port: u16,
    pub partition: i32,
    pub batch: Vec<AttemptId>,
    pub path_to_attempt: HashMap<String, AttemptId>,
    pub remaining: IndexSet<AttemptId>,
    shutdown: Arc<ShutdownSignal>,
}

impl FetcherState {
    pub(crate) fn new(host: String, port: u16, partition: i32, batch: Vec<AttemptId>) -> Self {
        let path_to_attempt = batch
            .iter()
            .map(|a| (a.path_component().to_string(), a.clone()))
            .collect();
        let remaining = batch.iter().cloned().collect();
        Self {
            host,
            port,
            partition,
            batch,
            path_to_attempt,
            remaining,
            shutdown: Arc::new(ShutdownSignal::default()),
        }
    }

    /// A handle that can be used to request shutdown from another thread
    /// without holding a reference to the fetcher itself.
    pub(crate) fn shutdown_handle(&self) -> Arc<ShutdownSignal> {
        Arc::clone(&self.shutdown)
    }

    /// Whether shutdown has been requested. Sticky: never clears once set.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_set()
    }

    /// Resolves once shutdown has been requested; used to race a blocked
    /// read against shutdown instead of only checking at the next
    /// cooperative checkpoint.
    pub(crate) async fn shutdown_notified(&self) {
        self.shutdown.notified().await;
    }

    /// The path components of the batch, in order, for the `mapOutput` URL.
    pub fn path_components(&self) -> Vec<String> {
        self.batch
            .iter()
            .map(|a| a.path_component().to_string())
            .collect()
    }
}

/// Unassigned builder: only host/port/partition are known.
///
/// Modeling the "work assigned" transition at the type level (§9) means a
/// [`Fetcher`](crate::fetcher::Fetcher) can never be constructed without a
/// batch — there is no runtime flag to forget to check.
pub struct FetcherBuilder {
    host: String,
    port: u16,
    partition: i32,
}

impl FetcherBuilder {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, partition: i32) -> Self {
        Self {
            host: host.into(),
            port,
            partition,
        }
    }

    /// Assigns the batch of attempts this fetcher will drain, producing an
    /// [`AssignedFetcherBuilder`] — the only way to reach `Fetcher::build`.
    #[must_use]
    pub fn assign_batch(self, batch: Vec<AttemptId>) -> AssignedFetcherBuilder {
        AssignedFetcherBuilder {
            host: self.host,
            port: self.port,
            partition: self.partition,
            batch,
        }
    }
}

/// Builder with work assigned; ready for [`FetcherState`] construction.
pub struct AssignedFetcherBuilder {
    host: String,
    port: u16,
    partition: i32,
    batch: Vec<AttemptId>,
}

impl AssignedFetcherBuilder {
    pub(crate) fn build_state(self) -> FetcherState {
        FetcherState::new(self.host, self.port, self.partition, self.batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(n: u32) -> AttemptId {
        AttemptId::new(n, 0, format!("p{n}"))
    }

    #[test]
    fn new_state_has_full_batch_in_remaining() {
        let state = FetcherBuilder::new("host", 1000, 0)
            .assign_batch(vec![attempt(1), attempt(2)])
            .build_state();
        assert_eq!(state.remaining.len(), 2);
        assert!(state.remaining.contains(&attempt(1)));
    }

    #[test]
    fn path_to_attempt_resolves_every_batch_member() {
        let state = FetcherBuilder::new("host", 1000, 0)
            .assign_batch(vec![attempt(1), attempt(2)])
            .build_state();
        assert_eq!(state.path_to_attempt.get("p1"), Some(&attempt(1)));
        assert_eq!(state.path_to_attempt.get("p2"), Some(&attempt(2)));
    }

    #[test]
    fn shutdown_flag_is_sticky() {
        let state = FetcherBuilder::new("host", 1000, 0)
            .assign_batch(vec![attempt(1)])
            .build_state();
        let handle = state.shutdown_handle();
        assert!(!state.is_shutdown());
        handle.signal();
        assert!(state.is_shutdown());
    }
}
