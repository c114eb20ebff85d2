//! The fetcher state machine: connect → validate → drain → report.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures_util::TryStreamExt;
use tokio_util::io::StreamReader;
use tracing::{debug, info, instrument, warn};

use crate::attempt::AttemptId;
use crate::callback::{FetchEventSink, FetchResult};
use crate::collaborators::{Merger, TaskOutput};
use crate::config::ShuffleClientConfig;
use crate::error::FetchError;
use crate::fetcher::state::{AssignedFetcherBuilder, FetcherState, ShutdownSignal};
use crate::http::MapOutputClient;
use crate::output::OutputAllocator;
use crate::wire::WireFramer;

static NEXT_FETCHER_ID: AtomicU64 = AtomicU64::new(1);

/// Drives one host's batch through connect, validate, drain, and report.
///
/// Built only via [`AssignedFetcherBuilder`] — a `Fetcher` cannot exist
/// without an assigned batch (§9).
pub struct Fetcher {
    id: u64,
    state: FetcherState,
    job_id: String,
    http: MapOutputClient,
    allocator: Arc<OutputAllocator>,
    task_output: Arc<dyn TaskOutput>,
    merger: Arc<dyn Merger>,
    event_sink: Arc<dyn FetchEventSink>,
    config: ShuffleClientConfig,
}

/// Tracks whether some terminating path has already attributed a failure,
/// for the end-of-drain sanity check (§7, §9).
#[derive(Default)]
struct TerminationRecord {
    failure_recorded: bool,
}

impl Fetcher {
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        builder: AssignedFetcherBuilder,
        job_id: impl Into<String>,
        http: MapOutputClient,
        allocator: Arc<OutputAllocator>,
        task_output: Arc<dyn TaskOutput>,
        merger: Arc<dyn Merger>,
        event_sink: Arc<dyn FetchEventSink>,
        config: ShuffleClientConfig,
    ) -> Self {
        Self {
            id: NEXT_FETCHER_ID.fetch_add(1, Ordering::Relaxed),
            state: builder.build_state(),
            job_id: job_id.into(),
            http,
            allocator,
            task_output,
            merger,
            event_sink,
            config,
        }
    }

    /// Requests shutdown. Idempotent; safe to call from any thread.
    ///
    /// Sets the sticky shutdown flag and wakes any blocked read via
    /// [`Notify`](tokio::sync::Notify): [`Fetcher::run`] races its header and
    /// payload reads against this wakeup rather than only observing the flag
    /// at the next cooperative checkpoint, so a shutdown that lands mid-read
    /// drops the in-flight future (and, once the fetcher returns, the
    /// underlying socket) instead of waiting for the read to finish.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            signal: self.state.shutdown_handle(),
        }
    }

    /// Races `fut` against shutdown. Returns `None` if shutdown wins (in
    /// which case `fut` is dropped without completing), `Some(output)` if
    /// `fut` completes first.
    ///
    /// Checking `is_shutdown()` before racing closes the missed-wakeup
    /// window: if shutdown already landed, we never start the read at all.
    async fn race_with_shutdown<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        if self.state.is_shutdown() {
            return None;
        }
        tokio::pin!(fut);
        tokio::select! {
            biased;
            () = self.state.shutdown_notified() => None,
            out = &mut fut => Some(out),
        }
    }

    /// Runs the fetcher to completion: connects, validates, drains the
    /// batch, and returns the [`FetchResult`] for the scheduler.
    #[instrument(skip(self), fields(host = %self.state.host, port = self.state.port, partition = self.state.partition))]
    pub async fn run(mut self) -> FetchResult {
        let mut record = TerminationRecord::default();

        let url = match MapOutputClient::build_url(
            self.config.encrypted_transfer,
            &self.state.host,
            self.state.port,
            &self.job_id,
            self.state.partition,
            &self.state.path_components(),
        ) {
            Ok(url) => url,
            Err(reason) => {
                warn!(reason, "failed to build mapOutput url, treating as connect failure");
                return self.fail_all_connect(&mut record);
            }
        };

        let response = match self
            .http
            .connect_and_validate(&self.state.host, self.state.port, &url)
            .await
        {
            Ok(response) => response,
            Err(FetchError::Connect { .. }) => return self.fail_all_connect(&mut record),
            Err(_validation_err) => return self.fail_first_validation(&mut record),
        };

        if self.state.is_shutdown() {
            return self.terminal_shutdown();
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::other(e));
        let mut body = StreamReader::new(stream);

        if self.state.is_shutdown() {
            return self.terminal_shutdown();
        }

        self.drain(&mut body, &mut record).await
    }

    async fn drain<R>(mut self, body: &mut R, record: &mut TerminationRecord) -> FetchResult
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        loop {
            if self.state.remaining.is_empty() {
                break;
            }

            if self.state.is_shutdown() {
                return self.terminal_shutdown();
            }

            let started = Instant::now();

            let header = match self.race_with_shutdown(WireFramer::read_header(body)).await {
                None => return self.terminal_shutdown(),
                Some(Ok(header)) => header,
                Some(Err(_)) => {
                    self.fail_all_remaining_bad_header(record);
                    break;
                }
            };

            let attempt = match WireFramer::validate_header(
                &header,
                self.state.partition,
                &self.state.path_to_attempt,
                &self.state.remaining,
            ) {
                Ok(attempt) => attempt,
                Err(_) => {
                    self.fail_all_remaining_bad_header(record);
                    break;
                }
            };

            if self.state.is_shutdown() {
                return self.terminal_shutdown();
            }

            let mut output = match self
                .allocator
                .allocate(
                    attempt.clone(),
                    header.uncompressed_len.max(0) as u64,
                    header.compressed_len.max(0) as u64,
                    true,
                    self.id,
                    self.task_output.as_ref(),
                )
                .await
            {
                Ok(output) => output,
                Err(_) => {
                    self.fail_one_mid_attempt(record, &attempt);
                    break;
                }
            };

            if self.state.is_shutdown() {
                output.abort(&self.allocator).await;
                return self.terminal_shutdown();
            }

            let codec = self.config.codec();
            match self
                .race_with_shutdown(WireFramer::stream_payload(body, &header, &mut output, codec))
                .await
            {
                None => {
                    output.abort(&self.allocator).await;
                    return self.terminal_shutdown();
                }
                Some(Err(_)) => {
                    output.abort(&self.allocator).await;
                    self.fail_one_mid_attempt(record, &attempt);
                    break;
                }
                Some(Ok(())) => {}
            }

            // The payload read can win its race against shutdown by a hair;
            // re-check before reporting success so a shutdown landing right
            // at completion still aborts the output instead of committing it.
            if self.state.is_shutdown() {
                output.abort(&self.allocator).await;
                return self.terminal_shutdown();
            }

            let elapsed = started.elapsed().as_millis() as u64;
            self.event_sink.fetch_succeeded(
                &self.state.host,
                &attempt,
                &output,
                header.compressed_len,
                header.uncompressed_len,
                elapsed,
            );
            self.state.remaining.shift_remove(&attempt);

            if let Err(e) = output.commit(self.merger.as_ref()).await {
                warn!(attempt = %attempt, error = %e, "commit failed after success was already reported");
            }
        }

        debug!(remaining = self.state.remaining.len(), "drain loop ended");

        if !self.state.remaining.is_empty() {
            assert!(
                record.failure_recorded,
                "fetcher ended with unreported remaining attempts and no recorded failure"
            );
        }

        FetchResult {
            host: self.state.host,
            port: self.state.port,
            partition: self.state.partition,
            remaining_unfetched: self.state.remaining.into_iter().collect(),
        }
    }

    /// Connect failure: every attempt is reported `connectFailed=true`
    /// *and* returned unfetched — the one documented exception to the
    /// otherwise-exactly-once reporting property (§4.3, §8 scenario 3).
    fn fail_all_connect(self, record: &mut TerminationRecord) -> FetchResult {
        for attempt in &self.state.batch {
            self.event_sink.fetch_failed(&self.state.host, attempt, true);
        }
        record.failure_recorded = true;
        FetchResult {
            host: self.state.host,
            port: self.state.port,
            partition: self.state.partition,
            remaining_unfetched: self.state.batch,
        }
    }

    /// Validation failure: only the first attempt is reported failed; the
    /// rest are returned unfetched for rescheduling.
    fn fail_first_validation(mut self, record: &mut TerminationRecord) -> FetchResult {
        if let Some(first) = self.state.remaining.iter().next().cloned() {
            self.event_sink.fetch_failed(&self.state.host, &first, false);
            self.state.remaining.shift_remove(&first);
            record.failure_recorded = true;
        }
        FetchResult {
            host: self.state.host,
            port: self.state.port,
            partition: self.state.partition,
            remaining_unfetched: self.state.remaining.into_iter().collect(),
        }
    }

    /// Bad header / wrong partition / unknown path component: the framer
    /// cannot tell which attempt the bad bytes belonged to, so every
    /// still-remaining attempt is reported failed.
    fn fail_all_remaining_bad_header(&mut self, record: &mut TerminationRecord) {
        for attempt in &self.state.remaining {
            self.event_sink.fetch_failed(&self.state.host, attempt, false);
        }
        self.state.remaining.clear();
        record.failure_recorded = true;
    }

    /// Mid-payload I/O error (or allocation failure) with a resolved
    /// attempt: only that attempt is reported failed; the fetcher
    /// terminates and the rest are returned unfetched.
    fn fail_one_mid_attempt(&mut self, record: &mut TerminationRecord, attempt: &AttemptId) {
        self.event_sink.fetch_failed(&self.state.host, attempt, false);
        self.state.remaining.shift_remove(attempt);
        record.failure_recorded = true;
    }

    fn terminal_shutdown(self) -> FetchResult {
        info!(host = %self.state.host, "fetcher shutting down, suppressing further failure reports");
        FetchResult {
            host: self.state.host,
            port: self.state.port,
            partition: self.state.partition,
            remaining_unfetched: self.state.remaining.into_iter().collect(),
        }
    }
}

/// A cloneable handle to request shutdown of a running [`Fetcher`].
#[derive(Clone)]
pub struct ShutdownHandle {
    signal: Arc<ShutdownSignal>,
}

impl ShutdownHandle {
    /// Requests shutdown. Idempotent; safe to call from any thread. Wakes
    /// any read the fetcher is currently blocked on.
    pub fn shutdown(&self) {
        self.signal.signal();
    }
}
