//! The result and event callbacks a [`crate::fetcher::Fetcher`] reports to
//! its scheduler.

use crate::attempt::AttemptId;
use crate::output::FetchedOutput;

/// What a fetcher hands back to its scheduler once it stops running.
///
/// `remaining_unfetched` is empty iff the fetcher fully drained its batch.
#[derive(Debug)]
pub struct FetchResult {
    pub host: String,
    pub port: u16,
    pub partition: i32,
    /// Attempts this fetcher never reported success or failure for. The
    /// scheduler is responsible for rescheduling them.
    pub remaining_unfetched: Vec<AttemptId>,
}

/// Per-attempt event delivery to the scheduler.
///
/// A fetcher calls exactly one of these for every [`AttemptId`] it accepted
/// responsibility for — i.e. every attempt not present in the
/// [`FetchResult::remaining_unfetched`] it ultimately returns.
pub trait FetchEventSink: Send + Sync {
    /// One attempt's output was committed successfully.
    fn fetch_succeeded(
        &self,
        host: &str,
        attempt: &AttemptId,
        output: &FetchedOutput,
        compressed_len: i64,
        uncompressed_len: i64,
        elapsed_millis: u64,
    );

    /// One attempt failed. `connect_failed` distinguishes host-level
    /// failures (penalize the host) from per-attempt failures.
    fn fetch_failed(&self, host: &str, attempt: &AttemptId, connect_failed: bool);
}

#[cfg(any(test, feature = "test-support"))]
pub mod fakes {
    //! A [`FetchEventSink`] that records every call, for test assertions.

    use std::sync::Mutex;

    use super::FetchEventSink;
    use crate::attempt::AttemptId;
    use crate::output::FetchedOutput;

    #[derive(Debug, Clone)]
    pub struct Succeeded {
        pub host: String,
        pub attempt: AttemptId,
        pub compressed_len: i64,
        pub uncompressed_len: i64,
    }

    #[derive(Debug, Clone)]
    pub struct Failed {
        pub host: String,
        pub attempt: AttemptId,
        pub connect_failed: bool,
    }

    #[derive(Default)]
    pub struct RecordingEventSink {
        pub succeeded: Mutex<Vec<Succeeded>>,
        pub failed: Mutex<Vec<Failed>>,
    }

    impl RecordingEventSink {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl FetchEventSink for RecordingEventSink {
        fn fetch_succeeded(
            &self,
            host: &str,
            attempt: &AttemptId,
            _output: &FetchedOutput,
            compressed_len: i64,
            uncompressed_len: i64,
            _elapsed_millis: u64,
        ) {
            self.succeeded
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(Succeeded {
                    host: host.to_string(),
                    attempt: attempt.clone(),
                    compressed_len,
                    uncompressed_len,
                });
        }

        fn fetch_failed(&self, host: &str, attempt: &AttemptId, connect_failed: bool) {
            self.failed
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(Failed {
                    host: host.to_string(),
                    attempt: attempt.clone(),
                    connect_failed,
                });
        }
    }
}
