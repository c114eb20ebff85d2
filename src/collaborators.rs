//! External collaborator interfaces.
//!
//! The shuffle scheduler, the merger, and the task-output path allocator
//! are out of scope for this crate (§1 Non-goals) but the fetcher and the
//! allocator need to call into them. These traits are the seam: a caller
//! supplies a real implementation, tests supply an in-memory fake.

use std::path::{Path, PathBuf};

use crate::output::fetched::MemorySegment;

/// Provides unique local file paths for an attempt's disk output.
pub trait TaskOutput: Send + Sync {
    /// Returns a locally-unique path for `input_index`'s disk output.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if no path could be allocated.
    fn get_input_file_for_write(
        &self,
        input_index: u32,
        size: u64,
    ) -> Result<PathBuf, std::io::Error>;
}

/// Consumes committed [`crate::output::fetched::FetchedOutput`]s and
/// produces the task's input stream.
pub trait Merger: Send + Sync {
    /// Announces a committed in-memory segment.
    fn close_in_memory_file(&self, segment: MemorySegment);

    /// Announces a committed on-disk file at its canonical path.
    fn close_on_disk_file(&self, path: &Path);

    /// Releases `n_bytes` the merger previously took ownership of via
    /// commit, back to the shuffle input budget.
    ///
    /// Not exercised by the core fetch path — reserved for the merger's own
    /// later bookkeeping once it has consumed a committed segment.
    fn unreserve(&self, n_bytes: u64);
}

#[cfg(any(test, feature = "test-support"))]
pub mod fakes {
    //! In-memory fakes for [`TaskOutput`] and [`Merger`], used by tests.

    use std::path::PathBuf;
    use std::sync::Mutex;

    use super::{Merger, TaskOutput};
    use crate::output::fetched::MemorySegment;

    /// A [`TaskOutput`] that hands out paths under a fixed directory.
    pub struct TempDirTaskOutput {
        dir: PathBuf,
    }

    impl TempDirTaskOutput {
        #[must_use]
        pub fn new(dir: impl Into<PathBuf>) -> Self {
            Self { dir: dir.into() }
        }
    }

    impl TaskOutput for TempDirTaskOutput {
        fn get_input_file_for_write(
            &self,
            input_index: u32,
            _size: u64,
        ) -> Result<PathBuf, std::io::Error> {
            Ok(self.dir.join(format!("attempt_{input_index}.out")))
        }
    }

    /// A [`Merger`] that records everything it was told about, for
    /// assertions in tests.
    #[derive(Default)]
    pub struct RecordingMerger {
        pub memory: Mutex<Vec<MemorySegment>>,
        pub disk: Mutex<Vec<PathBuf>>,
        pub unreserved: Mutex<u64>,
    }

    impl RecordingMerger {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Merger for RecordingMerger {
        fn close_in_memory_file(&self, segment: MemorySegment) {
            self.memory.lock().unwrap_or_else(|e| e.into_inner()).push(segment);
        }

        fn close_on_disk_file(&self, path: &std::path::Path) {
            self.disk
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(path.to_path_buf());
        }

        fn unreserve(&self, n_bytes: u64) {
            *self.unreserved.lock().unwrap_or_else(|e| e.into_inner()) += n_bytes;
        }
    }
}
