//! Places each incoming attempt in memory or on disk under a global memory
//! budget.

use std::sync::Mutex;

use tracing::{debug, instrument};

use crate::attempt::AttemptId;
use crate::collaborators::TaskOutput;
use crate::error::FetchError;
use crate::output::fetched::FetchedOutput;

struct AllocatorState {
    /// Bytes still available in the in-memory shuffle buffer.
    memory_remaining: u64,
}

/// Decides whether each incoming attempt lands in memory or on local disk.
///
/// Safe for concurrent `allocate`/`release` calls from multiple fetchers:
/// the memory counter is protected by a single mutex. The hot path is
/// dominated by I/O, not bookkeeping, so this is not a contention concern.
pub struct OutputAllocator {
    state: Mutex<AllocatorState>,
    /// Per-attempt memory cap: above this, the attempt always goes to disk
    /// regardless of remaining budget.
    max_single_memory_segment_bytes: u64,
}

impl OutputAllocator {
    /// Creates an allocator with a fixed in-memory shuffle budget.
    ///
    /// `max_single_memory_segment_fraction` is the fraction of
    /// `shuffle_buffer_bytes` above which an attempt is always routed to
    /// disk, matching `maxSingleMemorySegmentFraction` (§6).
    #[must_use]
    pub fn new(shuffle_buffer_bytes: u64, max_single_memory_segment_fraction: f64) -> Self {
        let max_single_memory_segment_bytes =
            (shuffle_buffer_bytes as f64 * max_single_memory_segment_fraction) as u64;
        Self {
            state: Mutex::new(AllocatorState {
                memory_remaining: shuffle_buffer_bytes,
            }),
            max_single_memory_segment_bytes,
        }
    }

    /// Bytes still available in the in-memory shuffle buffer.
    #[must_use]
    pub fn memory_remaining(&self) -> u64 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).memory_remaining
    }

    /// Reserves a destination for one attempt.
    ///
    /// Policy: if `uncompressed_len` exceeds the configured max single
    /// memory segment, route to disk. Otherwise attempt to reserve
    /// `uncompressed_len` bytes from the in-memory budget; on success,
    /// return a MEMORY destination; on failure, fall back to disk.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Alloc`] if disk destination creation fails.
    #[instrument(skip(self, task_output), fields(input_index = attempt.input_index()))]
    pub async fn allocate(
        &self,
        attempt: AttemptId,
        uncompressed_len: u64,
        compressed_len: u64,
        primary: bool,
        fetcher_id: u64,
        task_output: &dyn TaskOutput,
    ) -> Result<FetchedOutput, FetchError> {
        debug!(uncompressed_len, compressed_len, "allocating destination");

        if uncompressed_len <= self.max_single_memory_segment_bytes
            && self.try_reserve_memory(uncompressed_len)
        {
            debug!("reserved MEMORY destination");
            return Ok(FetchedOutput::memory(attempt, uncompressed_len, primary));
        }

        self.allocate_disk(attempt, uncompressed_len, primary, fetcher_id, task_output)
            .await
    }

    /// Returns `n_bytes` to the in-memory budget.
    ///
    /// Called when a MEMORY [`FetchedOutput`] is aborted.
    pub fn release(&self, n_bytes: u64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.memory_remaining += n_bytes;
    }

    fn try_reserve_memory(&self, n_bytes: u64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.memory_remaining >= n_bytes {
            state.memory_remaining -= n_bytes;
            true
        } else {
            false
        }
    }

    async fn allocate_disk(
        &self,
        attempt: AttemptId,
        size: u64,
        primary: bool,
        fetcher_id: u64,
        task_output: &dyn TaskOutput,
    ) -> Result<FetchedOutput, FetchError> {
        let canonical_path = task_output
            .get_input_file_for_write(attempt.input_index(), size)
            .map_err(|e| FetchError::alloc(format!("input_{}", attempt.input_index()), e))?;

        // Suffix by fetcher id: the sole mechanism preventing two
        // concurrent fetchers of the same attempt (speculative re-fetch)
        // from corrupting each other's write (§4.1, §5).
        let temp_path = {
            let mut name = canonical_path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_default();
            name.push(format!(".{fetcher_id}"));
            canonical_path.with_file_name(name)
        };

        let file = tokio::fs::File::create(&temp_path)
            .await
            .map_err(|e| FetchError::alloc(temp_path.clone(), e))?;

        debug!(path = %temp_path.display(), "reserved DISK destination");
        Ok(FetchedOutput::disk(
            attempt,
            size,
            primary,
            canonical_path,
            temp_path,
            file,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fakes::TempDirTaskOutput;
    use crate::output::fetched::OutputKind;

    fn attempt(n: u32) -> AttemptId {
        AttemptId::new(n, 0, format!("p{n}"))
    }

    #[tokio::test]
    async fn small_attempt_lands_in_memory() {
        let allocator = OutputAllocator::new(1000, 0.5);
        let dir = tempfile::tempdir().unwrap();
        let task_output = TempDirTaskOutput::new(dir.path());

        let out = allocator
            .allocate(attempt(1), 100, 100, true, 7, &task_output)
            .await
            .unwrap();
        assert_eq!(out.kind(), OutputKind::Memory);
        assert_eq!(allocator.memory_remaining(), 900);
    }

    #[tokio::test]
    async fn oversized_attempt_lands_on_disk() {
        let allocator = OutputAllocator::new(1000, 0.1); // max segment = 100
        let dir = tempfile::tempdir().unwrap();
        let task_output = TempDirTaskOutput::new(dir.path());

        let out = allocator
            .allocate(attempt(1), 300, 300, true, 7, &task_output)
            .await
            .unwrap();
        assert_eq!(out.kind(), OutputKind::Disk);
        // memory budget untouched
        assert_eq!(allocator.memory_remaining(), 1000);
    }

    #[tokio::test]
    async fn exhausted_budget_falls_back_to_disk() {
        let allocator = OutputAllocator::new(100, 1.0);
        let dir = tempfile::tempdir().unwrap();
        let task_output = TempDirTaskOutput::new(dir.path());

        let a = allocator
            .allocate(attempt(1), 80, 80, true, 7, &task_output)
            .await
            .unwrap();
        assert_eq!(a.kind(), OutputKind::Memory);

        // second attempt doesn't fit in the remaining 20 bytes
        let b = allocator
            .allocate(attempt(2), 50, 50, true, 7, &task_output)
            .await
            .unwrap();
        assert_eq!(b.kind(), OutputKind::Disk);
    }

    #[tokio::test]
    async fn abort_releases_memory_reservation() {
        let allocator = OutputAllocator::new(1000, 1.0);
        let dir = tempfile::tempdir().unwrap();
        let task_output = TempDirTaskOutput::new(dir.path());

        let out = allocator
            .allocate(attempt(1), 200, 200, true, 7, &task_output)
            .await
            .unwrap();
        assert_eq!(allocator.memory_remaining(), 800);

        out.abort(&allocator).await;
        assert_eq!(allocator.memory_remaining(), 1000);
    }

    #[tokio::test]
    async fn temp_paths_differ_by_fetcher_id() {
        let allocator = OutputAllocator::new(1000, 0.01); // force disk
        let dir = tempfile::tempdir().unwrap();
        let task_output = TempDirTaskOutput::new(dir.path());

        let a = allocator
            .allocate(attempt(1), 500, 500, true, 1, &task_output)
            .await
            .unwrap();
        let b = allocator
            .allocate(attempt(1), 500, 500, true, 2, &task_output)
            .await
            .unwrap();

        // Both reserved disk destinations for the same attempt; their temp
        // files must be distinct paths on disk.
        assert_eq!(a.kind(), OutputKind::Disk);
        assert_eq!(b.kind(), OutputKind::Disk);
    }
}
