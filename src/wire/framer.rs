//! Validates a [`ShuffleHeader`] against fetcher state and streams the
//! payload it describes into a reserved [`FetchedOutput`].

use indexmap::IndexSet;
use std::collections::HashMap;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tracing::instrument;

use crate::attempt::AttemptId;
use crate::error::FetchError;
use crate::output::fetched::OutputKind;
use crate::output::FetchedOutput;
use crate::wire::codec::CompressionCodec;
use crate::wire::header::ShuffleHeader;

/// Stateless per-attempt wire logic: header validation and payload copy.
///
/// Carries no state of its own — fetcher state (partition, path map,
/// remaining set) is passed in at each call, since it belongs to the
/// [`crate::fetcher::state::FetcherState`] it's validating against.
pub struct WireFramer;

impl WireFramer {
    /// Reads the next header off the stream.
    pub async fn read_header<R: AsyncRead + Unpin>(
        reader: &mut R,
    ) -> Result<ShuffleHeader, FetchError> {
        ShuffleHeader::read_from(reader).await
    }

    /// Runs the post-header sanity checks (§4.2) and resolves the header to
    /// an [`AttemptId`] still owed a report.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::BadHeader`] for negative lengths,
    /// [`FetchError::WrongPartition`] if the header's partition doesn't
    /// match the fetcher's, and [`FetchError::UnexpectedAttempt`] if the
    /// path component doesn't resolve to an attempt still in `remaining`.
    pub fn validate_header(
        header: &ShuffleHeader,
        partition: i32,
        path_to_attempt: &HashMap<String, AttemptId>,
        remaining: &IndexSet<AttemptId>,
    ) -> Result<AttemptId, FetchError> {
        if header.compressed_len < 0 || header.uncompressed_len < 0 {
            return Err(FetchError::bad_header(format!(
                "negative length in header: compressed={}, uncompressed={}",
                header.compressed_len, header.uncompressed_len
            )));
        }

        if header.partition != partition {
            return Err(FetchError::WrongPartition {
                expected: partition,
                actual: header.partition,
            });
        }

        let attempt = path_to_attempt
            .get(&header.path_component)
            .ok_or_else(|| FetchError::UnexpectedAttempt {
                path_component: header.path_component.clone(),
            })?;

        if !remaining.contains(attempt) {
            return Err(FetchError::UnexpectedAttempt {
                path_component: header.path_component.clone(),
            });
        }

        Ok(attempt.clone())
    }

    /// Streams the payload described by `header` into `output`.
    ///
    /// MEMORY: decompresses (if `codec` is not [`CompressionCodec::None`])
    /// and writes exactly `header.uncompressed_len` bytes into the reserved
    /// buffer. DISK: copies exactly `header.compressed_len` bytes verbatim;
    /// the merger decompresses on read.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::PayloadIo`] on a short read, a short write, or
    /// a decompression failure.
    #[instrument(skip(reader, output), fields(kind = ?output.kind()))]
    #[allow(clippy::expect_used)]
    pub async fn stream_payload<R: AsyncRead + Unpin>(
        reader: &mut R,
        header: &ShuffleHeader,
        output: &mut FetchedOutput,
        codec: CompressionCodec,
    ) -> Result<(), FetchError> {
        let path = output.attempt().path_component().to_string();
        let bounded = reader.take(header.compressed_len as u64);

        match output.kind() {
            OutputKind::Memory => {
                let mut decoder = codec.decode(BufReader::new(bounded));
                let buf = output
                    .memory_buffer_mut()
                    .expect("MEMORY output must carry a buffer");
                decoder
                    .read_exact(buf)
                    .await
                    .map_err(|e| FetchError::payload_io(&path, e))?;
                Ok(())
            }
            OutputKind::Disk => {
                let mut bounded = bounded;
                let file = output
                    .disk_file_mut()
                    .expect("DISK output must carry a file handle");
                let copied = tokio::io::copy(&mut bounded, file)
                    .await
                    .map_err(|e| FetchError::payload_io(&path, e))?;
                if copied != header.compressed_len as u64 {
                    return Err(FetchError::payload_io(
                        &path,
                        std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            format!(
                                "expected {} compressed bytes, got {copied}",
                                header.compressed_len
                            ),
                        ),
                    ));
                }
                Ok(())
            }
            OutputKind::Wait => Err(FetchError::payload_io(
                &path,
                std::io::Error::other("cannot stream a payload into a WAIT output"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(path: &str, compressed: i64, uncompressed: i64, partition: i32) -> ShuffleHeader {
        ShuffleHeader {
            path_component: path.to_string(),
            compressed_len: compressed,
            uncompressed_len: uncompressed,
            partition,
        }
    }

    fn fixture() -> (HashMap<String, AttemptId>, IndexSet<AttemptId>) {
        let a = AttemptId::new(0, 0, "path-a".to_string());
        let b = AttemptId::new(1, 0, "path-b".to_string());
        let mut map = HashMap::new();
        map.insert("path-a".to_string(), a.clone());
        map.insert("path-b".to_string(), b.clone());
        let mut remaining = IndexSet::new();
        remaining.insert(a);
        remaining.insert(b);
        (map, remaining)
    }

    #[test]
    fn negative_length_is_rejected() {
        let (map, remaining) = fixture();
        let h = header("path-a", -1, 10, 0);
        let result = WireFramer::validate_header(&h, 0, &map, &remaining);
        assert!(matches!(result, Err(FetchError::BadHeader { .. })));
    }

    #[test]
    fn mismatched_partition_is_rejected() {
        let (map, remaining) = fixture();
        let h = header("path-a", 10, 10, 7);
        let result = WireFramer::validate_header(&h, 0, &map, &remaining);
        assert!(matches!(result, Err(FetchError::WrongPartition { .. })));
    }

    #[test]
    fn unknown_path_component_is_rejected() {
        let (map, remaining) = fixture();
        let h = header("path-zzz", 10, 10, 0);
        let result = WireFramer::validate_header(&h, 0, &map, &remaining);
        assert!(matches!(result, Err(FetchError::UnexpectedAttempt { .. })));
    }

    #[test]
    fn attempt_already_drained_is_rejected() {
        let (map, mut remaining) = fixture();
        let a = map.get("path-a").unwrap().clone();
        remaining.shift_remove(&a);
        let h = header("path-a", 10, 10, 0);
        let result = WireFramer::validate_header(&h, 0, &map, &remaining);
        assert!(matches!(result, Err(FetchError::UnexpectedAttempt { .. })));
    }

    #[test]
    fn well_formed_header_resolves_to_its_attempt() {
        let (map, remaining) = fixture();
        let h = header("path-b", 10, 10, 0);
        let attempt = WireFramer::validate_header(&h, 0, &map, &remaining).unwrap();
        assert_eq!(attempt.input_index(), 1);
    }

    #[tokio::test]
    async fn streams_exact_bytes_into_memory_output() {
        let attempt = AttemptId::new(0, 0, "path-a".to_string());
        let mut output = FetchedOutput::memory(attempt, 5, true);
        let h = header("path-a", 5, 5, 0);
        let mut cursor = std::io::Cursor::new(b"hello".to_vec());

        WireFramer::stream_payload(&mut cursor, &h, &mut output, CompressionCodec::None)
            .await
            .unwrap();
        assert_eq!(output.memory_buffer_mut().unwrap(), b"hello");
    }

    #[tokio::test]
    async fn short_payload_into_memory_output_is_an_io_error() {
        let attempt = AttemptId::new(0, 0, "path-a".to_string());
        let mut output = FetchedOutput::memory(attempt, 10, true);
        let h = header("path-a", 5, 10, 0);
        let mut cursor = std::io::Cursor::new(b"hi".to_vec());

        let result =
            WireFramer::stream_payload(&mut cursor, &h, &mut output, CompressionCodec::None)
                .await;
        assert!(matches!(result, Err(FetchError::PayloadIo { .. })));
    }
}
