//! The fixed per-attempt header that precedes each attempt's payload.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::FetchError;

/// One attempt's framing header, as sent by the serving daemon.
///
/// Wire format, big-endian: a 4-byte length-prefixed UTF-8 path component,
/// an 8-byte compressed length, an 8-byte uncompressed length, and a 4-byte
/// partition number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShuffleHeader {
    pub path_component: String,
    pub compressed_len: i64,
    pub uncompressed_len: i64,
    pub partition: i32,
}

impl ShuffleHeader {
    /// The maximum accepted path-component length, a guard against a
    /// corrupt length prefix causing an unbounded allocation.
    const MAX_PATH_COMPONENT_LEN: u32 = 1 << 20;

    /// Reads one header from the front of `reader`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::BadHeader`] if the stream ends early, the
    /// length prefix is absurd, or the path component is not valid UTF-8.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, FetchError> {
        let path_len = reader
            .read_u32()
            .await
            .map_err(|e| FetchError::bad_header(format!("reading path length: {e}")))?;

        if path_len > Self::MAX_PATH_COMPONENT_LEN {
            return Err(FetchError::bad_header(format!(
                "path component length {path_len} exceeds maximum"
            )));
        }

        let mut path_bytes = vec![0u8; path_len as usize];
        reader
            .read_exact(&mut path_bytes)
            .await
            .map_err(|e| FetchError::bad_header(format!("reading path component: {e}")))?;
        let path_component = String::from_utf8(path_bytes)
            .map_err(|e| FetchError::bad_header(format!("path component not utf-8: {e}")))?;

        let compressed_len = reader
            .read_i64()
            .await
            .map_err(|e| FetchError::bad_header(format!("reading compressed length: {e}")))?;
        let uncompressed_len = reader
            .read_i64()
            .await
            .map_err(|e| FetchError::bad_header(format!("reading uncompressed length: {e}")))?;
        let partition = reader
            .read_i32()
            .await
            .map_err(|e| FetchError::bad_header(format!("reading partition: {e}")))?;

        Ok(Self {
            path_component,
            compressed_len,
            uncompressed_len,
            partition,
        })
    }
}
