//! The optional payload decompression codec.

use async_compression::tokio::bufread::GzipDecoder;
use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, ReadBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

/// Which decompression, if any, applies to a MEMORY destination's payload.
///
/// DISK destinations never decompress (§4.2): the merger decompresses on
/// read, so payload bytes are copied through verbatim regardless of codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionCodec {
    #[default]
    None,
    Gzip,
}

impl CompressionCodec {
    /// Parses a `compressionCodec` configuration value (§6).
    ///
    /// Unknown values fall back to `None` rather than erroring, mirroring
    /// the framer's read-ahead hint treatment of unrecognized knobs as
    /// advisory, not load-bearing.
    #[must_use]
    pub fn from_config_name(name: Option<&str>) -> Self {
        match name {
            Some("gzip") => Self::Gzip,
            _ => Self::None,
        }
    }

    /// Wraps `reader` in the decoding reader this codec calls for.
    pub fn decode<R>(self, reader: R) -> DecodingReader<R>
    where
        R: AsyncBufRead + Unpin,
    {
        match self {
            Self::None => DecodingReader::Identity(reader),
            Self::Gzip => DecodingReader::Gzip(GzipDecoder::new(reader)),
        }
    }
}

/// An `AsyncRead` that optionally decompresses its inner reader, chosen at
/// runtime by [`CompressionCodec`].
pub enum DecodingReader<R> {
    Identity(R),
    Gzip(GzipDecoder<R>),
}

impl<R> AsyncRead for DecodingReader<R>
where
    R: AsyncBufRead + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Self::Identity(r) => Pin::new(r).poll_read(cx, buf),
            Self::Gzip(r) => Pin::new(r).poll_read(cx, buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::io::BufReader;

    #[test]
    fn unknown_codec_name_falls_back_to_none() {
        assert_eq!(CompressionCodec::from_config_name(Some("zstd")), CompressionCodec::None);
        assert_eq!(CompressionCodec::from_config_name(None), CompressionCodec::None);
    }

    #[test]
    fn recognizes_gzip_by_name() {
        assert_eq!(CompressionCodec::from_config_name(Some("gzip")), CompressionCodec::Gzip);
    }

    #[tokio::test]
    async fn identity_codec_passes_bytes_through() {
        let data = b"hello shuffle".to_vec();
        let reader = BufReader::new(std::io::Cursor::new(data.clone()));
        let mut decoded = CompressionCodec::None.decode(reader);
        let mut out = Vec::new();
        decoded.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn gzip_codec_decodes_a_compressed_stream() {
        let mut encoder = flate2_like_encode(b"hello shuffle");
        let reader = BufReader::new(std::io::Cursor::new(encoder.split_off(0)));
        let mut decoded = CompressionCodec::Gzip.decode(reader);
        let mut out = Vec::new();
        decoded.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello shuffle");
    }

    /// Encodes with the standard `gzip` crate so the roundtrip exercises an
    /// independent encoder rather than our own decoder's inverse.
    fn flate2_like_encode(data: &[u8]) -> Vec<u8> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }
}
