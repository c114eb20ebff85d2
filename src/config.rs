//! The configuration surface enumerated in §6: an immutable record built
//! through a builder, serializable so a caller can load it from a file the
//! way the teacher's CLI loads its own run configuration.

use serde::{Deserialize, Serialize};

use crate::wire::CompressionCodec;

const DEFAULT_SHUFFLE_BUFFER_FRACTION: f64 = 0.70;
const DEFAULT_MAX_SINGLE_MEMORY_SEGMENT_FRACTION: f64 = 0.25;
const DEFAULT_MERGE_FRACTION: f64 = 0.66;
const DEFAULT_IFILE_READ_AHEAD_BYTES: u32 = 4 * 1024 * 1024;

/// Immutable client configuration. Construct via [`ShuffleClientConfigBuilder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShuffleClientConfig {
    /// Fraction of container memory devoted to shuffle input buffering.
    pub shuffle_buffer_fraction: f64,
    /// Per-attempt memory cap as a fraction of the shuffle buffer; above
    /// this an attempt is always routed to disk.
    pub max_single_memory_segment_fraction: f64,
    /// Fill threshold at which the merger starts spilling. No effect in
    /// this core; carried for the merger's own bookkeeping.
    pub merge_fraction: f64,
    /// Selects https for the outbound request.
    pub encrypted_transfer: bool,
    /// Reader prefetch hint, paired with `ifile_read_ahead_bytes`.
    pub ifile_read_ahead: bool,
    pub ifile_read_ahead_bytes: u32,
    /// Optional payload decompression codec name (`"gzip"` or absent).
    pub compression_codec: Option<String>,
    /// Total container memory in bytes, used to derive the absolute
    /// shuffle buffer size from `shuffle_buffer_fraction`.
    pub container_memory_bytes: u64,
}

impl ShuffleClientConfig {
    /// The absolute shuffle buffer size in bytes.
    #[must_use]
    pub fn shuffle_buffer_bytes(&self) -> u64 {
        (self.container_memory_bytes as f64 * self.shuffle_buffer_fraction) as u64
    }

    /// The codec this config names, resolved to a [`CompressionCodec`].
    #[must_use]
    pub fn codec(&self) -> CompressionCodec {
        CompressionCodec::from_config_name(self.compression_codec.as_deref())
    }

    #[must_use]
    pub fn builder(container_memory_bytes: u64) -> ShuffleClientConfigBuilder {
        ShuffleClientConfigBuilder::new(container_memory_bytes)
    }
}

/// Builds a [`ShuffleClientConfig`], defaulting every option not explicitly
/// set (§9: prefer an immutable record plus a builder over a mutable,
/// partially-constructed configuration).
#[derive(Debug, Clone)]
pub struct ShuffleClientConfigBuilder {
    container_memory_bytes: u64,
    shuffle_buffer_fraction: f64,
    max_single_memory_segment_fraction: f64,
    merge_fraction: f64,
    encrypted_transfer: bool,
    ifile_read_ahead: bool,
    ifile_read_ahead_bytes: u32,
    compression_codec: Option<String>,
}

impl ShuffleClientConfigBuilder {
    #[must_use]
    pub fn new(container_memory_bytes: u64) -> Self {
        Self {
            container_memory_bytes,
            shuffle_buffer_fraction: DEFAULT_SHUFFLE_BUFFER_FRACTION,
            max_single_memory_segment_fraction: DEFAULT_MAX_SINGLE_MEMORY_SEGMENT_FRACTION,
            merge_fraction: DEFAULT_MERGE_FRACTION,
            encrypted_transfer: false,
            ifile_read_ahead: false,
            ifile_read_ahead_bytes: DEFAULT_IFILE_READ_AHEAD_BYTES,
            compression_codec: None,
        }
    }

    #[must_use]
    pub fn shuffle_buffer_fraction(mut self, fraction: f64) -> Self {
        self.shuffle_buffer_fraction = fraction;
        self
    }

    #[must_use]
    pub fn max_single_memory_segment_fraction(mut self, fraction: f64) -> Self {
        self.max_single_memory_segment_fraction = fraction;
        self
    }

    #[must_use]
    pub fn merge_fraction(mut self, fraction: f64) -> Self {
        self.merge_fraction = fraction;
        self
    }

    #[must_use]
    pub fn encrypted_transfer(mut self, enabled: bool) -> Self {
        self.encrypted_transfer = enabled;
        self
    }

    #[must_use]
    pub fn ifile_read_ahead(mut self, enabled: bool, bytes: u32) -> Self {
        self.ifile_read_ahead = enabled;
        self.ifile_read_ahead_bytes = bytes;
        self
    }

    #[must_use]
    pub fn compression_codec(mut self, codec: impl Into<String>) -> Self {
        self.compression_codec = Some(codec.into());
        self
    }

    #[must_use]
    pub fn build(self) -> ShuffleClientConfig {
        ShuffleClientConfig {
            shuffle_buffer_fraction: self.shuffle_buffer_fraction,
            max_single_memory_segment_fraction: self.max_single_memory_segment_fraction,
            merge_fraction: self.merge_fraction,
            encrypted_transfer: self.encrypted_transfer,
            ifile_read_ahead: self.ifile_read_ahead,
            ifile_read_ahead_bytes: self.ifile_read_ahead_bytes,
            compression_codec: self.compression_codec,
            container_memory_bytes: self.container_memory_bytes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied_when_unset() {
        let config = ShuffleClientConfig::builder(1_000_000).build();
        assert_eq!(config.shuffle_buffer_fraction, DEFAULT_SHUFFLE_BUFFER_FRACTION);
        assert!(!config.encrypted_transfer);
        assert_eq!(config.codec(), CompressionCodec::None);
    }

    #[test]
    fn shuffle_buffer_bytes_derives_from_fraction() {
        let config = ShuffleClientConfig::builder(1000)
            .shuffle_buffer_fraction(0.5)
            .build();
        assert_eq!(config.shuffle_buffer_bytes(), 500);
    }

    #[test]
    fn builder_overrides_are_reflected_in_the_built_config() {
        let config = ShuffleClientConfig::builder(1000)
            .encrypted_transfer(true)
            .compression_codec("gzip")
            .build();
        assert!(config.encrypted_transfer);
        assert_eq!(config.codec(), CompressionCodec::Gzip);
    }

    #[test]
    fn serializes_round_trip_through_json() {
        let config = ShuffleClientConfig::builder(1000).build();
        let json = serde_json::to_string(&config).unwrap();
        let back: ShuffleClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.container_memory_bytes, config.container_memory_bytes);
    }
}
