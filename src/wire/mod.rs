//! The per-attempt wire protocol: header framing, payload streaming, and
//! the optional decompression codec.

pub mod codec;
pub mod framer;
pub mod header;

pub use codec::CompressionCodec;
pub use framer::WireFramer;
pub use header::ShuffleHeader;
