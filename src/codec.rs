//! The compressor boundary: the seam the format calls an "external
//! collaborator". The rest of the crate depends only on [`BlobCodec`], never
//! on the `zstd` crate directly, so the on-disk format's documented
//! independence from ZSTD internals is enforced by the type system.

use std::io;

/// A byte-buffer compressor used to pack/unpack region-file blob payloads.
pub trait BlobCodec: Send + Sync {
    /// Upper bound on the compressed size of a `len`-byte input, used to
    /// size scratch buffers before compressing.
    fn compress_bound(&self, len: usize) -> usize;

    /// Compress `src` at the given level.
    fn compress(&self, src: &[u8], level: i32) -> io::Result<Vec<u8>>;

    /// Decompress `compressed`, which is known to expand to exactly
    /// `expected_len` bytes.
    fn decompress(&self, compressed: &[u8], expected_len: usize) -> io::Result<Vec<u8>>;
}

/// The canonical codec: ZSTD, levels `[1, 22]`, default 3.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZstdCodec;

impl BlobCodec for ZstdCodec {
    fn compress_bound(&self, len: usize) -> usize {
        zstd::zstd_safe::compress_bound(len)
    }

    fn compress(&self, src: &[u8], level: i32) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.compress_bound(src.len()));
        zstd::stream::copy_encode(src, &mut out, level)?;
        Ok(out)
    }

    fn decompress(&self, compressed: &[u8], expected_len: usize) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(expected_len);
        zstd::stream::copy_decode(compressed, &mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zstd_round_trips_arbitrary_bytes() {
        let codec = ZstdCodec;
        let src = b"the quick brown fox jumps over the lazy dog".repeat(50);
        let compressed = codec.compress(&src, 3).unwrap();
        let decompressed = codec.decompress(&compressed, src.len()).unwrap();
        assert_eq!(decompressed, src);
    }

    #[test]
    fn compress_bound_is_not_smaller_than_input_for_tiny_buffers() {
        let codec = ZstdCodec;
        assert!(codec.compress_bound(14) >= 14);
    }
}
