//! The patch-blob compression capability.
//!
//! Stored reverse deltas and exchanged patches travel as compressed bytes of
//! the portable patch text; the repository only ever sees the bytes.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use thiserror::Error;

/// Failure to reverse a compressed blob.
#[derive(Debug, Error)]
pub enum CompressError {
    /// The blob is not a valid stream for this compressor.
    #[error("corrupt compressed blob: {0}")]
    Corrupt(#[from] std::io::Error),
    /// Decompressed bytes were not valid UTF-8.
    #[error("decompressed bytes are not valid UTF-8")]
    InvalidUtf8,
}

/// Lossless text-to-bytes compression.
pub trait BlobCompressor {
    /// Compress a patch text.
    fn compress(&self, text: &str) -> Vec<u8>;
    /// Recover the patch text from a compressed blob.
    fn decompress(&self, blob: &[u8]) -> Result<String, CompressError>;
}

/// Gzip-backed compressor.
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: u32,
}

impl GzipCompressor {
    /// Compressor with an explicit level (0-9).
    pub fn new(level: u32) -> Self {
        Self { level }
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new(6)
    }
}

impl BlobCompressor for GzipCompressor {
    fn compress(&self, text: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        encoder
            .write_all(text.as_bytes())
            .expect("writing to an in-memory buffer cannot fail");
        encoder
            .finish()
            .expect("finishing an in-memory gzip stream cannot fail")
    }

    fn decompress(&self, blob: &[u8]) -> Result<String, CompressError> {
        let mut decoder = GzDecoder::new(blob);
        let mut bytes = Vec::new();
        decoder.read_to_end(&mut bytes)?;
        String::from_utf8(bytes).map_err(|_| CompressError::InvalidUtf8)
    }
}

/// Identity passthrough, for tests and hosts that store patches raw.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCompressor;

impl BlobCompressor for NullCompressor {
    fn compress(&self, text: &str) -> Vec<u8> {
        text.as_bytes().to_vec()
    }

    fn decompress(&self, blob: &[u8]) -> Result<String, CompressError> {
        String::from_utf8(blob.to_vec()).map_err(|_| CompressError::InvalidUtf8)
    }
}
