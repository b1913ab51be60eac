//! The value ⇄ canonical-text capability.
//!
//! The store is generic over the user value; the engines underneath operate
//! only on opaque text. A [`Codec`] bridges the two, passed at repository
//! construction.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Failure at the codec boundary, surfaced unchanged through the repository.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The value could not be turned into canonical text.
    #[error("encode failed: {0}")]
    Encode(String),
    /// The canonical text could not be turned back into a value.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Maps a user value to and from its canonical text.
///
/// Contract: encoding is deterministic — equal values yield byte-equal text
/// (revision identity depends on it) — and `decode(encode(v))` equals `v`
/// for every value the store accepts.
pub trait Codec<T> {
    /// Produce the canonical text for a value.
    fn encode(&self, value: &T) -> Result<String, CodecError>;
    /// Reconstruct a value from its canonical text.
    fn decode(&self, text: &str) -> Result<T, CodecError>;
}

/// Codec for any serde-serializable value, using pretty-printed JSON.
///
/// Pretty output keeps the canonical text line-oriented, which is what the
/// delta compression feeds on: a one-field change touches one line.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T: Serialize + DeserializeOwned> Codec<T> for JsonCodec {
    fn encode(&self, value: &T) -> Result<String, CodecError> {
        serde_json::to_string_pretty(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(&self, text: &str) -> Result<T, CodecError> {
        serde_json::from_str(text).map_err(|e| CodecError::Decode(e.to_string()))
    }
}
