//! Whole-store persistence.
//!
//! The repository's durable state — the history list and every snapshot
//! record — travels as gzip-compressed JSON through a [`BlobStore`]
//! capability. Codec, compressor, and config are reattached at load time;
//! they are behavior, not state.

use std::io::{Read, Write};
use std::path::PathBuf;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::Codec;
use crate::compress::BlobCompressor;
use crate::config::EngineConfig;
use crate::repository::Repository;
use crate::snapshot::{RevisionId, Snapshot};

/// Errors while saving or loading a store.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The blob store or the compression stream failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The persisted state could not be (de)serialized.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// The persistable state of a repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryState {
    /// Append-only revision list, oldest first.
    pub history: Vec<RevisionId>,
    /// Every snapshot record (order is not significant).
    pub snapshots: Vec<Snapshot>,
}

/// Where serialized store bytes live.
pub trait BlobStore {
    /// Persist the bytes, replacing any previous content.
    fn save(&self, bytes: &[u8]) -> std::io::Result<()>;
    /// Read the bytes back.
    fn load(&self) -> std::io::Result<Vec<u8>>;
}

/// A [`BlobStore`] backed by a single file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store at the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BlobStore for FileStore {
    fn save(&self, bytes: &[u8]) -> std::io::Result<()> {
        std::fs::write(&self.path, bytes)
    }

    fn load(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }
}

/// Serialize a repository's state into a blob store.
pub fn save_repository<T, C: Codec<T>>(
    repo: &Repository<T, C>,
    store: &dyn BlobStore,
) -> Result<(), PersistError> {
    let json = serde_json::to_vec(&repo.export_state())?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(6));
    encoder.write_all(&json)?;
    let bytes = encoder.finish()?;
    store.save(&bytes)?;
    Ok(())
}

/// Rebuild a repository from a blob store and fresh capabilities.
pub fn load_repository<T, C: Codec<T>>(
    store: &dyn BlobStore,
    codec: C,
    compressor: Box<dyn BlobCompressor>,
    config: EngineConfig,
) -> Result<Repository<T, C>, PersistError> {
    let bytes = store.load()?;
    let mut decoder = GzDecoder::new(&bytes[..]);
    let mut json = Vec::new();
    decoder.read_to_end(&mut json)?;
    let state: RepositoryState = serde_json::from_slice(&json)?;
    Ok(Repository::from_state(state, codec, compressor, config))
}
