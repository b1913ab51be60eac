//! The version-control store.
//!
//! A [`Repository`] records successive snapshots of a serializable value,
//! reconstructs any prior snapshot on demand, and exchanges changes between
//! stores as portable [`RepositoryPatch`] blobs.
//!
//! Its defining property is compactness: after each new snapshot, the
//! immediate predecessor is rewritten as a **reverse delta** — a compressed
//! patch pointing forward at the new revision — whenever that is smaller
//! than keeping its full text. Restoration walks the delta chain forward to
//! the nearest complete snapshot and applies the patches backward, so the
//! newest revision is always one O(1) text read away.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::codec::{Codec, CodecError};
use crate::compress::{BlobCompressor, CompressError, GzipCompressor};
use crate::config::EngineConfig;
use crate::encoding::{patches_from_text, patches_to_text, EncodingError};
use crate::patch;
use crate::snapshot::{RevisionId, Snapshot, SnapshotBody, SnapshotStore};

/// How many subsequent revisions the optimization pass considers as delta
/// targets for each entry.
pub const NEAREST_RANGE: usize = 12;

/// Errors surfaced by repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The revision id is not in the store.
    #[error("revision {0} not found")]
    RevisionNotFound(RevisionId),
    /// No revision is old enough for the requested date.
    #[error("no revision at or before {0}")]
    NoRevisionBefore(DateTime<Utc>),
    /// The repository holds no snapshots yet.
    #[error("repository has no snapshots")]
    EmptyHistory,
    /// The codec rejected a value or text.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// A compressed patch blob could not be reversed.
    #[error(transparent)]
    Compress(#[from] CompressError),
    /// A portable patch text could not be parsed.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}

/// A portable, compressed patch blob exchanged between stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryPatch {
    compressed: Vec<u8>,
}

impl RepositoryPatch {
    /// Wrap a patch text using the given compressor.
    pub fn from_text(text: &str, compressor: &dyn BlobCompressor) -> Self {
        Self {
            compressed: compressor.compress(text),
        }
    }

    /// Recover the portable patch text.
    pub fn to_text(&self, compressor: &dyn BlobCompressor) -> Result<String, CompressError> {
        compressor.decompress(&self.compressed)
    }

    /// Wrap already-compressed bytes received from another store.
    pub fn from_bytes(compressed: Vec<u8>) -> Self {
        Self { compressed }
    }

    /// The compressed bytes, for transport.
    pub fn as_bytes(&self) -> &[u8] {
        &self.compressed
    }

    /// Compressed size in bytes. For cross-version interoperability compare
    /// the text from [`RepositoryPatch::to_text`] instead.
    pub fn len(&self) -> usize {
        self.compressed.len()
    }

    /// Whether the blob is empty.
    pub fn is_empty(&self) -> bool {
        self.compressed.is_empty()
    }
}

/// An in-memory version-control store for values of type `T`.
pub struct Repository<T, C: Codec<T>> {
    history: Vec<RevisionId>,
    store: SnapshotStore,
    codec: C,
    compressor: Box<dyn BlobCompressor>,
    config: EngineConfig,
    _value: PhantomData<fn() -> T>,
}

impl<T, C: Codec<T>> Repository<T, C> {
    /// A repository with gzip compression and the default store config.
    pub fn new(codec: C) -> Self {
        Self::with_parts(codec, Box::new(GzipCompressor::default()), Self::default_config())
    }

    /// A repository with an explicit compressor and engine config.
    pub fn with_parts(codec: C, compressor: Box<dyn BlobCompressor>, config: EngineConfig) -> Self {
        Self {
            history: Vec::new(),
            store: SnapshotStore::new(),
            codec,
            compressor,
            config,
            _value: PhantomData,
        }
    }

    /// The store's default engine config: a higher edit cost than the engine
    /// default, producing chunkier patches that compress better.
    pub fn default_config() -> EngineConfig {
        EngineConfig {
            diff_edit_cost: 6,
            ..EngineConfig::default()
        }
    }

    /// Record a new snapshot of `value` and return its revision id.
    ///
    /// The previous newest snapshot is rewritten as a reverse delta against
    /// the new one when that is strictly smaller; otherwise it stays
    /// complete. Compaction never reports failure: if it cannot win space,
    /// it is skipped.
    pub fn make_snapshot(&mut self, value: &T) -> Result<RevisionId, RepositoryError> {
        let text = self.codec.encode(value)?;
        let revision = RevisionId::of_text(&text);
        self.store.put(Snapshot::complete(revision.clone(), text.clone()));
        self.history.push(revision.clone());

        if self.history.len() > 1 {
            let previous = self.history[self.history.len() - 2].clone();
            if previous != revision {
                let previous_size = self
                    .store
                    .get(&previous)
                    .map(Snapshot::size)
                    .unwrap_or_default();
                let previous_text = self.restore_text(&previous)?;
                // Counter patch: applied to the new text it returns to the
                // previous version.
                let delta = patch::make(&text, &previous_text, &self.config);
                let compressed = self.compressor.compress(&patches_to_text(&delta));
                if compressed.len() < previous_size {
                    debug!(
                        revision = %previous,
                        delta = compressed.len(),
                        gain = previous_size - compressed.len(),
                        "compacted predecessor to reverse delta"
                    );
                    self.store.convert_to_delta(&previous, revision.clone(), compressed);
                } else {
                    trace!(revision = %previous, size = previous_size, "kept complete snapshot");
                }
            }
        }

        Ok(revision)
    }

    /// Reconstruct the value stored under `revision`.
    pub fn restore(&self, revision: &RevisionId) -> Result<T, RepositoryError> {
        let text = self.restore_text(revision)?;
        Ok(self.codec.decode(&text)?)
    }

    /// Reconstruct the canonical text stored under `revision` by walking the
    /// delta chain forward to a complete snapshot and applying the patches
    /// backward.
    fn restore_text(&self, revision: &RevisionId) -> Result<String, RepositoryError> {
        let mut chain: Vec<&Snapshot> = Vec::new();
        let mut snapshot = self
            .store
            .get(revision)
            .ok_or_else(|| RepositoryError::RevisionNotFound(revision.clone()))?;
        let mut text = loop {
            match &snapshot.body {
                SnapshotBody::Complete { text } => break text.clone(),
                SnapshotBody::Delta { future_rev, .. } => {
                    chain.push(snapshot);
                    // A dangling forward pointer is an internal consistency
                    // violation, not a caller error.
                    snapshot = self
                        .store
                        .get(future_rev)
                        .unwrap_or_else(|| panic!("delta target {future_rev} missing from store"));
                }
            }
        };
        for snapshot in chain.iter().rev() {
            let SnapshotBody::Delta { patch: blob, .. } = &snapshot.body else {
                unreachable!("chain holds only deltas");
            };
            let patches = patches_from_text(&self.compressor.decompress(blob)?)?;
            let (patched, results) = patch::apply(&patches, &text, &self.config);
            // Deltas were computed against exact endpoint text; they cannot
            // legally fail to apply.
            assert!(
                results.iter().all(|&applied| applied),
                "reverse delta for revision {} failed to apply",
                snapshot.revision
            );
            text = patched;
        }
        Ok(text)
    }

    /// The newest revision id, if any snapshot exists.
    pub fn latest_revision(&self) -> Option<&RevisionId> {
        self.history.last()
    }

    /// Reconstruct the newest value.
    pub fn latest(&self) -> Result<T, RepositoryError> {
        let revision = self.latest_revision().ok_or(RepositoryError::EmptyHistory)?;
        self.restore(revision)
    }

    /// The append-only list of revision ids, oldest first.
    pub fn history(&self) -> &[RevisionId] {
        &self.history
    }

    /// Build a portable patch that carries the change from `rev1` to `rev2`.
    pub fn patch_between(
        &self,
        rev1: &RevisionId,
        rev2: &RevisionId,
    ) -> Result<RepositoryPatch, RepositoryError> {
        let text1 = self.restore_text(rev1)?;
        let text2 = self.restore_text(rev2)?;
        let patches = patch::make(&text1, &text2, &self.config);
        Ok(RepositoryPatch::from_text(
            &patches_to_text(&patches),
            self.compressor.as_ref(),
        ))
    }

    /// Apply an externally produced patch to the newest value, snapshot the
    /// result, and return it.
    ///
    /// Application is fuzzy by design: individual patch hunks may fail to
    /// place without aborting the operation.
    pub fn apply_patch(&mut self, incoming: &RepositoryPatch) -> Result<T, RepositoryError> {
        let revision = self
            .latest_revision()
            .ok_or(RepositoryError::EmptyHistory)?
            .clone();
        let text = self.restore_text(&revision)?;
        let patches = patches_from_text(&incoming.to_text(self.compressor.as_ref())?)?;
        let (patched, results) = patch::apply(&patches, &text, &self.config);
        let failed = results.iter().filter(|&&applied| !applied).count();
        if failed > 0 {
            warn!(failed, total = results.len(), "some patch hunks did not apply");
        }
        let value = self.codec.decode(&patched)?;
        self.make_snapshot(&value)?;
        Ok(value)
    }

    /// The newest revision whose snapshot was taken at or before `when`.
    pub fn revision_before(&self, when: DateTime<Utc>) -> Result<RevisionId, RepositoryError> {
        let mut result = None;
        for revision in &self.history {
            let snapshot = self
                .store
                .get(revision)
                .unwrap_or_else(|| panic!("history entry {revision} missing from store"));
            if snapshot.created_at > when {
                // History is ordered; everything further is newer still.
                break;
            }
            result = Some(revision.clone());
        }
        result.ok_or(RepositoryError::NoRevisionBefore(when))
    }

    /// Reconstruct the value as of `when`.
    pub fn restore_before(&self, when: DateTime<Utc>) -> Result<T, RepositoryError> {
        let revision = self.revision_before(when)?;
        self.restore(&revision)
    }

    /// Total storage footprint in bytes across all snapshots.
    pub fn size(&self) -> usize {
        self.store.total_size()
    }

    /// Offline compaction sweep.
    ///
    /// For each revision except the newest, tries rewriting it as a reverse
    /// delta against each of the next [`NEAREST_RANGE`]` - 1` revisions in
    /// insertion order, keeping the smallest candidate that is strictly
    /// smaller than the current entry. Delta targets are always newer
    /// revisions that do not route back through the entry being rewritten,
    /// so every snapshot keeps a forward path to a complete one.
    pub fn optimize(&mut self) -> Result<usize, RepositoryError> {
        if self.history.len() < 2 {
            return Ok(0);
        }
        let mut rewritten = 0;
        for i in 0..self.history.len() - 1 {
            let revision = self.history[i].clone();
            let Some(current_size) = self.store.get(&revision).map(Snapshot::size) else {
                continue;
            };
            let current_text = self.restore_text(&revision)?;
            let mut best: Option<(RevisionId, Vec<u8>)> = None;
            let mut best_size = current_size;
            for j in i + 1..(i + NEAREST_RANGE).min(self.history.len()) {
                let target = self.history[j].clone();
                if target == revision || self.delta_chain_contains(&target, &revision) {
                    continue;
                }
                let target_text = self.restore_text(&target)?;
                let delta = patch::make(&target_text, &current_text, &self.config);
                let compressed = self.compressor.compress(&patches_to_text(&delta));
                if compressed.len() < best_size {
                    best_size = compressed.len();
                    best = Some((target, compressed));
                }
            }
            if let Some((target, compressed)) = best {
                debug!(
                    revision = %revision,
                    target = %target,
                    size = best_size,
                    was = current_size,
                    "rewrote snapshot as reverse delta"
                );
                self.store.convert_to_delta(&revision, target, compressed);
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }

    /// Whether the delta chain starting at `start` passes through `needle`.
    fn delta_chain_contains(&self, start: &RevisionId, needle: &RevisionId) -> bool {
        let mut cursor = start.clone();
        // Chains are acyclic and bounded by the store size.
        for _ in 0..self.store.len() {
            if cursor == *needle {
                return true;
            }
            match self.store.get(&cursor).map(|s| &s.body) {
                Some(SnapshotBody::Delta { future_rev, .. }) => cursor = future_rev.clone(),
                _ => return false,
            }
        }
        true
    }

    /// Direct access to a stored snapshot record.
    pub fn snapshot(&self, revision: &RevisionId) -> Option<&Snapshot> {
        self.store.get(revision)
    }

    /// Detach the persistable state: history plus all snapshot records.
    pub fn export_state(&self) -> crate::persist::RepositoryState {
        crate::persist::RepositoryState {
            history: self.history.clone(),
            snapshots: self.store.iter().cloned().collect(),
        }
    }

    /// Rebuild a repository from persisted state and fresh capabilities.
    pub fn from_state(
        state: crate::persist::RepositoryState,
        codec: C,
        compressor: Box<dyn BlobCompressor>,
        config: EngineConfig,
    ) -> Self {
        let mut store = SnapshotStore::new();
        for snapshot in state.snapshots {
            store.put(snapshot);
        }
        Self {
            history: state.history,
            store,
            codec,
            compressor,
            config,
            _value: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::compress::NullCompressor;

    fn string_repo() -> Repository<String, JsonCodec> {
        Repository::new(JsonCodec)
    }

    #[test]
    fn test_snapshot_and_restore_single() {
        let mut repo = string_repo();
        let rev = repo.make_snapshot(&"hello".to_string()).unwrap();
        assert_eq!(repo.restore(&rev).unwrap(), "hello");
        assert_eq!(repo.latest().unwrap(), "hello");
        assert_eq!(repo.history(), &[rev]);
    }

    #[test]
    fn test_restore_unknown_revision_fails() {
        let repo = string_repo();
        let missing = RevisionId::of_text("nothing");
        assert!(matches!(
            repo.restore(&missing),
            Err(RepositoryError::RevisionNotFound(_))
        ));
    }

    #[test]
    fn test_latest_on_empty_fails() {
        let repo = string_repo();
        assert!(matches!(repo.latest(), Err(RepositoryError::EmptyHistory)));
    }

    #[test]
    fn test_revision_ids_are_content_hashes() {
        let mut repo = string_repo();
        let rev = repo.make_snapshot(&"abc".to_string()).unwrap();
        // JSON canonical text of "abc" is "\"abc\"".
        assert_eq!(rev, RevisionId::of_text("\"abc\""));
    }

    #[test]
    fn test_identical_snapshots_share_a_revision() {
        let mut repo = string_repo();
        let rev1 = repo.make_snapshot(&"same".to_string()).unwrap();
        let rev2 = repo.make_snapshot(&"same".to_string()).unwrap();
        assert_eq!(rev1, rev2);
        assert_eq!(repo.history().len(), 2);
        assert_eq!(repo.restore(&rev1).unwrap(), "same");
    }

    #[test]
    fn test_compaction_keeps_every_revision_restorable() {
        let mut repo = string_repo();
        let base = "line one\nline two\nline three\nline four\nline five\n".repeat(4);
        let mut revisions = Vec::new();
        let mut expected = Vec::new();
        for i in 0..8 {
            let value = format!("{base}revision marker {i}\n");
            revisions.push(repo.make_snapshot(&value).unwrap());
            expected.push(value);
        }
        for (rev, value) in revisions.iter().zip(&expected) {
            assert_eq!(&repo.restore(rev).unwrap(), value);
        }
        // Only the newest snapshot still holds its complete text.
        let newest = repo.latest_revision().unwrap();
        assert!(repo.snapshot(newest).unwrap().is_complete());
        let delta_count = revisions
            .iter()
            .filter(|rev| !repo.snapshot(rev).unwrap().is_complete())
            .count();
        assert!(delta_count >= 6, "expected most predecessors compacted");
    }

    #[test]
    fn test_size_grows_by_at_most_the_new_complete_entry() {
        let mut repo = string_repo();
        let base = "alpha\nbeta\ngamma\ndelta\n".repeat(8);
        repo.make_snapshot(&base).unwrap();
        for i in 0..5 {
            let before = repo.size();
            let value = format!("{base}tail {i}\n");
            let rev = repo.make_snapshot(&value).unwrap();
            let new_entry = repo.snapshot(&rev).unwrap().size();
            assert!(
                repo.size() <= before + new_entry,
                "size must not grow past the new complete entry"
            );
        }
    }

    #[test]
    fn test_optimize_preserves_history_and_shrinks() {
        let mut repo = string_repo();
        let base = "shared prefix that repeats on every revision\n".repeat(6);
        let mut revisions = Vec::new();
        for i in 0..10 {
            let value = format!("{base}suffix {i}\n");
            revisions.push(repo.make_snapshot(&value).unwrap());
        }
        let before = repo.size();
        repo.optimize().unwrap();
        assert!(repo.size() <= before);
        // Newest stays complete, and everything still restores.
        assert!(repo.snapshot(repo.latest_revision().unwrap()).unwrap().is_complete());
        for (i, rev) in revisions.iter().enumerate() {
            assert_eq!(repo.restore(rev).unwrap(), format!("{base}suffix {i}\n"));
        }
        // Running it again is a no-op or better, never worse.
        let size_after_first = repo.size();
        repo.optimize().unwrap();
        assert!(repo.size() <= size_after_first);
    }

    #[test]
    fn test_patch_between_and_apply_with_null_compressor() {
        let mut repo = Repository::<String, JsonCodec>::with_parts(
            JsonCodec,
            Box::new(NullCompressor),
            Repository::<String, JsonCodec>::default_config(),
        );
        let rev1 = repo.make_snapshot(&"the old text".to_string()).unwrap();
        let rev2 = repo.make_snapshot(&"the new text".to_string()).unwrap();
        let patch = repo.patch_between(&rev1, &rev2).unwrap();
        // With the null compressor the blob is the portable text itself.
        let text = patch.to_text(&NullCompressor).unwrap();
        assert!(text.starts_with("@@ "));
    }
}
