//! Revision identities and the snapshot store.
//!
//! Every stored version of a value is a [`Snapshot`]: either the complete
//! canonical text, or a reverse delta — a compressed patch that, applied to
//! a strictly newer snapshot's text, reconstructs this one. Snapshots are
//! keyed by [`RevisionId`], the SHA-1 of their canonical text.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Identity of a revision: lowercase hex SHA-1 of the UTF-8 bytes of the
/// codec-produced text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RevisionId(String);

impl RevisionId {
    /// Fingerprint a canonical text.
    pub fn of_text(text: &str) -> Self {
        use std::fmt::Write as _;
        let mut hasher = Sha1::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// The hex digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The payload of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SnapshotBody {
    /// The full canonical text.
    Complete {
        /// Codec output for the stored value.
        text: String,
    },
    /// A reverse delta against a newer revision.
    Delta {
        /// The newer revision this delta applies to.
        future_rev: RevisionId,
        /// Compressed portable patch text; applied to the future revision's
        /// text it yields this snapshot's text.
        patch: Vec<u8>,
    },
}

/// One stored version of a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Identity of this revision.
    pub revision: RevisionId,
    /// When the snapshot was taken.
    pub created_at: DateTime<Utc>,
    /// Complete text or reverse delta.
    pub body: SnapshotBody,
}

impl Snapshot {
    /// A complete snapshot taken now.
    pub fn complete(revision: RevisionId, text: String) -> Self {
        Self {
            revision,
            created_at: Utc::now(),
            body: SnapshotBody::Complete { text },
        }
    }

    /// Storage footprint in bytes: the text for a complete snapshot, the
    /// compressed patch for a delta.
    pub fn size(&self) -> usize {
        match &self.body {
            SnapshotBody::Complete { text } => text.len(),
            SnapshotBody::Delta { patch, .. } => patch.len(),
        }
    }

    /// Whether this snapshot holds its full text.
    pub fn is_complete(&self) -> bool {
        matches!(self.body, SnapshotBody::Complete { .. })
    }
}

/// Keyed map from revision id to snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotStore {
    snapshots: HashMap<RevisionId, Snapshot>,
}

impl SnapshotStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the snapshot under its own revision id.
    pub fn put(&mut self, snapshot: Snapshot) {
        self.snapshots.insert(snapshot.revision.clone(), snapshot);
    }

    /// Look up a snapshot.
    pub fn get(&self, revision: &RevisionId) -> Option<&Snapshot> {
        self.snapshots.get(revision)
    }

    /// Whether a revision is present.
    pub fn contains(&self, revision: &RevisionId) -> bool {
        self.snapshots.contains_key(revision)
    }

    /// Rewrite an entry as a reverse delta, keeping its revision id and
    /// creation time.
    pub fn convert_to_delta(&mut self, revision: &RevisionId, future_rev: RevisionId, patch: Vec<u8>) {
        if let Some(snapshot) = self.snapshots.get_mut(revision) {
            snapshot.body = SnapshotBody::Delta { future_rev, patch };
        }
    }

    /// Total storage footprint in bytes.
    pub fn total_size(&self) -> usize {
        self.snapshots.values().map(Snapshot::size).sum()
    }

    /// Number of distinct revisions.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether the store holds no snapshots.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Iterate over all snapshots (arbitrary order).
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_id_is_hex_sha1() {
        // Well-known digest.
        assert_eq!(
            RevisionId::of_text("abc").as_str(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        assert_eq!(
            RevisionId::of_text("").as_str(),
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        );
        // Equal text, equal id; different text, different id.
        assert_eq!(RevisionId::of_text("x"), RevisionId::of_text("x"));
        assert_ne!(RevisionId::of_text("x"), RevisionId::of_text("y"));
    }

    #[test]
    fn test_snapshot_sizes() {
        let rev = RevisionId::of_text("hello");
        let complete = Snapshot::complete(rev.clone(), "hello".to_string());
        assert_eq!(complete.size(), 5);
        assert!(complete.is_complete());

        let delta = Snapshot {
            revision: rev,
            created_at: Utc::now(),
            body: SnapshotBody::Delta {
                future_rev: RevisionId::of_text("future"),
                patch: vec![0u8; 3],
            },
        };
        assert_eq!(delta.size(), 3);
        assert!(!delta.is_complete());
    }

    #[test]
    fn test_store_put_get_and_convert() {
        let mut store = SnapshotStore::new();
        let rev_a = RevisionId::of_text("a");
        let rev_b = RevisionId::of_text("b");
        store.put(Snapshot::complete(rev_a.clone(), "a".to_string()));
        store.put(Snapshot::complete(rev_b.clone(), "b".to_string()));
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_size(), 2);
        assert!(store.contains(&rev_a));

        let created = store.get(&rev_a).unwrap().created_at;
        store.convert_to_delta(&rev_a, rev_b.clone(), vec![1, 2, 3, 4]);
        let converted = store.get(&rev_a).unwrap();
        assert_eq!(converted.revision, rev_a);
        assert_eq!(converted.created_at, created);
        assert_eq!(converted.size(), 4);
        match &converted.body {
            SnapshotBody::Delta { future_rev, .. } => assert_eq!(*future_rev, rev_b),
            SnapshotBody::Complete { .. } => panic!("expected delta"),
        }
    }
}
