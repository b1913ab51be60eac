#![warn(missing_docs)]
//! Revision Core - In-Memory Version-Control Store
//!
//! # Overview
//!
//! `revision-core` records successive snapshots of a serializable value,
//! reconstructs any prior snapshot on demand, and exchanges changes between
//! stores as portable patch blobs. Its defining property is compactness:
//! after each new snapshot, older snapshots are rewritten as **reverse
//! deltas** against newer ones whenever that reduces storage.
//!
//! # Core Features
//!
//! - **Character-Level Diffing**: Myers bisect with a wall-clock budget,
//!   half-match splitting, and a line-tokenization speedup
//! - **Script Cleanup**: semantic and efficiency normalization of edit
//!   scripts
//! - **Fuzzy Patching**: Bitap search with distance/error scoring relocates
//!   patches in drifted text
//! - **Reverse-Delta Compaction**: size-monotone rewriting of the snapshot
//!   map, newest revision always one read away
//! - **Portable Exchange**: GNU-unidiff-shaped patch text, percent-encoded,
//!   compressed through a pluggable capability
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Repository (snapshot / restore / exchange) │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Snapshot Store (complete | reverse delta)  │  ← Keyed History
//! ├─────────────────────────────────────────────┤
//! │  Patch Engine (context, split, fuzzy apply) │  ← Relocatable Edits
//! ├─────────────────────────────────────────────┤
//! │  Match Engine (Bitap fuzzy locate)          │  ← Drift Tolerance
//! ├─────────────────────────────────────────────┤
//! │  Diff Engine (Myers bisect + cleanups)      │  ← Edit Scripts
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use revision_core::{JsonCodec, Repository};
//!
//! let mut repo: Repository<String, JsonCodec> = Repository::new(JsonCodec);
//!
//! let first = repo.make_snapshot(&"Wow".to_string()).unwrap();
//! repo.make_snapshot(&"World of Warcraft".to_string()).unwrap();
//!
//! // Any revision restores, however it is stored internally.
//! assert_eq!(repo.restore(&first).unwrap(), "Wow");
//! assert_eq!(repo.latest().unwrap(), "World of Warcraft");
//! ```
//!
//! # Module Description
//!
//! - [`diff`] - edit scripts: compute, clean up, serialize
//! - [`search`] - Bitap fuzzy pattern location
//! - [`patch`] - relocatable patches: make, split, apply
//! - [`encoding`] - percent-encoding and the portable patch text codec
//! - [`snapshot`] - revision ids, snapshot records, the keyed store
//! - [`repository`] - the caller-facing store
//! - [`codec`] - the value ⇄ canonical-text capability
//! - [`compress`] - the patch-blob compression capability
//! - [`persist`] - whole-store save/load
//! - [`config`] - engine tunables
//!
//! # Concurrency
//!
//! The store is single-threaded cooperative: no operation suspends, and all
//! state is owned by one logical caller at a time. The only time budget is
//! [`EngineConfig::diff_timeout`], checked against a wall clock during
//! bisection; on expiry the diff degrades instead of failing.

pub mod codec;
pub mod compress;
pub mod config;
pub mod diff;
pub mod encoding;
pub mod patch;
pub mod persist;
pub mod repository;
pub mod search;
pub mod snapshot;
mod text;

pub use codec::{Codec, CodecError, JsonCodec};
pub use compress::{BlobCompressor, CompressError, GzipCompressor, NullCompressor};
pub use config::EngineConfig;
pub use diff::{DiffError, Edit, Op};
pub use encoding::EncodingError;
pub use patch::Patch;
pub use persist::{BlobStore, FileStore, PersistError, RepositoryState};
pub use repository::{Repository, RepositoryError, RepositoryPatch, NEAREST_RANGE};
pub use search::MAX_PATTERN_BITS;
pub use snapshot::{RevisionId, Snapshot, SnapshotBody, SnapshotStore};
