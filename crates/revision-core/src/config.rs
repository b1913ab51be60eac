//! Engine tunables.
//!
//! One flat options struct is shared by the diff, match, and patch layers,
//! passed by reference into module-level functions. Hosts that persist their
//! settings can round-trip it through serde.

use serde::{Deserialize, Serialize};

/// Behavior settings for the diff/match/patch engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of seconds to map a diff before giving up (`<= 0` for
    /// unbounded). Unbounded time also disables the half-match heuristic,
    /// trading speed for a minimal diff.
    pub diff_timeout: f32,
    /// Cost of an empty edit operation in terms of edit characters. Drives
    /// [`crate::diff::cleanup_efficiency`].
    pub diff_edit_cost: usize,
    /// At what point no match is declared (0.0 = perfection, 1.0 = very
    /// loose).
    pub match_threshold: f32,
    /// How far to search for a match (0 = exact location only). A match this
    /// many characters away from the expected location adds 1.0 to the score.
    pub match_distance: usize,
    /// When deleting a large block of text (over ~64 characters), how closely
    /// the contents have to match the expected contents (0.0 = perfection,
    /// 1.0 = very loose). [`EngineConfig::match_threshold`] still controls how
    /// closely the end points of the delete need to match.
    pub patch_delete_threshold: f32,
    /// Chunk size for patch context length.
    pub patch_margin: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            diff_timeout: 1.0,
            diff_edit_cost: 4,
            match_threshold: 0.5,
            match_distance: 1000,
            patch_delete_threshold: 0.5,
            patch_margin: 4,
        }
    }
}

impl EngineConfig {
    /// Config with no diff deadline: bisection runs to completion and the
    /// half-match shortcut is disabled.
    pub fn unbounded() -> Self {
        Self {
            diff_timeout: 0.0,
            ..Self::default()
        }
    }
}
