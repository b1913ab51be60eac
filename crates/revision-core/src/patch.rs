//! Relocatable patches.
//!
//! A [`Patch`] is a localized edit script with surrounding context and
//! source/target offsets, designed to be re-applied to a text that may have
//! drifted since the patch was made. Application is fuzzy: each patch is
//! located with [`crate::search`] near its expected position, and imperfect
//! context is reconciled with an inner diff.

use std::fmt;

use crate::config::EngineConfig;
use crate::diff::{self, Edit, Op};
use crate::encoding::percent_encode;
use crate::search::{self, MAX_PATTERN_BITS};
use crate::text::{char_len, char_slice_from, char_slice_to, find_sub, rfind_sub};

/// A localized edit script with context.
///
/// `start1`/`length1` describe the patched region in the source text,
/// `start2`/`length2` the region in the target text; both are 0-based
/// character offsets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    /// The edits, bracketed by context equalities.
    pub edits: Vec<Edit>,
    /// Start offset in the source text.
    pub start1: usize,
    /// Start offset in the target text.
    pub start2: usize,
    /// Length of the region in the source text.
    pub length1: usize,
    /// Length of the region in the target text.
    pub length2: usize,
}

impl fmt::Display for Patch {
    /// GNU-unidiff-shaped form: `@@ -382,8 +481,9 @@` with 1-based indices,
    /// then one percent-escaped line per edit.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let coords1 = coords(self.start1, self.length1);
        let coords2 = coords(self.start2, self.length2);
        writeln!(f, "@@ -{coords1} +{coords2} @@")?;
        for edit in &self.edits {
            let sign = match edit.op {
                Op::Insert => '+',
                Op::Delete => '-',
                Op::Equal => ' ',
            };
            writeln!(f, "{sign}{}", percent_encode(&edit.text))?;
        }
        Ok(())
    }
}

fn coords(start: usize, length: usize) -> String {
    match length {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{length}", start + 1),
    }
}

/// Compute a list of patches to turn `text1` into `text2`.
pub fn make(text1: &str, text2: &str, config: &EngineConfig) -> Vec<Patch> {
    let mut diffs = diff::diff(text1, text2, config);
    if diffs.len() > 2 {
        diff::cleanup_semantic(&mut diffs);
        diff::cleanup_efficiency(&mut diffs, config);
    }
    make_from_edits(text1, diffs, config)
}

/// Compute a list of patches from a precomputed edit script over `text1`.
pub fn make_from_edits(text1: &str, diffs: Vec<Edit>, config: &EngineConfig) -> Vec<Patch> {
    let mut patches = Vec::new();
    if diffs.is_empty() {
        return patches;
    }
    let mut patch = Patch::default();
    let mut char_count1 = 0usize;
    let mut char_count2 = 0usize;
    // Start with text1 and apply the diffs until we arrive at text2,
    // recreating the patches one by one against the evolving text so each
    // gets context that reflects the application of its predecessors.
    let mut prepatch: Vec<char> = text1.chars().collect();
    let mut postpatch = prepatch.clone();
    let last = diffs.len() - 1;
    for (i, edit) in diffs.iter().enumerate() {
        if patch.edits.is_empty() && edit.op != Op::Equal {
            // A new patch starts here.
            patch.start1 = char_count1;
            patch.start2 = char_count2;
        }

        match edit.op {
            Op::Insert => {
                let chars: Vec<char> = edit.text.chars().collect();
                patch.length2 += chars.len();
                patch.edits.push(edit.clone());
                postpatch.splice(char_count2..char_count2, chars);
            }
            Op::Delete => {
                let n = edit.char_count();
                patch.length1 += n;
                patch.edits.push(edit.clone());
                postpatch.drain(char_count2..char_count2 + n);
            }
            Op::Equal => {
                let n = edit.char_count();
                if n <= 2 * config.patch_margin && !patch.edits.is_empty() && i != last {
                    // Small equality inside a patch.
                    patch.edits.push(edit.clone());
                    patch.length1 += n;
                    patch.length2 += n;
                }
                if n >= 2 * config.patch_margin && !patch.edits.is_empty() {
                    // Time for a new patch.
                    add_context(&mut patch, &prepatch, config);
                    patches.push(std::mem::take(&mut patch));
                    // Patches carry a rolling context: update the prepatch
                    // text to reflect the patches already emitted.
                    prepatch = postpatch.clone();
                    char_count1 = char_count2;
                }
            }
        }

        if edit.op != Op::Insert {
            char_count1 += edit.char_count();
        }
        if edit.op != Op::Delete {
            char_count2 += edit.char_count();
        }
    }
    // Pick up the leftover patch if not empty.
    if !patch.edits.is_empty() {
        add_context(&mut patch, &prepatch, config);
        patches.push(patch);
    }
    patches
}

/// Grow the patch's context until it is unique in `text` (or the pattern
/// would no longer fit the match engine), then bracket the edits with the
/// context equalities.
fn add_context(patch: &mut Patch, text: &[char], config: &EngineConfig) {
    if text.is_empty() {
        return;
    }
    let margin = config.patch_margin;
    let mut pattern = &text[patch.start2..patch.start2 + patch.length1];
    let mut padding = 0usize;
    while find_sub(text, pattern, 0) != rfind_sub(text, pattern, text.len())
        && pattern.len() < MAX_PATTERN_BITS.saturating_sub(2 * margin)
    {
        padding += margin;
        let begin = patch.start2.saturating_sub(padding);
        let end = (patch.start2 + patch.length1 + padding).min(text.len());
        pattern = &text[begin..end];
    }
    // One more chunk for good luck.
    padding += margin;

    let prefix = &text[patch.start2.saturating_sub(padding)..patch.start2];
    if !prefix.is_empty() {
        patch
            .edits
            .insert(0, Edit::equal(prefix.iter().collect::<String>()));
    }
    let suffix_end = (patch.start2 + patch.length1 + padding).min(text.len());
    let suffix = &text[patch.start2 + patch.length1..suffix_end];
    if !suffix.is_empty() {
        patch.edits.push(Edit::equal(suffix.iter().collect::<String>()));
    }

    patch.start1 -= prefix.len();
    patch.start2 -= prefix.len();
    patch.length1 += prefix.len() + suffix.len();
    patch.length2 += prefix.len() + suffix.len();
}

/// Merge a list of patches onto `text`, tolerating drift. Returns the
/// patched text and one applied/failed flag per patch; a failed patch never
/// aborts the batch.
pub fn apply(patches: &[Patch], text: &str, config: &EngineConfig) -> (String, Vec<bool>) {
    if patches.is_empty() {
        return (text.to_string(), Vec::new());
    }

    // Work on a copy so the caller's patches are untouched.
    let mut patches = patches.to_vec();
    let null_padding = add_padding(&mut patches, config);
    let mut text: Vec<char> = format!("{null_padding}{text}{null_padding}").chars().collect();
    split_max(&mut patches, config);

    // `delta` tracks the offset between the expected and actual location of
    // the previous patch: if the first patch was expected at 10 but found at
    // 12, the second patch's expected position shifts by 2.
    let mut delta = 0isize;
    let mut results = vec![false; patches.len()];
    for (x, patch) in patches.iter().enumerate() {
        let expected_loc = (patch.start2 as isize + delta).max(0) as usize;
        let needle: Vec<char> = diff::source_text(&patch.edits).chars().collect();
        let mut start_loc;
        let mut end_loc = None;
        if needle.len() > MAX_PATTERN_BITS {
            // split_max only leaves an oversized pattern for a monster
            // delete; anchor its head and tail separately.
            start_loc = search::locate_chars(&text, &needle[..MAX_PATTERN_BITS], expected_loc, config);
            if let Some(head) = start_loc {
                end_loc = search::locate_chars(
                    &text,
                    &needle[needle.len() - MAX_PATTERN_BITS..],
                    expected_loc + needle.len() - MAX_PATTERN_BITS,
                    config,
                );
                match end_loc {
                    None => start_loc = None,
                    Some(tail) if head >= tail => start_loc = None,
                    _ => {}
                }
            }
        } else {
            start_loc = search::locate_chars(&text, &needle, expected_loc, config);
        }
        let Some(start_loc) = start_loc else {
            // No match found; subtract this patch's shift from the ones
            // still to come.
            delta -= patch.length2 as isize - patch.length1 as isize;
            continue;
        };
        results[x] = true;
        delta = start_loc as isize - expected_loc as isize;
        let found_end = match end_loc {
            None => (start_loc + needle.len()).min(text.len()),
            Some(tail) => (tail + MAX_PATTERN_BITS).min(text.len()),
        };
        let found = &text[start_loc..found_end];
        if *found == needle[..] {
            // Perfect match: splice the replacement in directly.
            let replacement: Vec<char> = diff::target_text(&patch.edits).chars().collect();
            text.splice(start_loc..start_loc + needle.len(), replacement);
        } else {
            // Imperfect match: run a diff between the expected and actual
            // context to get a framework of equivalent indices.
            let needle_text: String = needle.iter().collect();
            let found_text: String = found.iter().collect();
            let mut inner = diff::diff_with(&needle_text, &found_text, false, config);
            if needle.len() > MAX_PATTERN_BITS
                && diff::levenshtein(&inner) as f64 / needle.len() as f64
                    > f64::from(config.patch_delete_threshold)
            {
                // The end points match, but the content is unacceptably bad.
                results[x] = false;
            } else {
                diff::cleanup_semantic_lossless(&mut inner);
                let mut index1 = 0usize;
                for edit in &patch.edits {
                    if edit.op != Op::Equal {
                        let index2 = diff::translate_offset(&inner, index1);
                        match edit.op {
                            Op::Insert => {
                                let chars: Vec<char> = edit.text.chars().collect();
                                text.splice(start_loc + index2..start_loc + index2, chars);
                            }
                            Op::Delete => {
                                let del_end =
                                    diff::translate_offset(&inner, index1 + edit.char_count());
                                text.drain(start_loc + index2..start_loc + del_end);
                            }
                            Op::Equal => unreachable!(),
                        }
                    }
                    if edit.op != Op::Delete {
                        index1 += edit.char_count();
                    }
                }
            }
        }
    }
    // Strip the padding off.
    let pad = null_padding.chars().count();
    let out: String = text[pad..text.len() - pad].iter().collect();
    (out, results)
}

/// Add synthetic context on both ends of the first and last patch so edits
/// at the text boundaries still have something to match against. The caller
/// brackets the subject text with the returned padding string.
pub fn add_padding(patches: &mut [Patch], config: &EngineConfig) -> String {
    let padding_length = config.patch_margin;
    let null_padding: String = (1..=padding_length as u32).filter_map(char::from_u32).collect();

    // Bump all the patches forward.
    for patch in patches.iter_mut() {
        patch.start1 += padding_length;
        patch.start2 += padding_length;
    }

    let Some(first) = patches.first_mut() else {
        return null_padding;
    };
    if first.edits.first().is_none_or(|e| e.op != Op::Equal) {
        // Add a full padding equality.
        first.edits.insert(0, Edit::equal(null_padding.clone()));
        first.start1 -= padding_length;
        first.start2 -= padding_length;
        first.length1 += padding_length;
        first.length2 += padding_length;
    } else if padding_length > first.edits[0].char_count() {
        // Grow the first equality.
        let existing = first.edits[0].char_count();
        let extra = padding_length - existing;
        let grown = format!(
            "{}{}",
            char_slice_from(&null_padding, existing),
            first.edits[0].text
        );
        first.edits[0].text = grown;
        first.start1 -= extra;
        first.start2 -= extra;
        first.length1 += extra;
        first.length2 += extra;
    }

    let last = patches.last_mut().expect("patches is non-empty");
    if last.edits.last().is_none_or(|e| e.op != Op::Equal) {
        // Add a full padding equality.
        last.edits.push(Edit::equal(null_padding.clone()));
        last.length1 += padding_length;
        last.length2 += padding_length;
    } else {
        let existing = last.edits.last().unwrap().char_count();
        if padding_length > existing {
            // Grow the last equality.
            let extra = padding_length - existing;
            last.edits
                .last_mut()
                .unwrap()
                .text
                .push_str(char_slice_to(&null_padding, extra));
            last.length1 += extra;
            last.length2 += extra;
        }
    }

    null_padding
}

/// Break up any patch whose source span exceeds the match engine's pattern
/// ceiling into smaller patches with a rolling margin of context.
pub fn split_max(patches: &mut Vec<Patch>, config: &EngineConfig) {
    let patch_size = MAX_PATTERN_BITS;
    let margin = config.patch_margin;
    let mut x = 0usize;
    while x < patches.len() {
        if patches[x].length1 <= patch_size {
            x += 1;
            continue;
        }
        // Remove the big old patch and re-emit it in pieces.
        let mut big = patches.remove(x);
        let mut start1 = big.start1;
        let mut start2 = big.start2;
        let mut precontext = String::new();
        while !big.edits.is_empty() {
            let mut patch = Patch::default();
            let mut empty = true;
            let pre_len = char_len(&precontext);
            patch.start1 = start1 - pre_len;
            patch.start2 = start2 - pre_len;
            if !precontext.is_empty() {
                patch.length1 = pre_len;
                patch.length2 = pre_len;
                patch.edits.push(Edit::equal(precontext.clone()));
            }
            while !big.edits.is_empty() && patch.length1 < patch_size - margin {
                let op = big.edits[0].op;
                let text_len = big.edits[0].char_count();
                if op == Op::Insert {
                    // Insertions are harmless.
                    patch.length2 += text_len;
                    start2 += text_len;
                    patch.edits.push(big.edits.remove(0));
                    empty = false;
                } else if op == Op::Delete
                    && patch.edits.len() == 1
                    && patch.edits[0].op == Op::Equal
                    && text_len > 2 * patch_size
                {
                    // A monster deletion: let it pass in one chunk.
                    patch.length1 += text_len;
                    start1 += text_len;
                    empty = false;
                    patch.edits.push(big.edits.remove(0));
                } else {
                    // Deletion or equality; take only as much as fits.
                    let take = text_len.min(patch_size - patch.length1 - margin);
                    let piece = char_slice_to(&big.edits[0].text, take).to_string();
                    patch.length1 += take;
                    start1 += take;
                    if op == Op::Equal {
                        patch.length2 += take;
                        start2 += take;
                    } else {
                        empty = false;
                    }
                    if take == text_len {
                        patch.edits.push(big.edits.remove(0));
                    } else {
                        patch.edits.push(Edit::new(op, piece));
                        big.edits[0].text = char_slice_from(&big.edits[0].text, take).to_string();
                    }
                }
            }
            // Compute the head context for the next patch.
            precontext = diff::target_text(&patch.edits);
            let pc_len = char_len(&precontext);
            precontext = char_slice_from(&precontext, pc_len.saturating_sub(margin)).to_string();
            // Append the tail context for this patch.
            let source_rest = diff::source_text(&big.edits);
            let postcontext = if char_len(&source_rest) > margin {
                char_slice_to(&source_rest, margin).to_string()
            } else {
                source_rest
            };
            if !postcontext.is_empty() {
                let post_len = char_len(&postcontext);
                patch.length1 += post_len;
                patch.length2 += post_len;
                match patch.edits.last_mut() {
                    Some(last) if last.op == Op::Equal => last.text.push_str(&postcontext),
                    _ => patch.edits.push(Edit::equal(postcontext)),
                }
            }
            if !empty {
                patches.insert(x, patch);
                x += 1;
            }
        }
    }
}
