//! Character-level edit scripts.
//!
//! Computes the difference between two texts as an ordered sequence of
//! [`Edit`] operations, using a Myers middle-snake bisection with a
//! wall-clock deadline, a shared-substring ("half match") divide step, and a
//! line-tokenization speedup for large inputs. Cleanup passes trade the raw
//! script for something more human-shaped ([`cleanup_semantic`]) or more
//! patch-efficient ([`cleanup_efficiency`]).
//!
//! All public offsets and lengths are **character offsets** (Unicode scalar
//! values), like the rest of the crate.

use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use regex::Regex;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::encoding::{percent_decode, percent_encode, EncodingError};
use crate::text::{char_len, char_slice, char_slice_from, char_slice_to, find_sub};

/// One of the three edit operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Remove text present only in the source.
    Delete,
    /// Add text present only in the target.
    Insert,
    /// Keep text common to both sides.
    Equal,
}

/// A single edit: an operation and the text it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    /// The operation.
    pub op: Op,
    /// The text being kept, inserted, or deleted.
    pub text: String,
}

impl Edit {
    /// Create an edit with an explicit operation.
    pub fn new(op: Op, text: impl Into<String>) -> Self {
        Self {
            op,
            text: text.into(),
        }
    }

    /// Shorthand for an `Equal` edit.
    pub fn equal(text: impl Into<String>) -> Self {
        Self::new(Op::Equal, text)
    }

    /// Shorthand for an `Insert` edit.
    pub fn insert(text: impl Into<String>) -> Self {
        Self::new(Op::Insert, text)
    }

    /// Shorthand for a `Delete` edit.
    pub fn delete(text: impl Into<String>) -> Self {
        Self::new(Op::Delete, text)
    }

    /// Length of the edit text in characters.
    pub fn char_count(&self) -> usize {
        char_len(&self.text)
    }
}

/// Errors from decoding the compact delta form.
#[derive(Debug, Error)]
pub enum DiffError {
    /// A `+` token carried a malformed escape sequence.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    /// A `=`/`-` token did not carry a valid length.
    #[error("invalid number in delta token: {0:?}")]
    InvalidNumber(String),
    /// A token started with something other than `=`, `-`, or `+`.
    #[error("invalid operation in delta token: {0:?}")]
    InvalidOperation(char),
    /// The delta consumed more or fewer source characters than exist.
    #[error("delta consumed {consumed} characters, source text has {len}")]
    SourceLengthMismatch {
        /// Characters the delta accounted for.
        consumed: usize,
        /// Characters actually in the source text.
        len: usize,
    },
}

/// Find the differences between two texts, with the line-level speedup on.
///
/// The result is an edit script that transforms `text1` into `text2`:
/// concatenating the `Equal`/`Delete` texts reproduces `text1`, and the
/// `Equal`/`Insert` texts reproduce `text2`.
pub fn diff(text1: &str, text2: &str, config: &EngineConfig) -> Vec<Edit> {
    diff_with(text1, text2, true, config)
}

/// Find the differences between two texts.
///
/// When `check_lines` is true and both inputs are large, a faster (slightly
/// less optimal) line-level pre-pass identifies the changed regions first.
pub fn diff_with(text1: &str, text2: &str, check_lines: bool, config: &EngineConfig) -> Vec<Edit> {
    let deadline = if config.diff_timeout <= 0.0 {
        None
    } else {
        Some(Instant::now() + Duration::from_secs_f32(config.diff_timeout))
    };
    let chars1: Vec<char> = text1.chars().collect();
    let chars2: Vec<char> = text2.chars().collect();
    diff_main(&chars1, &chars2, check_lines, deadline, config)
}

fn diff_main(
    text1: &[char],
    text2: &[char],
    check_lines: bool,
    deadline: Option<Instant>,
    config: &EngineConfig,
) -> Vec<Edit> {
    // Equality shortcut.
    if text1 == text2 {
        if text1.is_empty() {
            return Vec::new();
        }
        return vec![Edit::equal(collect(text1))];
    }

    // Trim off the common prefix and suffix.
    let prefix_len = common_prefix_slice(text1, text2);
    let prefix = &text1[..prefix_len];
    let text1 = &text1[prefix_len..];
    let text2 = &text2[prefix_len..];

    let suffix_len = common_suffix_slice(text1, text2);
    let suffix = &text1[text1.len() - suffix_len..];
    let text1 = &text1[..text1.len() - suffix_len];
    let text2 = &text2[..text2.len() - suffix_len];

    let mut diffs = compute(text1, text2, check_lines, deadline, config);

    if !prefix.is_empty() {
        diffs.insert(0, Edit::equal(collect(prefix)));
    }
    if !suffix.is_empty() {
        diffs.push(Edit::equal(collect(suffix)));
    }
    cleanup_merge(&mut diffs);
    diffs
}

/// Diff two texts known to share no common prefix or suffix.
fn compute(
    text1: &[char],
    text2: &[char],
    check_lines: bool,
    deadline: Option<Instant>,
    config: &EngineConfig,
) -> Vec<Edit> {
    if text1.is_empty() {
        return vec![Edit::insert(collect(text2))];
    }
    if text2.is_empty() {
        return vec![Edit::delete(collect(text1))];
    }

    let text1_longer = text1.len() > text2.len();
    let (long, short) = if text1_longer {
        (text1, text2)
    } else {
        (text2, text1)
    };
    if let Some(i) = find_sub(long, short, 0) {
        // Shorter text is inside the longer text.
        let op = if text1_longer { Op::Delete } else { Op::Insert };
        return vec![
            Edit::new(op, collect(&long[..i])),
            Edit::equal(collect(short)),
            Edit::new(op, collect(&long[i + short.len()..])),
        ];
    }
    if short.len() == 1 {
        // Single character; after the shortcut above it cannot be an equality.
        return vec![Edit::delete(collect(text1)), Edit::insert(collect(text2))];
    }

    if let Some(hm) = half_match(text1, text2, config) {
        let mut diffs = diff_main(&hm.prefix1, &hm.prefix2, check_lines, deadline, config);
        let diffs_b = diff_main(&hm.suffix1, &hm.suffix2, check_lines, deadline, config);
        diffs.push(Edit::equal(collect(&hm.common)));
        diffs.extend(diffs_b);
        return diffs;
    }

    if check_lines && text1.len() > 100 && text2.len() > 100 {
        return line_mode(text1, text2, deadline, config);
    }

    bisect(text1, text2, deadline, config)
}

/// Quick line-level diff, then re-diff the changed regions character by
/// character. Can produce non-minimal scripts.
fn line_mode(
    text1: &[char],
    text2: &[char],
    deadline: Option<Instant>,
    config: &EngineConfig,
) -> Vec<Edit> {
    let s1 = collect(text1);
    let s2 = collect(text2);
    let (tokens1, tokens2, line_array) = lines_to_tokens(&s1, &s2);

    let mut diffs = diff_main(&tokens1, &tokens2, false, deadline, config);
    tokens_to_lines(&mut diffs, &line_array);
    cleanup_semantic(&mut diffs);

    // Re-diff each adjacent delete+insert block at character level.
    diffs.push(Edit::equal(""));
    let mut pointer = 0;
    let mut count_delete = 0;
    let mut count_insert = 0;
    let mut text_delete = String::new();
    let mut text_insert = String::new();
    while pointer < diffs.len() {
        match diffs[pointer].op {
            Op::Insert => {
                count_insert += 1;
                text_insert.push_str(&diffs[pointer].text);
                pointer += 1;
            }
            Op::Delete => {
                count_delete += 1;
                text_delete.push_str(&diffs[pointer].text);
                pointer += 1;
            }
            Op::Equal => {
                if count_delete >= 1 && count_insert >= 1 {
                    let run_start = pointer - count_delete - count_insert;
                    let cd: Vec<char> = text_delete.chars().collect();
                    let ci: Vec<char> = text_insert.chars().collect();
                    let sub = diff_main(&cd, &ci, false, deadline, config);
                    let sub_len = sub.len();
                    diffs.splice(run_start..pointer, sub);
                    pointer = run_start + sub_len;
                }
                count_insert = 0;
                count_delete = 0;
                text_delete.clear();
                text_insert.clear();
                pointer += 1;
            }
        }
    }
    diffs.pop();
    diffs
}

/// Find the middle snake per Myers 1986, split the problem in two, and
/// recurse. On deadline expiry the result degrades to a delete + insert pair.
///
/// Precondition: both inputs have at least two characters (`compute` handles
/// the smaller cases).
fn bisect(
    text1: &[char],
    text2: &[char],
    deadline: Option<Instant>,
    config: &EngineConfig,
) -> Vec<Edit> {
    let text1_len = text1.len() as isize;
    let text2_len = text2.len() as isize;
    let max_d = (text1_len + text2_len + 1) / 2;
    let v_offset = max_d;
    let v_length = 2 * max_d;
    let mut v1 = vec![-1isize; v_length as usize];
    let mut v2 = vec![-1isize; v_length as usize];
    v1[(v_offset + 1) as usize] = 0;
    v2[(v_offset + 1) as usize] = 0;
    let delta = text1_len - text2_len;
    // If the total number of characters is odd, the front path collides with
    // the reverse path; otherwise the reverse path collides with the front.
    let front = delta % 2 != 0;
    let mut k1start = 0isize;
    let mut k1end = 0isize;
    let mut k2start = 0isize;
    let mut k2end = 0isize;
    for d in 0..max_d {
        if let Some(dl) = deadline {
            if Instant::now() > dl {
                break;
            }
        }

        // Walk the front path one step.
        let mut k1 = -d + k1start;
        while k1 <= d - k1end {
            let k1_offset = (v_offset + k1) as usize;
            let mut x1 = if k1 == -d || (k1 != d && v1[k1_offset - 1] < v1[k1_offset + 1]) {
                v1[k1_offset + 1]
            } else {
                v1[k1_offset - 1] + 1
            };
            let mut y1 = x1 - k1;
            while x1 < text1_len
                && y1 < text2_len
                && text1[x1 as usize] == text2[y1 as usize]
            {
                x1 += 1;
                y1 += 1;
            }
            v1[k1_offset] = x1;
            if x1 > text1_len {
                // Ran off the right of the graph.
                k1end += 2;
            } else if y1 > text2_len {
                // Ran off the bottom of the graph.
                k1start += 2;
            } else if front {
                let k2_offset = v_offset + delta - k1;
                if k2_offset >= 0 && k2_offset < v_length && v2[k2_offset as usize] != -1 {
                    // Mirror x2 onto the top-left coordinate system.
                    let x2 = text1_len - v2[k2_offset as usize];
                    if x1 >= x2 {
                        return bisect_split(
                            text1,
                            text2,
                            x1 as usize,
                            y1 as usize,
                            deadline,
                            config,
                        );
                    }
                }
            }
            k1 += 2;
        }

        // Walk the reverse path one step.
        let mut k2 = -d + k2start;
        while k2 <= d - k2end {
            let k2_offset = (v_offset + k2) as usize;
            let mut x2 = if k2 == -d || (k2 != d && v2[k2_offset - 1] < v2[k2_offset + 1]) {
                v2[k2_offset + 1]
            } else {
                v2[k2_offset - 1] + 1
            };
            let mut y2 = x2 - k2;
            while x2 < text1_len
                && y2 < text2_len
                && text1[(text1_len - x2 - 1) as usize] == text2[(text2_len - y2 - 1) as usize]
            {
                x2 += 1;
                y2 += 1;
            }
            v2[k2_offset] = x2;
            if x2 > text1_len {
                // Ran off the left of the graph.
                k2end += 2;
            } else if y2 > text2_len {
                // Ran off the top of the graph.
                k2start += 2;
            } else if !front {
                let k1_offset = v_offset + delta - k2;
                if k1_offset >= 0 && k1_offset < v_length && v1[k1_offset as usize] != -1 {
                    let x1 = v1[k1_offset as usize];
                    let y1 = v_offset + x1 - k1_offset;
                    let x2 = text1_len - x2;
                    if x1 >= x2 {
                        return bisect_split(
                            text1,
                            text2,
                            x1 as usize,
                            y1 as usize,
                            deadline,
                            config,
                        );
                    }
                }
            }
            k2 += 2;
        }
    }
    // Hit the deadline, or no commonality at all.
    vec![Edit::delete(collect(text1)), Edit::insert(collect(text2))]
}

fn bisect_split(
    text1: &[char],
    text2: &[char],
    x: usize,
    y: usize,
    deadline: Option<Instant>,
    config: &EngineConfig,
) -> Vec<Edit> {
    let mut diffs = diff_main(&text1[..x], &text2[..y], false, deadline, config);
    let diffs_b = diff_main(&text1[x..], &text2[y..], false, deadline, config);
    diffs.extend(diffs_b);
    diffs
}

// Hard cap on interned lines; past it the remainder of a text is treated as
// one line. Keeps the token space inside the valid scalar range.
const MAX_INTERNED_LINES: usize = 1_000_000;

fn token_of(index: usize) -> char {
    // Skip the surrogate block so every index maps to a valid scalar.
    let v = if index < 0xD800 {
        index as u32
    } else {
        index as u32 + 0x800
    };
    char::from_u32(v).expect("line token out of scalar range")
}

fn index_of_token(token: char) -> usize {
    let v = token as u32;
    if v >= 0xE000 {
        (v - 0x800) as usize
    } else {
        v as usize
    }
}

/// Reduce two texts to token strings where each character stands for one
/// line. Index 0 of the line array is intentionally blank.
fn lines_to_tokens(text1: &str, text2: &str) -> (Vec<char>, Vec<char>, Vec<String>) {
    let mut line_array: Vec<String> = vec![String::new()];
    let mut line_hash: HashMap<String, usize> = HashMap::new();
    let tokens1 = munge_lines(text1, &mut line_array, &mut line_hash);
    let tokens2 = munge_lines(text2, &mut line_array, &mut line_hash);
    (tokens1, tokens2, line_array)
}

fn munge_lines(
    text: &str,
    line_array: &mut Vec<String>,
    line_hash: &mut HashMap<String, usize>,
) -> Vec<char> {
    let mut tokens = Vec::new();
    let mut line_start = 0usize;
    while line_start < text.len() {
        let line_end = text[line_start..]
            .find('\n')
            .map(|p| line_start + p + 1)
            .unwrap_or(text.len());
        let line = if line_array.len() >= MAX_INTERNED_LINES && !line_hash.contains_key(&text[line_start..line_end]) {
            // Out of token space: the rest of the text becomes one line.
            &text[line_start..]
        } else {
            &text[line_start..line_end]
        };
        line_start += line.len();

        if let Some(&idx) = line_hash.get(line) {
            tokens.push(token_of(idx));
        } else {
            line_array.push(line.to_string());
            line_hash.insert(line.to_string(), line_array.len() - 1);
            tokens.push(token_of(line_array.len() - 1));
        }
    }
    tokens
}

/// Rehydrate token texts back to real lines.
fn tokens_to_lines(diffs: &mut [Edit], line_array: &[String]) {
    for edit in diffs {
        let text: String = edit
            .text
            .chars()
            .map(|token| line_array[index_of_token(token)].as_str())
            .collect();
        edit.text = text;
    }
}

fn collect(chars: &[char]) -> String {
    chars.iter().collect()
}

fn common_prefix_slice(text1: &[char], text2: &[char]) -> usize {
    let n = text1.len().min(text2.len());
    for i in 0..n {
        if text1[i] != text2[i] {
            return i;
        }
    }
    n
}

fn common_suffix_slice(text1: &[char], text2: &[char]) -> usize {
    let n = text1.len().min(text2.len());
    for i in 1..=n {
        if text1[text1.len() - i] != text2[text2.len() - i] {
            return i - 1;
        }
    }
    n
}

/// Number of characters common to the start of both strings.
pub(crate) fn common_prefix(text1: &str, text2: &str) -> usize {
    text1
        .chars()
        .zip(text2.chars())
        .take_while(|(a, b)| a == b)
        .count()
}

/// Number of characters common to the end of both strings.
pub(crate) fn common_suffix(text1: &str, text2: &str) -> usize {
    let a: Vec<char> = text1.chars().collect();
    let b: Vec<char> = text2.chars().collect();
    common_suffix_slice(&a, &b)
}

/// Number of characters shared between the end of `text1` and the start of
/// `text2`.
pub(crate) fn common_overlap(text1: &str, text2: &str) -> usize {
    let a: Vec<char> = text1.chars().collect();
    let b: Vec<char> = text2.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    // Truncate the longer side.
    let (a, b): (&[char], &[char]) = if a.len() > b.len() {
        (&a[a.len() - b.len()..], &b)
    } else if a.len() < b.len() {
        (&a, &b[..a.len()])
    } else {
        (&a, &b)
    };
    let text_length = a.len();
    if a == b {
        return text_length;
    }

    // Grow a candidate overlap one confirmed match at a time.
    let mut best = 0;
    let mut length = 1;
    loop {
        let pattern = &a[text_length - length..];
        match find_sub(b, pattern, 0) {
            None => return best,
            Some(found) => {
                length += found;
                if found == 0 || a[text_length - length..] == b[..length] {
                    best = length;
                    length += 1;
                }
            }
        }
    }
}

struct HalfMatch {
    prefix1: Vec<char>,
    suffix1: Vec<char>,
    prefix2: Vec<char>,
    suffix2: Vec<char>,
    common: Vec<char>,
}

/// Do the two texts share a substring at least half the length of the longer
/// text? Disabled when the diff has unlimited time, since the split can
/// produce a non-minimal script.
fn half_match(text1: &[char], text2: &[char], config: &EngineConfig) -> Option<HalfMatch> {
    if config.diff_timeout <= 0.0 {
        return None;
    }
    let text1_longer = text1.len() > text2.len();
    let (long, short) = if text1_longer {
        (text1, text2)
    } else {
        (text2, text1)
    };
    if long.len() < 4 || short.len() * 2 < long.len() {
        return None;
    }

    // Check seeds at the second quarter and at the midpoint.
    let hm1 = half_match_at(long, short, (long.len() + 3) / 4);
    let hm2 = half_match_at(long, short, (long.len() + 1) / 2);
    let hm = match (hm1, hm2) {
        (None, None) => return None,
        (Some(h), None) => h,
        (None, Some(h)) => h,
        (Some(a), Some(b)) => {
            if a.common.len() > b.common.len() {
                a
            } else {
                b
            }
        }
    };

    if text1_longer {
        Some(hm)
    } else {
        Some(HalfMatch {
            prefix1: hm.prefix2,
            suffix1: hm.suffix2,
            prefix2: hm.prefix1,
            suffix2: hm.suffix1,
            common: hm.common,
        })
    }
}

fn half_match_at(long: &[char], short: &[char], i: usize) -> Option<HalfMatch> {
    // Quarter-length seed at position i.
    let seed = &long[i..i + long.len() / 4];
    let mut best: Option<HalfMatch> = None;
    let mut best_common_len = 0;
    let mut search_from = 0;
    while let Some(j) = find_sub(short, seed, search_from) {
        let prefix_len = common_prefix_slice(&long[i..], &short[j..]);
        let suffix_len = common_suffix_slice(&long[..i], &short[..j]);
        if best_common_len < suffix_len + prefix_len {
            best_common_len = suffix_len + prefix_len;
            best = Some(HalfMatch {
                prefix1: long[..i - suffix_len].to_vec(),
                suffix1: long[i + prefix_len..].to_vec(),
                prefix2: short[..j - suffix_len].to_vec(),
                suffix2: short[j + prefix_len..].to_vec(),
                common: short[j - suffix_len..j + prefix_len].to_vec(),
            });
        }
        search_from = j + 1;
    }
    if best_common_len * 2 >= long.len() {
        best
    } else {
        None
    }
}

/// Reduce the number of edits by eliminating semantically trivial equalities.
pub fn cleanup_semantic(diffs: &mut Vec<Edit>) {
    if diffs.is_empty() {
        return;
    }
    let mut changes = false;
    let mut equalities: Vec<usize> = Vec::new();
    let mut last_equality: Option<String> = None;
    // Changed-character counts on either side of the candidate equality.
    let mut length_insertions1 = 0usize;
    let mut length_deletions1 = 0usize;
    let mut length_insertions2 = 0usize;
    let mut length_deletions2 = 0usize;
    let mut pointer: isize = 0;
    while (pointer as usize) < diffs.len() {
        let p = pointer as usize;
        if diffs[p].op == Op::Equal {
            equalities.push(p);
            length_insertions1 = length_insertions2;
            length_deletions1 = length_deletions2;
            length_insertions2 = 0;
            length_deletions2 = 0;
            last_equality = Some(diffs[p].text.clone());
        } else {
            if diffs[p].op == Op::Insert {
                length_insertions2 += diffs[p].char_count();
            } else {
                length_deletions2 += diffs[p].char_count();
            }
            let eliminate = last_equality.as_ref().is_some_and(|eq| {
                let len = char_len(eq);
                len <= length_insertions1.max(length_deletions1)
                    && len <= length_insertions2.max(length_deletions2)
            });
            if eliminate {
                let eq = last_equality.take().unwrap();
                let idx = *equalities.last().unwrap();
                diffs[idx] = Edit::delete(eq.clone());
                diffs.insert(idx + 1, Edit::insert(eq));
                equalities.pop();
                // The previous equality needs re-evaluation too.
                equalities.pop();
                pointer = match equalities.last() {
                    Some(&i) => i as isize,
                    None => -1,
                };
                length_insertions1 = 0;
                length_deletions1 = 0;
                length_insertions2 = 0;
                length_deletions2 = 0;
                changes = true;
            }
        }
        pointer += 1;
    }

    if changes {
        cleanup_merge(diffs);
    }
    cleanup_semantic_lossless(diffs);

    // Extract overlaps between adjacent deletions and insertions:
    // <del>abcxx</del><ins>xxdef</ins> -> <del>abc</del>xx<ins>def</ins>,
    // and the mirror image on the other diagonal.
    let mut pointer = 1usize;
    while pointer < diffs.len() {
        if diffs[pointer - 1].op == Op::Delete && diffs[pointer].op == Op::Insert {
            let deletion = diffs[pointer - 1].text.clone();
            let insertion = diffs[pointer].text.clone();
            let overlap1 = common_overlap(&deletion, &insertion);
            let overlap2 = common_overlap(&insertion, &deletion);
            let seg_start = pointer - 1;
            let mut replacement: Option<Vec<Edit>> = None;
            if overlap1 >= overlap2 {
                if overlap1 >= 1 {
                    let del_len = char_len(&deletion);
                    let mut seg = Vec::new();
                    if overlap1 < del_len {
                        seg.push(Edit::delete(char_slice_to(&deletion, del_len - overlap1)));
                    }
                    seg.push(Edit::equal(char_slice_to(&insertion, overlap1)));
                    let kept = char_slice_from(&insertion, overlap1);
                    if !kept.is_empty() {
                        seg.push(Edit::insert(kept));
                    }
                    replacement = Some(seg);
                }
            } else if overlap2 >= 1 {
                let ins_len = char_len(&insertion);
                let mut seg = Vec::new();
                if overlap2 < ins_len {
                    seg.push(Edit::insert(char_slice_to(&insertion, ins_len - overlap2)));
                }
                seg.push(Edit::equal(char_slice_to(&deletion, overlap2)));
                let kept = char_slice_from(&deletion, overlap2);
                if !kept.is_empty() {
                    seg.push(Edit::delete(kept));
                }
                replacement = Some(seg);
            }
            if let Some(seg) = replacement {
                let seg_len = seg.len();
                diffs.splice(seg_start..=pointer, seg);
                pointer = seg_start + seg_len;
                continue;
            }
            pointer += 2;
        } else {
            pointer += 1;
        }
    }
}

static BLANK_LINE_END: OnceLock<Regex> = OnceLock::new();
static BLANK_LINE_START: OnceLock<Regex> = OnceLock::new();

/// Score how well the internal boundary between two strings falls on logical
/// boundaries: 5 (best, at an edge) down to 0 (worst).
fn boundary_score(one: &str, two: &str) -> u32 {
    if one.is_empty() || two.is_empty() {
        return 5;
    }
    let char1 = one.chars().next_back().unwrap();
    let char2 = two.chars().next().unwrap();
    let mut score = 0;
    if !char1.is_alphanumeric() || !char2.is_alphanumeric() {
        score += 1;
        if char1.is_whitespace() || char2.is_whitespace() {
            score += 1;
            if char1.is_control() || char2.is_control() {
                score += 1;
                let end = BLANK_LINE_END.get_or_init(|| Regex::new(r"\n\r?\n$").unwrap());
                let start = BLANK_LINE_START.get_or_init(|| Regex::new(r"^\r?\n\r?\n").unwrap());
                if end.is_match(one) || start.is_match(two) {
                    score += 1;
                }
            }
        }
    }
    score
}

/// Slide single edits surrounded by equalities sideways to align them with
/// word boundaries: `The c<ins>at c</ins>ame.` -> `The <ins>cat </ins>came.`
pub fn cleanup_semantic_lossless(diffs: &mut Vec<Edit>) {
    let mut pointer = 1usize;
    // The first and last elements do not need checking.
    while pointer + 1 < diffs.len() {
        if diffs[pointer - 1].op == Op::Equal && diffs[pointer + 1].op == Op::Equal {
            let mut equality1 = diffs[pointer - 1].text.clone();
            let mut edit = diffs[pointer].text.clone();
            let mut equality2 = diffs[pointer + 1].text.clone();

            // First, shift the edit as far left as possible.
            let common_offset = common_suffix(&equality1, &edit);
            if common_offset != 0 {
                let edit_len = char_len(&edit);
                let common = char_slice_from(&edit, edit_len - common_offset).to_string();
                equality1 =
                    char_slice_to(&equality1, char_len(&equality1) - common_offset).to_string();
                edit = format!("{common}{}", char_slice_to(&edit, edit_len - common_offset));
                equality2 = format!("{common}{equality2}");
            }

            // Second, step character by character right, looking for the best
            // fit.
            let mut best_equality1 = equality1.clone();
            let mut best_edit = edit.clone();
            let mut best_equality2 = equality2.clone();
            let mut best_score =
                boundary_score(&equality1, &edit) + boundary_score(&edit, &equality2);
            loop {
                let (Some(e0), Some(q0)) = (edit.chars().next(), equality2.chars().next()) else {
                    break;
                };
                if e0 != q0 {
                    break;
                }
                equality1.push(e0);
                edit = format!("{}{q0}", char_slice_from(&edit, 1));
                equality2 = char_slice_from(&equality2, 1).to_string();
                let score = boundary_score(&equality1, &edit) + boundary_score(&edit, &equality2);
                // `>=` prefers trailing over leading whitespace on edits.
                if score >= best_score {
                    best_score = score;
                    best_equality1 = equality1.clone();
                    best_edit = edit.clone();
                    best_equality2 = equality2.clone();
                }
            }

            if diffs[pointer - 1].text != best_equality1 {
                // An improvement was found; save it back to the diff.
                if !best_equality1.is_empty() {
                    diffs[pointer - 1].text = best_equality1;
                } else {
                    diffs.remove(pointer - 1);
                    pointer -= 1;
                }
                diffs[pointer].text = best_edit;
                if !best_equality2.is_empty() {
                    diffs[pointer + 1].text = best_equality2;
                } else {
                    diffs.remove(pointer + 1);
                    pointer = pointer.saturating_sub(1);
                }
            }
        }
        pointer += 1;
    }
}

/// Reduce the number of edits by eliminating operationally trivial
/// equalities: short equal runs that cost more to keep than to fold into the
/// surrounding edits.
pub fn cleanup_efficiency(diffs: &mut Vec<Edit>, config: &EngineConfig) {
    if diffs.is_empty() {
        return;
    }
    let edit_cost = config.diff_edit_cost;
    let mut changes = false;
    let mut equalities: Vec<usize> = Vec::new();
    let mut last_equality: Option<String> = None;
    // Insertion/deletion presence before and after the candidate equality.
    let mut pre_ins = false;
    let mut pre_del = false;
    let mut post_ins = false;
    let mut post_del = false;
    let mut pointer: isize = 0;
    while (pointer as usize) < diffs.len() {
        let p = pointer as usize;
        if diffs[p].op == Op::Equal {
            if diffs[p].char_count() < edit_cost && (post_ins || post_del) {
                // Candidate found.
                equalities.push(p);
                pre_ins = post_ins;
                pre_del = post_del;
                last_equality = Some(diffs[p].text.clone());
            } else {
                // Not a candidate, and can never become one.
                equalities.clear();
                last_equality = None;
            }
            post_ins = false;
            post_del = false;
        } else {
            if diffs[p].op == Op::Delete {
                post_del = true;
            } else {
                post_ins = true;
            }
            // Split when edits surround the equality on all four sides, or on
            // three sides with a sub-half-cost equality.
            let split = last_equality.as_ref().is_some_and(|eq| {
                (pre_ins && pre_del && post_ins && post_del)
                    || (char_len(eq) < edit_cost / 2
                        && usize::from(pre_ins)
                            + usize::from(pre_del)
                            + usize::from(post_ins)
                            + usize::from(post_del)
                            == 3)
            });
            if split {
                let eq = last_equality.take().unwrap();
                let idx = *equalities.last().unwrap();
                diffs[idx] = Edit::delete(eq.clone());
                diffs.insert(idx + 1, Edit::insert(eq));
                equalities.pop();
                if pre_ins && pre_del {
                    // No changes made that could affect previous entries.
                    post_ins = true;
                    post_del = true;
                    equalities.clear();
                } else {
                    equalities.pop();
                    pointer = match equalities.last() {
                        Some(&i) => i as isize,
                        None => -1,
                    };
                    post_ins = false;
                    post_del = false;
                }
                changes = true;
            }
        }
        pointer += 1;
    }
    if changes {
        cleanup_merge(diffs);
    }
}

/// Reorder and merge like edit sections, merge equalities, and factor out
/// commonalities. Idempotent.
pub fn cleanup_merge(diffs: &mut Vec<Edit>) {
    loop {
        if diffs.is_empty() {
            return;
        }
        diffs.push(Edit::equal(""));
        let mut pointer = 0usize;
        let mut count_delete = 0usize;
        let mut count_insert = 0usize;
        let mut text_delete = String::new();
        let mut text_insert = String::new();
        while pointer < diffs.len() {
            match diffs[pointer].op {
                Op::Insert => {
                    count_insert += 1;
                    text_insert.push_str(&diffs[pointer].text);
                    pointer += 1;
                }
                Op::Delete => {
                    count_delete += 1;
                    text_delete.push_str(&diffs[pointer].text);
                    pointer += 1;
                }
                Op::Equal => {
                    if count_delete + count_insert > 1 {
                        let both_types = count_delete != 0 && count_insert != 0;
                        let run_start = pointer - count_delete - count_insert;
                        diffs.drain(run_start..pointer);
                        pointer = run_start;
                        if both_types {
                            // Factor out a common prefix.
                            let common = common_prefix(&text_insert, &text_delete);
                            if common != 0 {
                                let prefix = char_slice_to(&text_insert, common).to_string();
                                if pointer > 0 {
                                    debug_assert_eq!(diffs[pointer - 1].op, Op::Equal);
                                    diffs[pointer - 1].text.push_str(&prefix);
                                } else {
                                    diffs.insert(0, Edit::equal(prefix));
                                    pointer += 1;
                                }
                                text_insert = char_slice_from(&text_insert, common).to_string();
                                text_delete = char_slice_from(&text_delete, common).to_string();
                            }
                            // Factor out a common suffix.
                            let common = common_suffix(&text_insert, &text_delete);
                            if common != 0 {
                                let ins_len = char_len(&text_insert);
                                let del_len = char_len(&text_delete);
                                let suffix = char_slice_from(&text_insert, ins_len - common);
                                let extended = format!("{suffix}{}", diffs[pointer].text);
                                diffs[pointer].text = extended;
                                text_insert = char_slice_to(&text_insert, ins_len - common).to_string();
                                text_delete = char_slice_to(&text_delete, del_len - common).to_string();
                            }
                        }
                        // Insert the merged records.
                        if !text_delete.is_empty() {
                            diffs.insert(pointer, Edit::delete(text_delete.clone()));
                            pointer += 1;
                        }
                        if !text_insert.is_empty() {
                            diffs.insert(pointer, Edit::insert(text_insert.clone()));
                            pointer += 1;
                        }
                        pointer += 1;
                    } else if pointer > 0 && diffs[pointer - 1].op == Op::Equal {
                        // Merge this equality into the previous one.
                        let text = std::mem::take(&mut diffs[pointer].text);
                        diffs[pointer - 1].text.push_str(&text);
                        diffs.remove(pointer);
                    } else {
                        pointer += 1;
                    }
                    count_insert = 0;
                    count_delete = 0;
                    text_delete.clear();
                    text_insert.clear();
                }
            }
        }
        if diffs.last().is_some_and(|d| d.text.is_empty()) {
            diffs.pop();
        }

        // Second pass: shift single edits surrounded by equalities sideways
        // to eliminate an equality: A<ins>BA</ins>C -> <ins>AB</ins>AC.
        let mut changes = false;
        let mut pointer = 1usize;
        while pointer + 1 < diffs.len() {
            if diffs[pointer - 1].op == Op::Equal && diffs[pointer + 1].op == Op::Equal {
                let prev_text = diffs[pointer - 1].text.clone();
                let next_text = diffs[pointer + 1].text.clone();
                if diffs[pointer].text.ends_with(&prev_text) {
                    // Shift the edit over the previous equality.
                    let keep = diffs[pointer].text.len() - prev_text.len();
                    let shifted = format!("{prev_text}{}", &diffs[pointer].text[..keep]);
                    diffs[pointer].text = shifted;
                    diffs[pointer + 1].text = format!("{prev_text}{next_text}");
                    diffs.remove(pointer - 1);
                    changes = true;
                } else if diffs[pointer].text.starts_with(&next_text) {
                    // Shift the edit over the next equality.
                    diffs[pointer - 1].text.push_str(&next_text);
                    let rest = diffs[pointer].text[next_text.len()..].to_string();
                    diffs[pointer].text = format!("{rest}{next_text}");
                    diffs.remove(pointer + 1);
                    changes = true;
                }
            }
            pointer += 1;
        }
        // Shifts may open up further merges; run the whole pass again.
        if !changes {
            return;
        }
    }
}

/// Source text of a script: all equalities and deletions.
pub fn source_text(diffs: &[Edit]) -> String {
    diffs
        .iter()
        .filter(|d| d.op != Op::Insert)
        .map(|d| d.text.as_str())
        .collect()
}

/// Target text of a script: all equalities and insertions.
pub fn target_text(diffs: &[Edit]) -> String {
    diffs
        .iter()
        .filter(|d| d.op != Op::Delete)
        .map(|d| d.text.as_str())
        .collect()
}

/// Levenshtein distance of a script: the number of inserted, deleted, or
/// substituted characters.
pub fn levenshtein(diffs: &[Edit]) -> usize {
    let mut total = 0;
    let mut insertions = 0;
    let mut deletions = 0;
    for edit in diffs {
        match edit.op {
            Op::Insert => insertions += edit.char_count(),
            Op::Delete => deletions += edit.char_count(),
            Op::Equal => {
                // A deletion paired with an insertion is one substitution.
                total += insertions.max(deletions);
                insertions = 0;
                deletions = 0;
            }
        }
    }
    total + insertions.max(deletions)
}

/// Given a location in the source text, return the equivalent location in
/// the target text. Characters inside a deletion map to the position just
/// after it.
pub fn translate_offset(diffs: &[Edit], loc: usize) -> usize {
    let mut chars1 = 0;
    let mut chars2 = 0;
    let mut last_chars1 = 0;
    let mut last_chars2 = 0;
    let mut hit: Option<&Edit> = None;
    for edit in diffs {
        if edit.op != Op::Insert {
            chars1 += edit.char_count();
        }
        if edit.op != Op::Delete {
            chars2 += edit.char_count();
        }
        if chars1 > loc {
            hit = Some(edit);
            break;
        }
        last_chars1 = chars1;
        last_chars2 = chars2;
    }
    if hit.is_some_and(|e| e.op == Op::Delete) {
        // The location was deleted.
        return last_chars2;
    }
    last_chars2 + (loc - last_chars1)
}

/// Crush a script into a compact delta string: `=3\t-2\t+ing` means keep 3
/// characters, delete 2, insert "ing". Inserted text is percent-escaped.
pub fn to_delta(diffs: &[Edit]) -> String {
    let tokens: Vec<String> = diffs
        .iter()
        .map(|edit| match edit.op {
            Op::Insert => format!("+{}", percent_encode(&edit.text)),
            Op::Delete => format!("-{}", edit.char_count()),
            Op::Equal => format!("={}", edit.char_count()),
        })
        .collect();
    tokens.join("\t")
}

/// Re-expand a delta produced by [`to_delta`] against the original source
/// text into a full edit script.
pub fn from_delta(text1: &str, delta: &str) -> Result<Vec<Edit>, DiffError> {
    let mut diffs = Vec::new();
    let text1_len = char_len(text1);
    let mut pointer = 0usize;
    for token in delta.split('\t') {
        if token.is_empty() {
            // Blank tokens are ok (from a trailing \t).
            continue;
        }
        let op = token.chars().next().unwrap();
        let param = &token[op.len_utf8()..];
        match op {
            '+' => diffs.push(Edit::insert(percent_decode(param)?)),
            '-' | '=' => {
                let n: usize = param
                    .parse()
                    .map_err(|_| DiffError::InvalidNumber(param.to_string()))?;
                if pointer + n > text1_len {
                    return Err(DiffError::SourceLengthMismatch {
                        consumed: pointer + n,
                        len: text1_len,
                    });
                }
                let text = char_slice(text1, pointer, pointer + n).to_string();
                pointer += n;
                if op == '=' {
                    diffs.push(Edit::equal(text));
                } else {
                    diffs.push(Edit::delete(text));
                }
            }
            other => return Err(DiffError::InvalidOperation(other)),
        }
    }
    if pointer != text1_len {
        return Err(DiffError::SourceLengthMismatch {
            consumed: pointer,
            len: text1_len,
        });
    }
    Ok(diffs)
}
