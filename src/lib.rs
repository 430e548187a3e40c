//! A text diff, fuzzy match, and patch engine for in-memory strings.
//!
//! `driftpatch` computes minimal-ish edit scripts between two texts, locates
//! fuzzy occurrences of a pattern near an expected position, and builds
//! position-independent patches that can be applied to a *drifted* derivative
//! of the original text, with per-patch success reporting.
//!
//! The crate has three tightly coupled subsystems:
//!
//! - The **diff engine**: prefix/suffix trimming, half-match decomposition,
//!   line-mode pre-reduction, Myers bisection, and the semantic and
//!   efficiency cleanup passes.
//! - The **fuzzy matcher**: a bitap (Shift-Or) scan scored by error count
//!   and distance from the expected location.
//! - The **patch engine**: patch synthesis from diffs, context growth,
//!   padding, size splitting, drift-tolerant application, and a textual
//!   serialization compatible with a GNU-diff-like format.
//!
//! ## Computing a diff
//!
//! ```rust
//! use driftpatch::{diff, source_text, target_text, DiffOptions};
//!
//! let diffs = diff("the quick brown fox", "the quick red fox", &DiffOptions::default());
//!
//! // The edit script always reconstructs both inputs.
//! assert_eq!(source_text(&diffs), "the quick brown fox");
//! assert_eq!(target_text(&diffs), "the quick red fox");
//! ```
//!
//! ## Making and applying a patch
//!
//! Patches record enough surrounding context to survive edits elsewhere in
//! the text. Applying them to a text that has drifted from the original
//! still works as long as each patch can be anchored by the fuzzy matcher:
//!
//! ```rust
//! use driftpatch::{patch_make_from_texts, patch_apply, ApplyOptions, DEFAULT_MARGIN};
//!
//! let patches = patch_make_from_texts(
//!     "The quick brown fox jumps over the lazy dog.",
//!     "That quick brown fox jumped over a lazy dog.",
//!     DEFAULT_MARGIN,
//! );
//!
//! // The target has drifted, but the patches still find their anchors.
//! let (patched, results) = patch_apply(
//!     &patches,
//!     "The quick red rabbit jumps over the tired tiger.",
//!     &ApplyOptions::default(),
//! );
//!
//! assert_eq!(patched, "That quick red rabbit jumped over a tired tiger.");
//! assert!(results.iter().all(|&ok| ok));
//! ```
//!
//! ## Fuzzy matching
//!
//! ```rust
//! use driftpatch::{find_match, MatchOptions};
//!
//! let text = "I am the very model of a modern major general.";
//! let options = MatchOptions::default().with_threshold(0.7);
//! assert_eq!(find_match(text, " that berry ", 5, &options), Some(4));
//! ```
//!
//! All operations are pure functions over their inputs: there is no global
//! state, no I/O, and no configuration outside the options structs. Texts
//! are measured and split in Unicode scalar values (`char`s), so indices
//! reported by the matcher and stored in patches are character positions,
//! not byte offsets.

use log::{debug, trace, warn};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Ceiling on the fuzzy matcher's pattern length, in characters.
///
/// This is the number of bits in the matcher's state word. It also bounds
/// the pre-image size of patches produced by [`patch_split_max()`], which
/// guarantees that [`patch_apply()`] only ever hands the matcher patterns
/// it can handle.
pub const BITS_PER_WORD: usize = 32;

/// Default number of context characters kept around a patch's edits.
pub const DEFAULT_MARGIN: usize = 4;

/// Default score ceiling for the fuzzy matcher (0.0 = exact, 1.0 = anything).
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.5;

/// Default distance scale for the fuzzy matcher's proximity penalty.
pub const DEFAULT_MATCH_DISTANCE: usize = 1000;

/// Default tolerance for content drift inside an oversized deletion.
pub const DEFAULT_DELETE_THRESHOLD: f64 = 0.5;

/// Default cost of an edit operation used by [`cleanup_efficiency()`].
pub const DEFAULT_EDIT_COST: usize = 4;

// --- Error Types ---

/// Represents errors that can occur while parsing patch text.
///
/// This error is returned by [`patch_from_text()`] when the input is not a
/// well-formed serialized patch list.
///
/// # Example
///
/// ```rust
/// use driftpatch::{patch_from_text, ParseError};
///
/// // The body line starts with 'x', which is not a valid line prefix.
/// let result = patch_from_text("@@ -1 +1 @@\nxoops\n");
///
/// assert!(matches!(result, Err(ParseError::InvalidPatch { .. })));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A line was neither a `@@` hunk header nor a valid body line
    /// (`+`, `-`, or space prefix).
    #[error("line {line} is neither a patch header nor a valid body line: {text:?}")]
    InvalidPatch {
        /// The 1-based line number of the offending line.
        line: usize,
        /// The offending line.
        text: String,
    },
    /// A body line contained a malformed percent escape.
    #[error("line {line} contains a malformed percent escape: {text:?}")]
    IllegalEscape {
        /// The 1-based line number of the offending line.
        line: usize,
        /// The offending line.
        text: String,
    },
}

// --- Diff Model ---

/// The operation carried by a single [`Diff`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// Text present in the source but not the target.
    Delete,
    /// Text present in the target but not the source.
    Insert,
    /// Text common to both sides.
    Equal,
}

/// One record of an edit script: an operation and the text it applies to.
///
/// A diff between two texts is an ordered `Vec<Diff>`. Concatenating the
/// text of every record that is not an [`Op::Insert`] reproduces the source
/// text; skipping [`Op::Delete`] records reproduces the target text.
///
/// # Example
///
/// ```rust
/// use driftpatch::{diff, Diff, DiffOptions};
///
/// let diffs = diff("abc", "ab123c", &DiffOptions::default());
/// assert_eq!(
///     diffs,
///     vec![Diff::equal("ab"), Diff::insert("123"), Diff::equal("c")]
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    /// The kind of edit this record describes.
    pub op: Op,
    /// The text the operation applies to.
    pub text: String,
}

impl Diff {
    /// Creates a new diff record.
    pub fn new(op: Op, text: impl Into<String>) -> Self {
        Diff {
            op,
            text: text.into(),
        }
    }

    /// Creates a [`Op::Delete`] record.
    pub fn delete(text: impl Into<String>) -> Self {
        Diff::new(Op::Delete, text)
    }

    /// Creates an [`Op::Insert`] record.
    pub fn insert(text: impl Into<String>) -> Self {
        Diff::new(Op::Insert, text)
    }

    /// Creates an [`Op::Equal`] record.
    pub fn equal(text: impl Into<String>) -> Self {
        Diff::new(Op::Equal, text)
    }
}

impl fmt::Display for Diff {
    /// Formats the record compactly for logs: `-[old]`, `+[new]`, `=[same]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.op {
            Op::Delete => '-',
            Op::Insert => '+',
            Op::Equal => '=',
        };
        write!(f, "{}[{}]", sign, self.text)
    }
}

// --- Options ---

/// Tuning knobs for the diff engine.
///
/// # Example
///
/// ```rust
/// use driftpatch::DiffOptions;
///
/// let options = DiffOptions::new().with_check_lines(false);
/// assert!(!options.check_lines);
/// assert_eq!(options.edit_cost, 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    /// When true, inputs longer than 100 characters on both sides are first
    /// diffed line-by-line and the result refined character-by-character.
    /// Faster on large texts at a slight cost in optimality.
    pub check_lines: bool,
    /// The cost of an edit operation in characters, used by
    /// [`cleanup_efficiency()`].
    pub edit_cost: usize,
}

impl Default for DiffOptions {
    fn default() -> Self {
        DiffOptions {
            check_lines: true,
            edit_cost: DEFAULT_EDIT_COST,
        }
    }
}

impl DiffOptions {
    /// Creates options with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the line-mode speedup is attempted.
    pub fn with_check_lines(mut self, check_lines: bool) -> Self {
        self.check_lines = check_lines;
        self
    }

    /// Sets the edit cost used by [`cleanup_efficiency()`].
    pub fn with_edit_cost(mut self, edit_cost: usize) -> Self {
        self.edit_cost = edit_cost;
        self
    }
}

/// Tuning knobs for the fuzzy matcher.
///
/// A candidate match at error level `e` and position `x` scores
/// `e / pattern_len + |x - loc| / distance`; candidates scoring above
/// `threshold` are rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchOptions {
    /// Score ceiling. 0.0 demands a perfect match at the exact expected
    /// location; 1.0 accepts nearly anything.
    pub threshold: f64,
    /// How far from the expected location a match may stray before its
    /// proximity penalty alone exceeds the threshold. A distance of 0
    /// demands a match at the exact expected location.
    pub distance: usize,
}

impl Default for MatchOptions {
    fn default() -> Self {
        MatchOptions {
            threshold: DEFAULT_MATCH_THRESHOLD,
            distance: DEFAULT_MATCH_DISTANCE,
        }
    }
}

impl MatchOptions {
    /// Creates options with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the score ceiling.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Sets the proximity distance scale.
    pub fn with_distance(mut self, distance: usize) -> Self {
        self.distance = distance;
        self
    }
}

/// Tuning knobs for [`patch_apply()`].
///
/// # Example
///
/// ```rust
/// use driftpatch::ApplyOptions;
///
/// let options = ApplyOptions::new()
///     .with_delete_threshold(0.6)
///     .with_match_distance(0);
/// assert_eq!(options.delete_threshold, 0.6);
/// assert_eq!(options.match_distance, 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApplyOptions {
    /// How much the content of an oversized deletion may have drifted
    /// before the patch is rejected, as a fraction of its length.
    pub delete_threshold: f64,
    /// Score ceiling handed to the matcher when anchoring each patch.
    pub match_threshold: f64,
    /// Distance scale handed to the matcher when anchoring each patch.
    pub match_distance: usize,
    /// Number of context characters used when padding and splitting.
    pub margin: usize,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        ApplyOptions {
            delete_threshold: DEFAULT_DELETE_THRESHOLD,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            match_distance: DEFAULT_MATCH_DISTANCE,
            margin: DEFAULT_MARGIN,
        }
    }
}

impl ApplyOptions {
    /// Creates options with the default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the drift tolerance for oversized deletions.
    pub fn with_delete_threshold(mut self, delete_threshold: f64) -> Self {
        self.delete_threshold = delete_threshold;
        self
    }

    /// Sets the matcher's score ceiling.
    pub fn with_match_threshold(mut self, match_threshold: f64) -> Self {
        self.match_threshold = match_threshold;
        self
    }

    /// Sets the matcher's distance scale.
    pub fn with_match_distance(mut self, match_distance: usize) -> Self {
        self.match_distance = match_distance;
        self
    }

    /// Sets the context margin.
    pub fn with_margin(mut self, margin: usize) -> Self {
        self.margin = margin;
        self
    }

    fn match_options(&self) -> MatchOptions {
        MatchOptions {
            threshold: self.match_threshold,
            distance: self.match_distance,
        }
    }
}

// --- Char Helpers ---

// The engine measures everything in characters, never bytes. These helpers
// bridge between `String` storage and character arithmetic.

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn take_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn skip_chars(s: &str, n: usize) -> String {
    s.chars().skip(n).collect()
}

/// First occurrence of `needle` in `haystack` at or after `from`.
fn find_sub(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| &haystack[i..i + needle.len()] == needle)
}

/// Last occurrence of `needle` in `haystack` starting at or before `from`.
fn rfind_sub(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if needle.len() > haystack.len() {
        return None;
    }
    let max_start = (haystack.len() - needle.len()).min(from);
    (0..=max_start)
        .rev()
        .find(|&i| &haystack[i..i + needle.len()] == needle)
}

// --- Text Utilities ---

/// Returns the number of characters common to the start of both texts.
///
/// # Example
///
/// ```rust
/// use driftpatch::common_prefix;
///
/// assert_eq!(common_prefix("1234abcdef", "1234xyz"), 4);
/// assert_eq!(common_prefix("abc", "xyz"), 0);
/// ```
pub fn common_prefix(text1: &str, text2: &str) -> usize {
    let t1: Vec<char> = text1.chars().collect();
    let t2: Vec<char> = text2.chars().collect();
    common_prefix_slices(&t1, &t2)
}

/// Returns the number of characters common to the end of both texts.
///
/// # Example
///
/// ```rust
/// use driftpatch::common_suffix;
///
/// assert_eq!(common_suffix("abcdef1234", "xyz1234"), 4);
/// ```
pub fn common_suffix(text1: &str, text2: &str) -> usize {
    let t1: Vec<char> = text1.chars().collect();
    let t2: Vec<char> = text2.chars().collect();
    common_suffix_slices(&t1, &t2)
}

/// Returns the length of the longest suffix of `text1` that is a prefix of
/// `text2`.
///
/// # Example
///
/// ```rust
/// use driftpatch::common_overlap;
///
/// assert_eq!(common_overlap("abcd", "cdef"), 2);
/// assert_eq!(common_overlap("fi", "i"), 1);
/// assert_eq!(common_overlap("abc", "xyz"), 0);
/// ```
pub fn common_overlap(text1: &str, text2: &str) -> usize {
    let t1: Vec<char> = text1.chars().collect();
    let t2: Vec<char> = text2.chars().collect();
    common_overlap_slices(&t1, &t2)
}

fn common_prefix_slices(a: &[char], b: &[char]) -> usize {
    let n = a.len().min(b.len());
    // Quick rejects before the binary search.
    if n == 0 || a[0] != b[0] {
        return 0;
    }
    let mut lo = 0usize;
    let mut hi = n;
    let mut mid = n;
    let mut start = 0usize;
    while lo < mid {
        if a[start..mid] == b[start..mid] {
            lo = mid;
            start = lo;
        } else {
            hi = mid;
        }
        mid = (hi - lo) / 2 + lo;
    }
    lo
}

fn common_suffix_slices(a: &[char], b: &[char]) -> usize {
    let n = a.len().min(b.len());
    if n == 0 || a[a.len() - 1] != b[b.len() - 1] {
        return 0;
    }
    let mut lo = 0usize;
    let mut hi = n;
    let mut mid = n;
    let mut end = 0usize;
    while lo < mid {
        if a[a.len() - mid..a.len() - end] == b[b.len() - mid..b.len() - end] {
            lo = mid;
            end = lo;
        } else {
            hi = mid;
        }
        mid = (hi - lo) / 2 + lo;
    }
    lo
}

fn common_overlap_slices(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    // Truncate to equal lengths; only the facing ends can overlap.
    let a = if a.len() > b.len() {
        &a[a.len() - b.len()..]
    } else {
        a
    };
    let b = if b.len() > a.len() { &b[..a.len()] } else { b };
    let text_length = a.len();
    if a == b {
        return text_length;
    }
    // Start with a single-character anchor and grow it each time it is
    // re-found, skipping over impossible lengths.
    let mut best = 0usize;
    let mut length = 1usize;
    loop {
        if length > text_length {
            return best;
        }
        let pattern = &a[text_length - length..];
        let found = match find_sub(b, pattern, 0) {
            Some(found) => found,
            None => return best,
        };
        length += found;
        if found == 0 || a[text_length - length..] == b[..length] {
            best = length;
            length += 1;
        }
    }
}

/// The result of [`lines_to_chars()`]: both texts compressed to one
/// character per unique line, plus the lookup table to reverse the mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedLines {
    /// `text1` with each line replaced by a character.
    pub chars1: String,
    /// `text2` with each line replaced by a character.
    pub chars2: String,
    /// Index-to-line lookup. Index 0 is a sentinel empty string.
    pub line_array: Vec<String>,
}

/// Compresses both texts to one character per unique line.
///
/// Lines keep their trailing `\n`. Codes are shared between the two texts,
/// so identical lines compress to the same character. The first text is
/// capped at 40,000 distinct lines and the combined table at 55,295 so that
/// a single character always suffices; past the cap, the rest of a text is
/// folded into one final line.
///
/// # Example
///
/// ```rust
/// use driftpatch::lines_to_chars;
///
/// let encoded = lines_to_chars("alpha\nbeta\n", "beta\nalpha\n");
/// assert_eq!(encoded.chars1, "\u{1}\u{2}");
/// assert_eq!(encoded.chars2, "\u{2}\u{1}");
/// assert_eq!(encoded.line_array, vec!["", "alpha\n", "beta\n"]);
/// ```
pub fn lines_to_chars(text1: &str, text2: &str) -> EncodedLines {
    let mut line_array: Vec<String> = vec![String::new()];
    let mut line_hash: HashMap<String, usize> = HashMap::new();
    // The first cap leaves room for text2's lines below the surrogate range.
    let chars1 = munge_lines(text1, &mut line_array, &mut line_hash, 40_000);
    let chars2 = munge_lines(text2, &mut line_array, &mut line_hash, 55_295);
    EncodedLines {
        chars1,
        chars2,
        line_array,
    }
}

fn munge_lines(
    text: &str,
    line_array: &mut Vec<String>,
    line_hash: &mut HashMap<String, usize>,
    max_lines: usize,
) -> String {
    let mut chars = String::new();
    let mut line_start = 0usize;
    while line_start < text.len() {
        let mut line_end = match text[line_start..].find('\n') {
            Some(i) => line_start + i + 1,
            None => text.len(),
        };
        let mut line = &text[line_start..line_end];
        match line_hash.get(line) {
            Some(&code) => chars.push(line_code(code)),
            None => {
                if line_array.len() == max_lines {
                    // Alphabet exhausted: fold the rest of the text into
                    // one final line.
                    line = &text[line_start..];
                    line_end = text.len();
                }
                line_array.push(line.to_string());
                let code = line_array.len() - 1;
                line_hash.insert(line.to_string(), code);
                chars.push(line_code(code));
            }
        }
        line_start = line_end;
    }
    chars
}

fn line_code(code: usize) -> char {
    // Codes stay below the surrogate range by construction of the caps.
    char::from_u32(code as u32).unwrap_or(char::REPLACEMENT_CHARACTER)
}

/// Expands compressed diffs produced via [`lines_to_chars()`] back into
/// full lines, rewriting each record's text in place.
///
/// # Example
///
/// ```rust
/// use driftpatch::{chars_to_lines, lines_to_chars, Diff};
///
/// let encoded = lines_to_chars("alpha\nbeta\n", "beta\n");
/// let mut diffs = vec![Diff::equal(encoded.chars1.clone())];
/// chars_to_lines(&mut diffs, &encoded.line_array);
/// assert_eq!(diffs[0].text, "alpha\nbeta\n");
/// ```
pub fn chars_to_lines(diffs: &mut [Diff], line_array: &[String]) {
    for diff in diffs.iter_mut() {
        let mut text = String::new();
        for ch in diff.text.chars() {
            text.push_str(line_array.get(ch as usize).map_or("", String::as_str));
        }
        diff.text = text;
    }
}

// --- Diff Engine ---

/// Computes the edit script that turns `text1` into `text2`.
///
/// The result is canonical: adjacent records never share an operation,
/// equalities are never empty, and concatenating the non-insert (resp.
/// non-delete) texts reproduces `text1` (resp. `text2`).
///
/// # Example
///
/// ```rust
/// use driftpatch::{diff, Diff, DiffOptions};
///
/// let diffs = diff("abc", "ab", &DiffOptions::default());
/// assert_eq!(diffs, vec![Diff::equal("ab"), Diff::delete("c")]);
/// ```
pub fn diff(text1: &str, text2: &str, options: &DiffOptions) -> Vec<Diff> {
    diff_with_cancel(text1, text2, options, &|| true)
}

/// Like [`diff()`], but polls `will_continue` at the top of each bisection
/// round.
///
/// When the callback returns `false` the bisection of that subproblem is
/// abandoned and replaced by a coarse delete-everything/insert-everything
/// pair. The overall result is still a valid edit script, just not a
/// minimal one. Useful to bound worst-case latency on pathological inputs.
///
/// # Example
///
/// ```rust
/// use driftpatch::{diff_with_cancel, source_text, target_text, Diff, DiffOptions};
///
/// // A callback that gives up immediately forces the coarse fallback.
/// let diffs = diff_with_cancel("abcy", "xxde", &DiffOptions::default(), &|| false);
/// assert_eq!(diffs, vec![Diff::delete("abcy"), Diff::insert("xxde")]);
/// assert_eq!(source_text(&diffs), "abcy");
/// assert_eq!(target_text(&diffs), "xxde");
/// ```
pub fn diff_with_cancel(
    text1: &str,
    text2: &str,
    options: &DiffOptions,
    will_continue: &dyn Fn() -> bool,
) -> Vec<Diff> {
    let t1: Vec<char> = text1.chars().collect();
    let t2: Vec<char> = text2.chars().collect();
    trace!("diffing {} chars against {} chars", t1.len(), t2.len());
    diff_main(&t1, &t2, options.check_lines, will_continue)
}

fn diff_main(t1: &[char], t2: &[char], check_lines: bool, wc: &dyn Fn() -> bool) -> Vec<Diff> {
    if t1 == t2 {
        if t1.is_empty() {
            return Vec::new();
        }
        return vec![Diff::equal(t1.iter().collect::<String>())];
    }

    // Trim off any common prefix and suffix before the expensive work.
    let prefix_len = common_prefix_slices(t1, t2);
    let prefix = &t1[..prefix_len];
    let t1 = &t1[prefix_len..];
    let t2 = &t2[prefix_len..];
    let suffix_len = common_suffix_slices(t1, t2);
    let suffix = &t1[t1.len() - suffix_len..];
    let t1 = &t1[..t1.len() - suffix_len];
    let t2 = &t2[..t2.len() - suffix_len];

    let mut diffs = diff_compute(t1, t2, check_lines, wc);

    if !prefix.is_empty() {
        diffs.insert(0, Diff::equal(prefix.iter().collect::<String>()));
    }
    if !suffix.is_empty() {
        diffs.push(Diff::equal(suffix.iter().collect::<String>()));
    }
    cleanup_merge(&mut diffs);
    diffs
}

fn diff_compute(t1: &[char], t2: &[char], check_lines: bool, wc: &dyn Fn() -> bool) -> Vec<Diff> {
    if t1.is_empty() {
        return vec![Diff::insert(t2.iter().collect::<String>())];
    }
    if t2.is_empty() {
        return vec![Diff::delete(t1.iter().collect::<String>())];
    }

    let t1_is_long = t1.len() > t2.len();
    let (long, short) = if t1_is_long { (t1, t2) } else { (t2, t1) };
    if let Some(i) = find_sub(long, short, 0) {
        // The shorter text sits inside the longer one.
        trace!("substring containment at {}", i);
        let op = if t1_is_long { Op::Delete } else { Op::Insert };
        return vec![
            Diff::new(op, long[..i].iter().collect::<String>()),
            Diff::equal(short.iter().collect::<String>()),
            Diff::new(op, long[i + short.len()..].iter().collect::<String>()),
        ];
    }
    if short.len() == 1 {
        // After the containment check a single character can't match both
        // sides.
        return vec![
            Diff::delete(t1.iter().collect::<String>()),
            Diff::insert(t2.iter().collect::<String>()),
        ];
    }

    if let Some(hm) = half_match(t1, t2) {
        trace!("half match of {} chars", hm.mid_common.len());
        let mut diffs = diff_main(hm.text1_a, hm.text2_a, check_lines, wc);
        diffs.push(Diff::equal(hm.mid_common.iter().collect::<String>()));
        diffs.extend(diff_main(hm.text1_b, hm.text2_b, check_lines, wc));
        return diffs;
    }

    if check_lines && t1.len() > 100 && t2.len() > 100 {
        return diff_line_mode(t1, t2, wc);
    }

    diff_bisect(t1, t2, wc)
}

struct HalfMatch<'a> {
    text1_a: &'a [char],
    text1_b: &'a [char],
    text2_a: &'a [char],
    text2_b: &'a [char],
    mid_common: &'a [char],
}

/// Looks for a common substring at least half the length of the longer
/// text. Splitting there turns one big diff into two much smaller ones.
fn half_match<'a>(t1: &'a [char], t2: &'a [char]) -> Option<HalfMatch<'a>> {
    let (long, short) = if t1.len() > t2.len() { (t1, t2) } else { (t2, t1) };
    if long.len() < 4 || short.len() * 2 < long.len() {
        return None;
    }

    // Seed once from the second quarter and once from the second half of
    // the longer text.
    let hm1 = half_match_at(long, short, (long.len() + 3) / 4);
    let hm2 = half_match_at(long, short, (long.len() + 1) / 2);
    let hm = match (hm1, hm2) {
        (None, None) => return None,
        (Some(hm1), None) => hm1,
        (None, Some(hm2)) => hm2,
        (Some(hm1), Some(hm2)) => {
            if hm1.4.len() > hm2.4.len() {
                hm1
            } else {
                hm2
            }
        }
    };

    Some(if t1.len() > t2.len() {
        HalfMatch {
            text1_a: hm.0,
            text1_b: hm.1,
            text2_a: hm.2,
            text2_b: hm.3,
            mid_common: hm.4,
        }
    } else {
        HalfMatch {
            text1_a: hm.2,
            text1_b: hm.3,
            text2_a: hm.0,
            text2_b: hm.1,
            mid_common: hm.4,
        }
    })
}

type HalfMatchParts<'a> = (&'a [char], &'a [char], &'a [char], &'a [char], &'a [char]);

fn half_match_at<'a>(long: &'a [char], short: &'a [char], i: usize) -> Option<HalfMatchParts<'a>> {
    let seed = &long[i..i + long.len() / 4];
    let mut best: Option<HalfMatchParts<'a>> = None;
    let mut best_common_len = 0usize;
    let mut j = find_sub(short, seed, 0);
    while let Some(jj) = j {
        let prefix_len = common_prefix_slices(&long[i..], &short[jj..]);
        let suffix_len = common_suffix_slices(&long[..i], &short[..jj]);
        if best_common_len < suffix_len + prefix_len {
            best_common_len = suffix_len + prefix_len;
            best = Some((
                &long[..i - suffix_len],
                &long[i + prefix_len..],
                &short[..jj - suffix_len],
                &short[jj + prefix_len..],
                &short[jj - suffix_len..jj + prefix_len],
            ));
        }
        j = find_sub(short, seed, jj + 1);
    }
    if best_common_len * 2 >= long.len() {
        best
    } else {
        None
    }
}

fn diff_line_mode(t1: &[char], t2: &[char], wc: &dyn Fn() -> bool) -> Vec<Diff> {
    let text1: String = t1.iter().collect();
    let text2: String = t2.iter().collect();
    let encoded = lines_to_chars(&text1, &text2);
    debug!(
        "line mode compressed {}+{} chars to {}+{}",
        t1.len(),
        t2.len(),
        encoded.chars1.chars().count(),
        encoded.chars2.chars().count()
    );
    let c1: Vec<char> = encoded.chars1.chars().collect();
    let c2: Vec<char> = encoded.chars2.chars().collect();
    let mut diffs = diff_main(&c1, &c2, false, wc);
    chars_to_lines(&mut diffs, &encoded.line_array);
    cleanup_semantic(&mut diffs);

    // Rediff each replacement block, this time character by character.
    diffs.push(Diff::equal(""));
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
            }
            Op::Delete => {
                count_delete += 1;
                text_delete.push_str(&diffs[pointer].text);
            }
            Op::Equal => {
                if count_delete >= 1 && count_insert >= 1 {
                    let start = pointer - count_delete - count_insert;
                    let td: Vec<char> = text_delete.chars().collect();
                    let ti: Vec<char> = text_insert.chars().collect();
                    let sub = diff_main(&td, &ti, false, wc);
                    let sub_len = sub.len();
                    let _ = diffs.splice(start..pointer, sub);
                    pointer = start + sub_len;
                }
                count_insert = 0;
                count_delete = 0;
                text_delete.clear();
                text_insert.clear();
            }
        }
        pointer += 1;
    }
    diffs.pop();
    diffs
}

fn diff_bisect(t1: &[char], t2: &[char], wc: &dyn Fn() -> bool) -> Vec<Diff> {
    let len1 = t1.len() as isize;
    let len2 = t2.len() as isize;
    let max_d = (len1 + len2 + 1) / 2;
    let v_offset = max_d;
    let v_length = 2 * max_d;
    let mut v1 = vec![-1isize; v_length as usize];
    let mut v2 = vec![-1isize; v_length as usize];
    v1[(v_offset + 1) as usize] = 0;
    v2[(v_offset + 1) as usize] = 0;
    let delta = len1 - len2;
    // With an odd delta the frontiers can only meet while stepping forward;
    // with an even delta only while stepping in reverse.
    let front = delta % 2 != 0;
    // Offsets for start and end of k loops; prevents mapping of space
    // beyond the grid.
    let mut k1start = 0isize;
    let mut k1end = 0isize;
    let mut k2start = 0isize;
    let mut k2end = 0isize;
    for d in 0..max_d {
        if !wc() {
            debug!("bisection abandoned at depth {}", d);
            break;
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
            while x1 < len1 && y1 < len2 && t1[x1 as usize] == t2[y1 as usize] {
                x1 += 1;
                y1 += 1;
            }
            v1[k1_offset] = x1;
            if x1 > len1 {
                // Ran off the right of the graph.
                k1end += 2;
            } else if y1 > len2 {
                // Ran off the bottom of the graph.
                k1start += 2;
            } else if front {
                let k2_offset = v_offset + delta - k1;
                if k2_offset >= 0 && k2_offset < v_length && v2[k2_offset as usize] != -1 {
                    // Mirror x2 onto top-left coordinate system.
                    let x2 = len1 - v2[k2_offset as usize];
                    if x1 >= x2 {
                        // Overlap detected.
                        return bisect_split(t1, t2, x1 as usize, y1 as usize, wc);
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
            while x2 < len1
                && y2 < len2
                && t1[(len1 - x2 - 1) as usize] == t2[(len2 - y2 - 1) as usize]
            {
                x2 += 1;
                y2 += 1;
            }
            v2[k2_offset] = x2;
            if x2 > len1 {
                k2end += 2;
            } else if y2 > len2 {
                k2start += 2;
            } else if !front {
                let k1_offset = v_offset + delta - k2;
                if k1_offset >= 0 && k1_offset < v_length && v1[k1_offset as usize] != -1 {
                    let x1 = v1[k1_offset as usize];
                    let y1 = v_offset + x1 - k1_offset;
                    // Mirror x2 onto top-left coordinate system.
                    let x2 = len1 - x2;
                    if x1 >= x2 {
                        // Overlap detected.
                        return bisect_split(t1, t2, x1 as usize, y1 as usize, wc);
                    }
                }
            }
            k2 += 2;
        }
    }
    // Number of diffs equals number of characters, no commonality at all,
    // or the callback asked us to stop.
    vec![
        Diff::delete(t1.iter().collect::<String>()),
        Diff::insert(t2.iter().collect::<String>()),
    ]
}

fn bisect_split(t1: &[char], t2: &[char], x: usize, y: usize, wc: &dyn Fn() -> bool) -> Vec<Diff> {
    let mut diffs = diff_main(&t1[..x], &t2[..y], false, wc);
    diffs.extend(diff_main(&t1[x..], &t2[y..], false, wc));
    diffs
}

// --- Cleanup Passes ---

/// Reorders and merges like edit sections, canonicalizing the diff.
///
/// After this pass no two adjacent records share an operation, no equality
/// is empty, and any common prefix or suffix of a delete/insert pair has
/// been factored out into the surrounding equalities. Running the pass
/// twice is a no-op.
///
/// # Example
///
/// ```rust
/// use driftpatch::{cleanup_merge, Diff};
///
/// let mut diffs = vec![Diff::equal("a"), Diff::equal("b"), Diff::equal("c")];
/// cleanup_merge(&mut diffs);
/// assert_eq!(diffs, vec![Diff::equal("abc")]);
/// ```
pub fn cleanup_merge(diffs: &mut Vec<Diff>) {
    if diffs.is_empty() {
        return;
    }
    // Sentinel so the final run gets flushed like any other.
    diffs.push(Diff::equal(""));
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
                    if count_delete != 0 && count_insert != 0 {
                        // Factor out any common prefix.
                        let prefix_len = common_prefix(&text_insert, &text_delete);
                        if prefix_len != 0 {
                            let prefix = take_chars(&text_insert, prefix_len);
                            let first = pointer - count_delete - count_insert;
                            if first > 0 && diffs[first - 1].op == Op::Equal {
                                diffs[first - 1].text.push_str(&prefix);
                            } else {
                                diffs.insert(0, Diff::equal(prefix));
                                pointer += 1;
                            }
                            text_insert = skip_chars(&text_insert, prefix_len);
                            text_delete = skip_chars(&text_delete, prefix_len);
                        }
                        // Factor out any common suffix.
                        let suffix_len = common_suffix(&text_insert, &text_delete);
                        if suffix_len != 0 {
                            let ti_len = char_len(&text_insert);
                            let td_len = char_len(&text_delete);
                            let suffix = skip_chars(&text_insert, ti_len - suffix_len);
                            diffs[pointer].text.insert_str(0, &suffix);
                            text_insert = take_chars(&text_insert, ti_len - suffix_len);
                            text_delete = take_chars(&text_delete, td_len - suffix_len);
                        }
                    }
                    // Replace the run with the merged records.
                    let first = pointer - count_delete - count_insert;
                    diffs.drain(first..pointer);
                    pointer = first;
                    if !text_delete.is_empty() {
                        diffs.insert(pointer, Diff::delete(text_delete.clone()));
                        pointer += 1;
                    }
                    if !text_insert.is_empty() {
                        diffs.insert(pointer, Diff::insert(text_insert.clone()));
                        pointer += 1;
                    }
                    pointer += 1;
                } else if pointer != 0 && diffs[pointer - 1].op == Op::Equal {
                    // Merge this equality with the previous one.
                    let text = diffs.remove(pointer).text;
                    diffs[pointer - 1].text.push_str(&text);
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

    // Second pass: single edits surrounded by equalities can sometimes be
    // shifted sideways to eliminate one of the equalities.
    let mut changes = false;
    let mut pointer = 1usize;
    while pointer + 1 < diffs.len() {
        if diffs[pointer - 1].op == Op::Equal && diffs[pointer + 1].op == Op::Equal {
            let prev = diffs[pointer - 1].text.clone();
            let next = diffs[pointer + 1].text.clone();
            if diffs[pointer].text.ends_with(&prev) {
                // Shift the edit over the previous equality.
                let edit = &diffs[pointer].text;
                let shifted = format!("{}{}", prev, &edit[..edit.len() - prev.len()]);
                diffs[pointer].text = shifted;
                diffs[pointer + 1].text = format!("{}{}", prev, next);
                diffs.remove(pointer - 1);
                changes = true;
            } else if diffs[pointer].text.starts_with(&next) {
                // Shift the edit over the next equality.
                diffs[pointer - 1].text.push_str(&next);
                let edit = &diffs[pointer].text;
                let shifted = format!("{}{}", &edit[next.len()..], next);
                diffs[pointer].text = shifted;
                diffs.remove(pointer + 1);
                changes = true;
            }
        }
        pointer += 1;
    }
    // A shift can expose further merge opportunities.
    if changes {
        cleanup_merge(diffs);
    }
}

/// Reduces the number of edits by eliminating semantically trivial
/// equalities, then factors out overlaps between adjacent edits.
///
/// An equality no longer than the edits on both of its sides is not worth
/// keeping and gets folded into the surrounding edits. Afterwards, when a
/// deletion and insertion share a large overlap, the overlap is promoted
/// to an equality.
///
/// # Example
///
/// ```rust
/// use driftpatch::{cleanup_semantic, Diff};
///
/// let mut diffs = vec![Diff::delete("a"), Diff::equal("b"), Diff::delete("c")];
/// cleanup_semantic(&mut diffs);
/// assert_eq!(diffs, vec![Diff::delete("abc"), Diff::insert("b")]);
/// ```
pub fn cleanup_semantic(diffs: &mut Vec<Diff>) {
    let mut changes = false;
    // Indices of equalities that might be eliminated. Index stack rather
    // than pointers: the splices below would invalidate addresses.
    let mut equalities: Vec<usize> = Vec::new();
    let mut last_equality: Option<String> = None;
    let mut pointer: isize = 0;
    // Number of characters changed before and after the candidate equality.
    let mut len_ins1 = 0usize;
    let mut len_del1 = 0usize;
    let mut len_ins2 = 0usize;
    let mut len_del2 = 0usize;
    while (pointer as usize) < diffs.len() {
        let p = pointer as usize;
        if diffs[p].op == Op::Equal {
            equalities.push(p);
            len_ins1 = len_ins2;
            len_del1 = len_del2;
            len_ins2 = 0;
            len_del2 = 0;
            last_equality = Some(diffs[p].text.clone());
        } else {
            let text_len = char_len(&diffs[p].text);
            if diffs[p].op == Op::Insert {
                len_ins2 += text_len;
            } else {
                len_del2 += text_len;
            }
            // An equality smaller than or equal to the edits on both of
            // its sides gets eliminated.
            let eliminate = match &last_equality {
                Some(eq) if !eq.is_empty() => {
                    let eq_len = char_len(eq);
                    eq_len <= len_ins1.max(len_del1) && eq_len <= len_ins2.max(len_del2)
                }
                _ => false,
            };
            if eliminate {
                let eq_text = last_equality.take().unwrap_or_default();
                let idx = *equalities.last().expect("candidate stack is non-empty");
                // Duplicate the equality as a deletion and retag the
                // original record as an insertion.
                diffs.insert(idx, Diff::delete(eq_text));
                diffs[idx + 1].op = Op::Insert;
                // Throw away the equality just deleted and the one before
                // it, which needs to be reevaluated.
                equalities.pop();
                equalities.pop();
                pointer = equalities.last().map_or(-1, |&e| e as isize);
                len_ins1 = 0;
                len_del1 = 0;
                len_ins2 = 0;
                len_del2 = 0;
                changes = true;
            }
        }
        pointer += 1;
    }

    if changes {
        cleanup_merge(diffs);
    }
    cleanup_semantic_lossless(diffs);

    // Find any overlaps between deletions and insertions, e.g.
    // <del>abcxxx</del><ins>xxxdef</ins> becomes <del>abc</del>xxx<ins>def</ins>
    // and <del>xxxabc</del><ins>defxxx</ins> becomes <ins>def</ins>xxx<del>abc</del>.
    // Only extract an overlap at least half the size of an edit.
    let mut pointer = 1usize;
    while pointer < diffs.len() {
        if diffs[pointer - 1].op == Op::Delete && diffs[pointer].op == Op::Insert {
            let deletion: Vec<char> = diffs[pointer - 1].text.chars().collect();
            let insertion: Vec<char> = diffs[pointer].text.chars().collect();
            let overlap1 = common_overlap_slices(&deletion, &insertion);
            let overlap2 = common_overlap_slices(&insertion, &deletion);
            if overlap1 >= overlap2 {
                if overlap1 * 2 >= deletion.len() || overlap1 * 2 >= insertion.len() {
                    diffs.insert(
                        pointer,
                        Diff::equal(insertion[..overlap1].iter().collect::<String>()),
                    );
                    diffs[pointer - 1].text = deletion[..deletion.len() - overlap1].iter().collect();
                    diffs[pointer + 1].text = insertion[overlap1..].iter().collect();
                    pointer += 1;
                }
            } else if overlap2 * 2 >= deletion.len() || overlap2 * 2 >= insertion.len() {
                // Reversed overlap: the end of the insertion matches the
                // start of the deletion.
                diffs.insert(
                    pointer,
                    Diff::equal(deletion[..overlap2].iter().collect::<String>()),
                );
                diffs[pointer - 1] = Diff::insert(
                    insertion[..insertion.len() - overlap2].iter().collect::<String>(),
                );
                diffs[pointer + 1] =
                    Diff::delete(deletion[overlap2..].iter().collect::<String>());
                pointer += 1;
            }
            pointer += 1;
        }
        pointer += 1;
    }
}

/// Slides each single edit surrounded by equalities sideways to align it
/// with logical boundaries (line breaks, sentence ends, word edges).
///
/// Does not change the number of edits, only where each edit sits, so the
/// reconstructed texts are untouched.
///
/// # Example
///
/// ```rust
/// use driftpatch::{cleanup_semantic_lossless, Diff};
///
/// let mut diffs = vec![
///     Diff::equal("The c"),
///     Diff::insert("ow and the c"),
///     Diff::equal("at."),
/// ];
/// cleanup_semantic_lossless(&mut diffs);
/// assert_eq!(
///     diffs,
///     vec![
///         Diff::equal("The "),
///         Diff::insert("cow and the "),
///         Diff::equal("cat."),
///     ]
/// );
/// ```
pub fn cleanup_semantic_lossless(diffs: &mut Vec<Diff>) {
    let mut pointer: isize = 1;
    // Intentionally ignore the first and last element (they don't qualify).
    while pointer + 1 < diffs.len() as isize {
        let p = pointer as usize;
        if diffs[p - 1].op == Op::Equal && diffs[p + 1].op == Op::Equal {
            // This is a single edit surrounded by equalities.
            let mut equality1: Vec<char> = diffs[p - 1].text.chars().collect();
            let mut edit: Vec<char> = diffs[p].text.chars().collect();
            let mut equality2: Vec<char> = diffs[p + 1].text.chars().collect();

            // First, shift the edit as far left as possible.
            let common = common_suffix_slices(&equality1, &edit);
            if common > 0 {
                let common_str: Vec<char> = edit[edit.len() - common..].to_vec();
                equality1.truncate(equality1.len() - common);
                let mut shifted = common_str.clone();
                shifted.extend_from_slice(&edit[..edit.len() - common]);
                edit = shifted;
                let mut prefixed = common_str;
                prefixed.extend_from_slice(&equality2);
                equality2 = prefixed;
            }

            // Then step right one character at a time, keeping the position
            // with the best boundary score. Ties prefer the rightmost
            // position, which keeps trailing whitespace attached to edits.
            let mut best_equality1 = equality1.clone();
            let mut best_edit = edit.clone();
            let mut best_equality2 = equality2.clone();
            let mut best_score =
                boundary_score(&equality1, &edit) + boundary_score(&edit, &equality2);
            while !edit.is_empty() && !equality2.is_empty() && edit[0] == equality2[0] {
                let c = equality2[0];
                equality1.push(c);
                edit.remove(0);
                edit.push(c);
                equality2.remove(0);
                let score = boundary_score(&equality1, &edit) + boundary_score(&edit, &equality2);
                if score >= best_score {
                    best_score = score;
                    best_equality1 = equality1.clone();
                    best_edit = edit.clone();
                    best_equality2 = equality2.clone();
                }
            }

            let best_eq1: String = best_equality1.iter().collect();
            if diffs[p - 1].text != best_eq1 {
                // An improvement was found.
                let mut p = p;
                if !best_eq1.is_empty() {
                    diffs[p - 1].text = best_eq1;
                } else {
                    diffs.remove(p - 1);
                    pointer -= 1;
                    p -= 1;
                }
                diffs[p].text = best_edit.iter().collect();
                let best_eq2: String = best_equality2.iter().collect();
                if !best_eq2.is_empty() {
                    diffs[p + 1].text = best_eq2;
                } else {
                    diffs.remove(p + 1);
                    pointer -= 1;
                }
            }
        }
        pointer += 1;
    }
}

/// Scores the quality of the boundary between two texts. 6 is best (one
/// side empty), 0 is worst (splitting a word).
fn boundary_score(one: &[char], two: &[char]) -> usize {
    if one.is_empty() || two.is_empty() {
        // Edges are the best.
        return 6;
    }
    let char1 = one[one.len() - 1];
    let char2 = two[0];
    let non_alnum1 = !char1.is_alphanumeric();
    let non_alnum2 = !char2.is_alphanumeric();
    let whitespace1 = non_alnum1 && char1.is_whitespace();
    let whitespace2 = non_alnum2 && char2.is_whitespace();
    let line_break1 = whitespace1 && (char1 == '\n' || char1 == '\r');
    let line_break2 = whitespace2 && (char2 == '\n' || char2 == '\r');
    let blank_line1 = line_break1 && is_blank_line_end(one);
    let blank_line2 = line_break2 && is_blank_line_start(two);

    if blank_line1 || blank_line2 {
        return 5;
    }
    if line_break1 || line_break2 {
        return 4;
    }
    if non_alnum1 && !whitespace1 && whitespace2 {
        // End of a sentence.
        return 3;
    }
    if whitespace1 || whitespace2 {
        return 2;
    }
    if non_alnum1 || non_alnum2 {
        return 1;
    }
    0
}

fn is_blank_line_end(s: &[char]) -> bool {
    s.ends_with(&['\n', '\n']) || s.ends_with(&['\n', '\r', '\n'])
}

fn is_blank_line_start(s: &[char]) -> bool {
    let mut i = 0usize;
    if s.get(i) == Some(&'\r') {
        i += 1;
    }
    if s.get(i) != Some(&'\n') {
        return false;
    }
    i += 1;
    if s.get(i) == Some(&'\r') {
        i += 1;
    }
    s.get(i) == Some(&'\n')
}

/// Reduces the number of edits by eliminating operationally trivial
/// equalities.
///
/// A short equality wedged between edits on both sides costs more to keep
/// than to fold into the edits, where the cost of an edit is `edit_cost`
/// characters. Unlike [`cleanup_semantic()`] this considers the shape of
/// the surrounding edits, not their content.
pub fn cleanup_efficiency(diffs: &mut Vec<Diff>, edit_cost: usize) {
    let mut changes = false;
    // Indices of equalities that might be eliminated; an index stack for
    // the same reason as in cleanup_semantic.
    let mut equalities: Vec<usize> = Vec::new();
    let mut last_equality: Option<String> = None;
    let mut pointer: isize = 0;
    // Is there an insertion or deletion before or after the candidate?
    let mut pre_ins = false;
    let mut pre_del = false;
    let mut post_ins = false;
    let mut post_del = false;
    while (pointer as usize) < diffs.len() {
        let p = pointer as usize;
        if diffs[p].op == Op::Equal {
            if char_len(&diffs[p].text) < edit_cost && (post_ins || post_del) {
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
            // Five configurations to be split:
            // <ins>A</ins><del>B</del>XY<ins>C</ins><del>D</del>
            // <ins>A</ins>X<ins>C</ins><del>D</del>
            // <ins>A</ins><del>B</del>X<ins>C</ins>
            // <ins>A</del>X<ins>C</ins><del>D</del>
            // <ins>A</ins><del>B</del>X<del>C</del>
            let flags = pre_ins as usize + pre_del as usize + post_ins as usize + post_del as usize;
            let eliminate = match &last_equality {
                Some(eq) if !eq.is_empty() => {
                    (pre_ins && pre_del && post_ins && post_del)
                        || (char_len(eq) * 2 < edit_cost && flags == 3)
                }
                _ => false,
            };
            if eliminate {
                let eq_text = last_equality.take().unwrap_or_default();
                let idx = *equalities.last().expect("candidate stack is non-empty");
                diffs.insert(idx, Diff::delete(eq_text));
                diffs[idx + 1].op = Op::Insert;
                equalities.pop();
                if pre_ins && pre_del {
                    // No changes made which could affect previous entry,
                    // keep going forward.
                    post_ins = true;
                    post_del = true;
                    equalities.clear();
                } else {
                    // Throw away the previous equality and reevaluate.
                    equalities.pop();
                    pointer = equalities.last().map_or(-1, |&e| e as isize);
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

// --- Diff Helpers ---

/// Rebuilds the source text from a diff, skipping insertions.
///
/// # Example
///
/// ```rust
/// use driftpatch::{source_text, Diff};
///
/// let diffs = vec![Diff::equal("jump"), Diff::delete("s"), Diff::insert("ed")];
/// assert_eq!(source_text(&diffs), "jumps");
/// ```
pub fn source_text(diffs: &[Diff]) -> String {
    diffs
        .iter()
        .filter(|d| d.op != Op::Insert)
        .map(|d| d.text.as_str())
        .collect()
}

/// Rebuilds the target text from a diff, skipping deletions.
///
/// # Example
///
/// ```rust
/// use driftpatch::{target_text, Diff};
///
/// let diffs = vec![Diff::equal("jump"), Diff::delete("s"), Diff::insert("ed")];
/// assert_eq!(target_text(&diffs), "jumped");
/// ```
pub fn target_text(diffs: &[Diff]) -> String {
    diffs
        .iter()
        .filter(|d| d.op != Op::Delete)
        .map(|d| d.text.as_str())
        .collect()
}

/// Maps a character position in the source text to the corresponding
/// position in the target text.
///
/// A position inside a deletion maps to the spot the deleted run collapsed
/// to.
///
/// # Example
///
/// ```rust
/// use driftpatch::{transpose_position, Diff};
///
/// let diffs = vec![Diff::delete("a"), Diff::insert("1234"), Diff::equal("xyz")];
/// assert_eq!(transpose_position(&diffs, 2), 5);
///
/// let diffs = vec![Diff::equal("a"), Diff::delete("1234"), Diff::equal("xyz")];
/// assert_eq!(transpose_position(&diffs, 3), 1);
/// ```
pub fn transpose_position(diffs: &[Diff], loc: usize) -> usize {
    let mut chars1 = 0usize;
    let mut chars2 = 0usize;
    let mut last_chars1 = 0usize;
    let mut last_chars2 = 0usize;
    let mut hit: Option<&Diff> = None;
    for diff in diffs {
        if diff.op != Op::Insert {
            chars1 += char_len(&diff.text);
        }
        if diff.op != Op::Delete {
            chars2 += char_len(&diff.text);
        }
        if chars1 > loc {
            hit = Some(diff);
            break;
        }
        last_chars1 = chars1;
        last_chars2 = chars2;
    }
    match hit {
        // The location was deleted.
        Some(diff) if diff.op == Op::Delete => last_chars2,
        _ => last_chars2 + (loc - last_chars1),
    }
}

/// Computes the Levenshtein distance implied by a diff, in characters.
///
/// # Example
///
/// ```rust
/// use driftpatch::{levenshtein, Diff};
///
/// let diffs = vec![
///     Diff::delete("abc"),
///     Diff::insert("1234"),
///     Diff::equal("xyz"),
/// ];
/// assert_eq!(levenshtein(&diffs), 4);
/// ```
pub fn levenshtein(diffs: &[Diff]) -> usize {
    let mut distance = 0usize;
    let mut insertions = 0usize;
    let mut deletions = 0usize;
    for diff in diffs {
        match diff.op {
            Op::Insert => insertions += char_len(&diff.text),
            Op::Delete => deletions += char_len(&diff.text),
            Op::Equal => {
                // A deletion and an insertion is one substitution.
                distance += insertions.max(deletions);
                insertions = 0;
                deletions = 0;
            }
        }
    }
    distance + insertions.max(deletions)
}

// --- Fuzzy Matcher ---

/// Locates the best fuzzy occurrence of `pattern` in `text` near `loc`.
///
/// Returns the character index of the best match, or `None` if no match
/// scores within the configured threshold. The matcher is total: patterns
/// longer than [`BITS_PER_WORD`] characters simply return `None`.
///
/// # Example
///
/// ```rust
/// use driftpatch::{find_match, MatchOptions};
///
/// let options = MatchOptions::default();
/// // Exact substring at the expected location.
/// assert_eq!(find_match("abcdef", "de", 3, &options), Some(3));
/// // Fuzzy match nearby.
/// assert_eq!(find_match("abcdef", "defy", 4, &options), Some(3));
/// // Nothing to match against.
/// assert_eq!(find_match("", "abcdef", 1, &options), None);
/// ```
pub fn find_match(text: &str, pattern: &str, loc: usize, options: &MatchOptions) -> Option<usize> {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    find_match_inner(&t, &p, loc, options)
}

fn find_match_inner(
    text: &[char],
    pattern: &[char],
    loc: usize,
    options: &MatchOptions,
) -> Option<usize> {
    let loc = loc.min(text.len());
    if text == pattern {
        // Shortcut.
        return Some(0);
    }
    if text.is_empty() {
        // Nothing to match.
        return None;
    }
    if loc + pattern.len() <= text.len() && &text[loc..loc + pattern.len()] == pattern {
        // Perfect match at the perfect spot.
        return Some(loc);
    }
    match_bitap(text, pattern, loc, options)
}

fn match_bitap(
    text: &[char],
    pattern: &[char],
    loc: usize,
    options: &MatchOptions,
) -> Option<usize> {
    if pattern.len() > BITS_PER_WORD {
        debug!(
            "pattern of {} chars exceeds the {}-bit state word",
            pattern.len(),
            BITS_PER_WORD
        );
        return None;
    }

    let alphabet = match_alphabet(pattern);

    let score = |errors: usize, x: usize| -> f64 {
        let accuracy = errors as f64 / pattern.len() as f64;
        let proximity = loc.abs_diff(x);
        if options.distance == 0 {
            // Dodge divide by zero.
            return if proximity == 0 { accuracy } else { 1.0 };
        }
        accuracy + proximity as f64 / options.distance as f64
    };

    // Highest score beyond which we give up.
    let mut score_threshold = options.threshold;
    // Is there a perfect match within the threshold's reach?
    if let Some(best) = find_sub(text, pattern, loc) {
        score_threshold = score(0, best).min(score_threshold);
        // What about in the other direction?
        if let Some(best) = rfind_sub(text, pattern, loc + pattern.len()) {
            score_threshold = score(0, best).min(score_threshold);
        }
    }

    let match_mask: u64 = 1 << (pattern.len() - 1);
    let mut best_loc: Option<usize> = None;
    let mut bin_max = pattern.len() + text.len();
    let mut last_rd: Vec<u64> = Vec::new();
    for d in 0..pattern.len() {
        // Scan for the best match; each iteration allows one more error.
        // Binary search first for how far from `loc` a match at this error
        // level can sit and still beat the threshold.
        let mut bin_min = 0usize;
        let mut bin_mid = bin_max;
        while bin_min < bin_mid {
            if score(d, loc + bin_mid) <= score_threshold {
                bin_min = bin_mid;
            } else {
                bin_max = bin_mid;
            }
            bin_mid = (bin_max - bin_min) / 2 + bin_min;
        }
        // Use the result to narrow the next search.
        bin_max = bin_mid;
        let mut start = 1.max(loc as isize - bin_mid as isize + 1) as usize;
        let finish = (loc + bin_mid).min(text.len()) + pattern.len();

        let mut rd = vec![0u64; finish + 2];
        rd[finish + 1] = (1u64 << d) - 1;
        let mut j = finish;
        while j >= start {
            let char_match = if j - 1 < text.len() {
                alphabet.get(&text[j - 1]).copied().unwrap_or(0)
            } else {
                // Out of range.
                0
            };
            rd[j] = if d == 0 {
                // First pass: exact match.
                ((rd[j + 1] << 1) | 1) & char_match
            } else {
                // Subsequent passes: fuzzy match, folding in the previous
                // error level's state.
                (((rd[j + 1] << 1) | 1) & char_match)
                    | (((last_rd.get(j + 1).copied().unwrap_or(0)
                        | last_rd.get(j).copied().unwrap_or(0))
                        << 1)
                        | 1)
                    | last_rd.get(j + 1).copied().unwrap_or(0)
            };
            if rd[j] & match_mask != 0 {
                let candidate = score(d, j - 1);
                // This match will almost certainly be better than any
                // existing match, but check anyway.
                if candidate <= score_threshold {
                    // Told you so.
                    score_threshold = candidate;
                    best_loc = Some(j - 1);
                    trace!("bitap candidate at {} scoring {:.3}", j - 1, candidate);
                    if j - 1 > loc {
                        // When passing loc, don't exceed our current
                        // distance from it.
                        start = 1.max(2 * loc as isize - (j - 1) as isize) as usize;
                    } else {
                        // Already passed loc; downhill from here on in.
                        break;
                    }
                }
            }
            j -= 1;
        }
        // No hope of a better match at the next error level.
        if score(d + 1, loc) > score_threshold {
            break;
        }
        last_rd = rd;
    }
    best_loc
}

/// Builds the per-character bitmasks for the bitap scan. Bit `i` (counted
/// from the end of the pattern) is set when the pattern has `c` at `i`.
fn match_alphabet(pattern: &[char]) -> HashMap<char, u64> {
    let mut alphabet: HashMap<char, u64> = HashMap::new();
    for (i, &c) in pattern.iter().enumerate() {
        *alphabet.entry(c).or_insert(0) |= 1 << (pattern.len() - i - 1);
    }
    alphabet
}

// --- Patch Model ---

/// One patch: a localized edit script plus the coordinates it applies at.
///
/// `start1`/`length1` address the pre-image text, `start2`/`length2` the
/// post-image text; both are 0-based character positions. The `diffs`
/// always begin and end with context equalities grown by
/// [`patch_add_context()`], which is what lets [`patch_apply()`] re-anchor
/// the patch when the target text has drifted.
///
/// `Clone` produces a fully independent copy, diffs included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    /// The edit script, including leading and trailing context equalities.
    pub diffs: Vec<Diff>,
    /// Start of the patch in the pre-image text.
    pub start1: usize,
    /// Start of the patch in the post-image text.
    pub start2: usize,
    /// Number of pre-image characters the patch covers.
    pub length1: usize,
    /// Number of post-image characters the patch covers.
    pub length2: usize,
}

impl fmt::Display for Patch {
    /// Formats the patch in a GNU-diff-like form with percent-encoded
    /// bodies.
    ///
    /// Header coordinates are 1-based, with two exceptions carried over
    /// from the unified diff format: a zero length keeps the 0-based start
    /// and shows `,0`, and a length of one omits the length entirely.
    ///
    /// # Example
    ///
    /// ```rust
    /// use driftpatch::patch_from_text;
    ///
    /// let text = "@@ -21,4 +21,10 @@\n-jump\n+jumped\n";
    /// let patches = patch_from_text(text).unwrap();
    /// assert_eq!(patches[0].to_string(), text);
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "@@ -{} +{} @@",
            format_coords(self.start1, self.length1),
            format_coords(self.start2, self.length2)
        )?;
        for diff in &self.diffs {
            let sign = match diff.op {
                Op::Insert => '+',
                Op::Delete => '-',
                Op::Equal => ' ',
            };
            writeln!(f, "{}{}", sign, encode_body(&diff.text))?;
        }
        Ok(())
    }
}

fn format_coords(start: usize, length: usize) -> String {
    match length {
        0 => format!("{},0", start),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, length),
    }
}

/// Percent-encodes a body line, keeping literal spaces readable.
fn encode_body(text: &str) -> String {
    urlencoding::encode(text).replace("%20", " ")
}

/// Strictly percent-decodes a body line.
///
/// `urlencoding::decode` passes malformed escapes through untouched, so
/// escapes are validated up front.
fn decode_body(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len()
                || !bytes[i + 1].is_ascii_hexdigit()
                || !bytes[i + 2].is_ascii_hexdigit()
            {
                return None;
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    urlencoding::decode(text).ok().map(|s| s.into_owned())
}

// --- Patch Engine ---

/// Builds a patch list from a pre-image text and a precomputed diff.
///
/// This is the preferred constructor when the diff is already at hand.
/// Context equalities of up to `margin` characters are grown around each
/// group of edits; see [`DEFAULT_MARGIN`].
///
/// # Example
///
/// ```rust
/// use driftpatch::{diff, patch_make, DiffOptions, DEFAULT_MARGIN};
///
/// let text1 = "The quick brown fox jumps over the lazy dog.";
/// let text2 = "The quick brown fox jumped over the lazy dog.";
/// let diffs = diff(text1, text2, &DiffOptions::default());
/// let patches = patch_make(text1, &diffs, DEFAULT_MARGIN);
/// assert_eq!(patches.len(), 1);
/// ```
pub fn patch_make(text1: &str, diffs: &[Diff], margin: usize) -> Vec<Patch> {
    let mut patches = Vec::new();
    if diffs.is_empty() {
        // No diffs, no patches.
        return patches;
    }
    let mut patch = Patch::default();
    let mut char_count1 = 0usize;
    let mut char_count2 = 0usize;
    // `prepatch` is the text as of the most recently closed patch;
    // `postpatch` tracks the result of every diff seen so far. Context is
    // drawn from `prepatch` so start2 coordinates stay consistent.
    let mut prepatch: Vec<char> = text1.chars().collect();
    let mut postpatch: Vec<char> = prepatch.clone();
    for (x, diff) in diffs.iter().enumerate() {
        let diff_len = char_len(&diff.text);
        if patch.diffs.is_empty() && diff.op != Op::Equal {
            // A new patch starts here.
            patch.start1 = char_count1;
            patch.start2 = char_count2;
        }
        match diff.op {
            Op::Insert => {
                patch.diffs.push(diff.clone());
                patch.length2 += diff_len;
                let insertion: Vec<char> = diff.text.chars().collect();
                let _ = postpatch.splice(char_count2..char_count2, insertion);
            }
            Op::Delete => {
                patch.length1 += diff_len;
                patch.diffs.push(diff.clone());
                let end = (char_count2 + diff_len).min(postpatch.len());
                let _ = postpatch.drain(char_count2..end);
            }
            Op::Equal => {
                if diff_len <= 2 * margin && !patch.diffs.is_empty() && x + 1 != diffs.len() {
                    // Small equality inside a patch.
                    patch.diffs.push(diff.clone());
                    patch.length1 += diff_len;
                    patch.length2 += diff_len;
                } else if diff_len >= 2 * margin && !patch.diffs.is_empty() {
                    // Time for a new patch.
                    patch_add_context_chars(&mut patch, &prepatch, margin);
                    patches.push(std::mem::take(&mut patch));
                    // Unlike Unidiff, our patch lists have a rolling
                    // context. Update prepatch text and position.
                    prepatch = postpatch.clone();
                    char_count1 = char_count2;
                }
            }
        }
        if diff.op != Op::Insert {
            char_count1 += diff_len;
        }
        if diff.op != Op::Delete {
            char_count2 += diff_len;
        }
    }
    // Pick up the leftover patch if not empty.
    if !patch.diffs.is_empty() {
        patch_add_context_chars(&mut patch, &prepatch, margin);
        patches.push(patch);
    }
    patches
}

/// Builds a patch list directly from two texts.
///
/// The diff is computed internally and run through [`cleanup_semantic()`]
/// and [`cleanup_efficiency()`] first, which gives patches that follow
/// word and line boundaries where possible.
///
/// # Example
///
/// ```rust
/// use driftpatch::{patch_make_from_texts, DEFAULT_MARGIN};
///
/// let patches = patch_make_from_texts(
///     "The quick brown fox jumps over the lazy dog.",
///     "That quick brown fox jumped over a lazy dog.",
///     DEFAULT_MARGIN,
/// );
/// assert_eq!(patches.len(), 2);
/// ```
pub fn patch_make_from_texts(text1: &str, text2: &str, margin: usize) -> Vec<Patch> {
    let options = DiffOptions::default();
    let mut diffs = diff(text1, text2, &options);
    if diffs.len() > 2 {
        cleanup_semantic(&mut diffs);
        cleanup_efficiency(&mut diffs, options.edit_cost);
    }
    patch_make(text1, &diffs, margin)
}

/// Builds a patch list from a diff alone, recovering the pre-image text
/// from the diff itself.
pub fn patch_make_from_diffs(diffs: &[Diff], margin: usize) -> Vec<Patch> {
    let text1 = source_text(diffs);
    patch_make(&text1, diffs, margin)
}

/// Serializes a patch list to text.
///
/// The inverse of [`patch_from_text()`].
///
/// # Example
///
/// ```rust
/// use driftpatch::{patch_from_text, patch_to_text};
///
/// let text = "@@ -21,18 +22,17 @@\n jump\n-s\n+ed\n  over \n-the\n+a\n %0Alaz\n";
/// let patches = patch_from_text(text).unwrap();
/// assert_eq!(patch_to_text(&patches), text);
/// ```
pub fn patch_to_text(patches: &[Patch]) -> String {
    patches.iter().map(Patch::to_string).collect()
}

/// Parses a serialized patch list back into [`Patch`] values.
///
/// # Errors
///
/// Returns [`ParseError::InvalidPatch`] when a line is neither a hunk
/// header nor a valid body line, and [`ParseError::IllegalEscape`] when a
/// body line carries a malformed percent escape.
///
/// # Example
///
/// ```rust
/// use driftpatch::patch_from_text;
///
/// let patches = patch_from_text("@@ -21,4 +21,10 @@\n-jump\n+jumped\n").unwrap();
/// assert_eq!(patches[0].start1, 20);
/// assert_eq!(patches[0].length1, 4);
/// assert_eq!(patches[0].start2, 20);
/// assert_eq!(patches[0].length2, 10);
/// ```
pub fn patch_from_text(text: &str) -> Result<Vec<Patch>, ParseError> {
    let mut patches = Vec::new();
    if text.is_empty() {
        return Ok(patches);
    }
    let lines: Vec<&str> = text.split('\n').collect();
    let mut pointer = 0usize;
    while pointer < lines.len() {
        let (start1, length1, start2, length2) =
            parse_patch_header(lines[pointer]).ok_or_else(|| ParseError::InvalidPatch {
                line: pointer + 1,
                text: lines[pointer].to_string(),
            })?;
        let mut patch = Patch {
            start1,
            length1,
            start2,
            length2,
            ..Patch::default()
        };
        pointer += 1;
        while pointer < lines.len() {
            let line = lines[pointer];
            match line.chars().next() {
                // Blank line? Whatever.
                None => {}
                // Start of the next patch.
                Some('@') => break,
                Some(sign @ ('+' | '-' | ' ')) => {
                    let decoded =
                        decode_body(&line[1..]).ok_or_else(|| ParseError::IllegalEscape {
                            line: pointer + 1,
                            text: line.to_string(),
                        })?;
                    let op = match sign {
                        '+' => Op::Insert,
                        '-' => Op::Delete,
                        _ => Op::Equal,
                    };
                    patch.diffs.push(Diff::new(op, decoded));
                }
                Some(_) => {
                    return Err(ParseError::InvalidPatch {
                        line: pointer + 1,
                        text: line.to_string(),
                    })
                }
            }
            pointer += 1;
        }
        patches.push(patch);
    }
    Ok(patches)
}

/// Parses `@@ -start1[,len1] +start2[,len2] @@` into 0-based coordinates.
fn parse_patch_header(line: &str) -> Option<(usize, usize, usize, usize)> {
    let body = line.strip_prefix("@@ -")?.strip_suffix(" @@")?;
    let (part1, part2) = body.split_once(" +")?;
    let (start1, length1) = parse_coords(part1)?;
    let (start2, length2) = parse_coords(part2)?;
    Some((start1, length1, start2, length2))
}

fn parse_coords(part: &str) -> Option<(usize, usize)> {
    match part.split_once(',') {
        None => {
            // A bare coordinate means a run of one.
            let start: usize = part.parse().ok()?;
            Some((start.checked_sub(1)?, 1))
        }
        Some((start, length)) => {
            let start: usize = start.parse().ok()?;
            let length: usize = length.parse().ok()?;
            if length == 0 {
                // Zero-length runs keep their 0-based coordinate.
                Some((start, 0))
            } else {
                Some((start.checked_sub(1)?, length))
            }
        }
    }
}

/// Grows context equalities around a patch until its pre-image pattern is
/// unique in `text`, bounded by what the matcher can handle.
///
/// # Example
///
/// ```rust
/// use driftpatch::{patch_add_context, patch_from_text, DEFAULT_MARGIN};
///
/// let mut patches = patch_from_text("@@ -21,4 +21,10 @@\n-jump\n+somersault\n").unwrap();
/// patch_add_context(
///     &mut patches[0],
///     "The quick brown fox jumps over the lazy dog.",
///     DEFAULT_MARGIN,
/// );
/// assert_eq!(
///     patches[0].to_string(),
///     "@@ -17,12 +17,18 @@\n fox \n-jump\n+somersault\n s ov\n"
/// );
/// ```
pub fn patch_add_context(patch: &mut Patch, text: &str, margin: usize) {
    let chars: Vec<char> = text.chars().collect();
    patch_add_context_chars(patch, &chars, margin);
}

fn patch_add_context_chars(patch: &mut Patch, text: &[char], margin: usize) {
    if text.is_empty() {
        return;
    }
    let start = patch.start2.min(text.len());
    let end = (patch.start2 + patch.length1).min(text.len());
    let mut pattern = &text[start..end];
    let mut padding = 0usize;

    // Look for the first and last matches of pattern in text. If two
    // different matches are found, increase the pattern length.
    while find_sub(text, pattern, 0) != rfind_sub(text, pattern, text.len())
        && pattern.len() < BITS_PER_WORD.saturating_sub(2 * margin)
    {
        padding += margin;
        let grown_start = patch.start2.saturating_sub(padding);
        let grown_end = (patch.start2 + patch.length1 + padding).min(text.len());
        pattern = &text[grown_start..grown_end];
    }
    // Add one chunk for good luck.
    padding += margin;

    let prefix_start = patch.start2.saturating_sub(padding);
    let prefix: String = text[prefix_start..start].iter().collect();
    if !prefix.is_empty() {
        patch.diffs.insert(0, Diff::equal(prefix));
    }
    let suffix_end = (patch.start2 + patch.length1 + padding).min(text.len());
    let suffix: String = text[end..suffix_end].iter().collect();
    if !suffix.is_empty() {
        patch.diffs.push(Diff::equal(suffix));
    }

    let prefix_len = start - prefix_start;
    let suffix_len = suffix_end - end;
    patch.start1 = patch.start1.saturating_sub(prefix_len);
    patch.start2 = patch.start2.saturating_sub(prefix_len);
    patch.length1 += prefix_len + suffix_len;
    patch.length2 += prefix_len + suffix_len;
}

/// Pads every patch edge with `margin` characters of synthetic context so
/// that edits touching the start or end of the text have something to
/// anchor to. Returns the padding string.
///
/// All patch coordinates shift right by `margin` to account for the
/// padding [`patch_apply()`] prepends to the text.
pub fn patch_add_padding(patches: &mut Vec<Patch>, margin: usize) -> String {
    let null_padding: String = (1..=margin as u32)
        .map(|x| char::from_u32(x).unwrap_or('\u{1}'))
        .collect();

    // Bump all the patches forward.
    for patch in patches.iter_mut() {
        patch.start1 += margin;
        patch.start2 += margin;
    }

    // Add some padding on start of first diff.
    if let Some(patch) = patches.first_mut() {
        let missing_context = patch.diffs.first().map_or(true, |d| d.op != Op::Equal);
        if missing_context {
            patch.diffs.insert(0, Diff::equal(null_padding.clone()));
            // Should be 0.
            patch.start1 -= margin;
            patch.start2 -= margin;
            patch.length1 += margin;
            patch.length2 += margin;
        } else {
            let first_len = char_len(&patch.diffs[0].text);
            if margin > first_len {
                // Grow first equality.
                let extra = margin - first_len;
                let pad_tail = skip_chars(&null_padding, first_len);
                patch.diffs[0].text.insert_str(0, &pad_tail);
                patch.start1 -= extra;
                patch.start2 -= extra;
                patch.length1 += extra;
                patch.length2 += extra;
            }
        }
    }

    // Add some padding on end of last diff.
    if let Some(patch) = patches.last_mut() {
        let missing_context = patch.diffs.last().map_or(true, |d| d.op != Op::Equal);
        if missing_context {
            patch.diffs.push(Diff::equal(null_padding.clone()));
            patch.length1 += margin;
            patch.length2 += margin;
        } else if let Some(last) = patch.diffs.last_mut() {
            let last_len = char_len(&last.text);
            if margin > last_len {
                // Grow last equality.
                let extra = margin - last_len;
                last.text.push_str(&take_chars(&null_padding, extra));
                patch.length1 += extra;
                patch.length2 += extra;
            }
        }
    }

    null_padding
}

/// Splits any patch whose pre-image exceeds [`BITS_PER_WORD`] characters
/// into several smaller patches the matcher can anchor.
///
/// Insertions pass through whole. A deletion is kept whole only when it is
/// the sole edit of a patch opening with a single equality; everything
/// else is truncated to fit. Intermediate patches share `margin`
/// characters of rolling context.
pub fn patch_split_max(patches: &mut Vec<Patch>, margin: usize) {
    let patch_size = BITS_PER_WORD;
    let mut x = 0usize;
    while x < patches.len() {
        if patches[x].length1 <= patch_size {
            x += 1;
            continue;
        }
        let mut bigpatch = patches.remove(x);
        let mut start1 = bigpatch.start1;
        let mut start2 = bigpatch.start2;
        let mut precontext: Vec<char> = Vec::new();
        while !bigpatch.diffs.is_empty() {
            // Create one of several smaller patches.
            let mut patch = Patch {
                start1: start1 - precontext.len(),
                start2: start2 - precontext.len(),
                ..Patch::default()
            };
            let mut empty = true;
            if !precontext.is_empty() {
                patch.length1 = precontext.len();
                patch.length2 = precontext.len();
                patch
                    .diffs
                    .push(Diff::equal(precontext.iter().collect::<String>()));
            }
            while !bigpatch.diffs.is_empty() && patch.length1 < patch_size.saturating_sub(margin) {
                let diff_op = bigpatch.diffs[0].op;
                let diff_len = char_len(&bigpatch.diffs[0].text);
                if diff_op == Op::Insert {
                    // Insertions are harmless.
                    patch.length2 += diff_len;
                    start2 += diff_len;
                    patch.diffs.push(bigpatch.diffs.remove(0));
                    empty = false;
                } else if diff_op == Op::Delete
                    && patch.diffs.len() == 1
                    && patch.diffs[0].op == Op::Equal
                    && diff_len > 2 * patch_size
                {
                    // This is a large deletion. Let it pass in one chunk.
                    patch.length1 += diff_len;
                    start1 += diff_len;
                    empty = false;
                    patch.diffs.push(bigpatch.diffs.remove(0));
                } else {
                    // Deletion or equality. Only take as much as we can stomach.
                    let keep = patch_size.saturating_sub(margin) - patch.length1;
                    let text = take_chars(&bigpatch.diffs[0].text, keep);
                    let taken = char_len(&text);
                    patch.length1 += taken;
                    start1 += taken;
                    if diff_op == Op::Equal {
                        patch.length2 += taken;
                        start2 += taken;
                    } else {
                        empty = false;
                    }
                    patch.diffs.push(Diff::new(diff_op, text.clone()));
                    if text == bigpatch.diffs[0].text {
                        bigpatch.diffs.remove(0);
                    } else {
                        bigpatch.diffs[0].text = skip_chars(&bigpatch.diffs[0].text, taken);
                    }
                }
            }
            // Compute the head context for the next patch.
            let head: Vec<char> = target_text(&patch.diffs).chars().collect();
            precontext = head[head.len().saturating_sub(margin)..].to_vec();
            // Append the end context for this patch.
            let postcontext = take_chars(&source_text(&bigpatch.diffs), margin);
            let post_len = char_len(&postcontext);
            if !postcontext.is_empty() {
                patch.length1 += post_len;
                patch.length2 += post_len;
                match patch.diffs.last_mut() {
                    Some(last) if last.op == Op::Equal => last.text.push_str(&postcontext),
                    _ => patch.diffs.push(Diff::equal(postcontext)),
                }
            }
            if !empty {
                patches.insert(x, patch);
                x += 1;
            }
        }
    }
}

/// Applies a list of patches to `text`, re-anchoring each patch with the
/// fuzzy matcher when the text has drifted from the patch's pre-image.
///
/// Returns the patched text together with one boolean per input patch
/// telling whether that patch could be applied. The input list is never
/// mutated; all work happens on a deep copy.
///
/// # Example
///
/// ```rust
/// use driftpatch::{patch_make_from_texts, patch_apply, ApplyOptions, DEFAULT_MARGIN};
///
/// let patches = patch_make_from_texts("abcdef", "abcdxyzef", DEFAULT_MARGIN);
/// let (patched, results) = patch_apply(&patches, "abcdef", &ApplyOptions::default());
/// assert_eq!(patched, "abcdxyzef");
/// assert_eq!(results, vec![true]);
/// ```
pub fn patch_apply(patches: &[Patch], text: &str, options: &ApplyOptions) -> (String, Vec<bool>) {
    if patches.is_empty() {
        return (text.to_string(), Vec::new());
    }

    // Deep copy so the caller's patches survive untouched.
    let mut patches = patches.to_vec();
    let null_padding = patch_add_padding(&mut patches, options.margin);
    let pad_len = char_len(&null_padding);
    let mut text: Vec<char> = null_padding
        .chars()
        .chain(text.chars())
        .chain(null_padding.chars())
        .collect();
    patch_split_max(&mut patches, options.margin);

    let match_options = options.match_options();
    // Delta keeps track of the offset between the expected and actual
    // location of the previous patch. If there are patches expected at
    // positions 10 and 20, but the first was found at 12, delta is 2 and
    // the second patch is expected at 22.
    let mut delta: isize = 0;
    let mut results = vec![false; patches.len()];
    for (x, patch) in patches.iter().enumerate() {
        let expected_loc_signed = patch.start2 as isize + delta;
        let expected_loc = expected_loc_signed.max(0) as usize;
        let text1: Vec<char> = source_text(&patch.diffs).chars().collect();
        let mut start_loc;
        let mut end_loc: Option<usize> = None;
        if text1.len() > BITS_PER_WORD {
            // patch_split_max only leaves an oversized pre-image for a
            // monster deletion; anchor its head and tail separately.
            start_loc = find_match_inner(
                &text,
                &text1[..BITS_PER_WORD],
                expected_loc,
                &match_options,
            );
            if let Some(found) = start_loc {
                end_loc = find_match_inner(
                    &text,
                    &text1[text1.len() - BITS_PER_WORD..],
                    expected_loc + text1.len() - BITS_PER_WORD,
                    &match_options,
                );
                match end_loc {
                    // Can't find valid trailing context. Drop this patch.
                    None => start_loc = None,
                    Some(tail) if found >= tail => start_loc = None,
                    _ => {}
                }
            }
        } else {
            start_loc = find_match_inner(&text, &text1, expected_loc, &match_options);
        }
        match start_loc {
            None => {
                // No match found. :(
                warn!("patch {} failed to anchor near {}", x, expected_loc);
                // Subtract the delta for this failed patch from subsequent
                // patches.
                delta -= patch.length2 as isize - patch.length1 as isize;
            }
            Some(start_loc) => {
                // Found a match. :)
                results[x] = true;
                delta = start_loc as isize - expected_loc_signed;
                debug!("patch {} anchored at {} (delta {})", x, start_loc, delta);
                let found_end = match end_loc {
                    None => (start_loc + text1.len()).min(text.len()),
                    Some(tail) => (tail + BITS_PER_WORD).min(text.len()),
                };
                let text2: Vec<char> = text[start_loc..found_end].to_vec();
                if text1 == text2 {
                    // Perfect match, just shove the replacement text in.
                    let replacement: Vec<char> = target_text(&patch.diffs).chars().collect();
                    let splice_end = (start_loc + text1.len()).min(text.len());
                    let _ = text.splice(start_loc..splice_end, replacement);
                } else {
                    // Imperfect match. Run a diff to get a framework of
                    // equivalent indices.
                    let mut diffs = diff_main(&text1, &text2, false, &|| true);
                    if text1.len() > BITS_PER_WORD
                        && levenshtein(&diffs) as f64 / text1.len() as f64
                            > options.delete_threshold
                    {
                        // The end points match, but the content is
                        // unacceptably bad.
                        warn!("patch {} rejected, the deletion drifted too far", x);
                        results[x] = false;
                    } else {
                        cleanup_semantic_lossless(&mut diffs);
                        let mut index1 = 0usize;
                        for mod_diff in &patch.diffs {
                            if mod_diff.op != Op::Equal {
                                let index2 = transpose_position(&diffs, index1);
                                match mod_diff.op {
                                    Op::Insert => {
                                        let insertion: Vec<char> = mod_diff.text.chars().collect();
                                        let at = (start_loc + index2).min(text.len());
                                        let _ = text.splice(at..at, insertion);
                                    }
                                    Op::Delete => {
                                        let until = transpose_position(
                                            &diffs,
                                            index1 + char_len(&mod_diff.text),
                                        );
                                        let from = (start_loc + index2).min(text.len());
                                        let to = (start_loc + until).min(text.len()).max(from);
                                        let _ = text.drain(from..to);
                                    }
                                    Op::Equal => {}
                                }
                            }
                            if mod_diff.op != Op::Delete {
                                index1 += char_len(&mod_diff.text);
                            }
                        }
                    }
                }
            }
        }
    }

    // Strip the padding off.
    let strip_start = pad_len.min(text.len());
    let strip_end = text.len().saturating_sub(pad_len).max(strip_start);
    (text[strip_start..strip_end].iter().collect(), results)
}
