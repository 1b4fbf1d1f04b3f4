//! Snapshot differ: shortest edit script between two document snapshots.
//!
//! Myers' O(ND) algorithm over tokens (characters or lines), after trimming
//! the common prefix and suffix. The result is a list of coalesced spans
//! tagged kept / added / removed; it carries no positions, the caller's
//! cursor supplies those.
//!
//! Reference: E. Myers, "An O(ND) Difference Algorithm and Its Variations"
//! (Algorithmica, 1986).

use serde::{Deserialize, Serialize};

/// Edit cost above which the differ gives up on a minimal script and
/// reports the changed region as one removal followed by one insertion.
/// Keeps the backtracking trace under ~8MB.
const MAX_EDIT_COST: isize = 1024;

/// Token size used when comparing snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Unicode scalar values.
    #[default]
    Char,
    /// Lines, terminators included.
    Line,
}

impl std::str::FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "char" | "chars" | "character" => Ok(Granularity::Char),
            "line" | "lines" => Ok(Granularity::Line),
            other => Err(format!("unknown granularity '{other}' (expected 'char' or 'line')")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanTag {
    Kept,
    Added,
    Removed,
}

/// Run of consecutive tokens sharing one tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub tag: SpanTag,
    pub text: String,
}

/// Output of [`diff`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditScript {
    spans: Vec<Span>,
}

impl EditScript {
    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// True when nothing was added or removed.
    pub fn is_unchanged(&self) -> bool {
        self.spans.iter().all(|s| s.tag == SpanTag::Kept)
    }

    /// Concatenation of every added span, in order.
    pub fn added_text(&self) -> String {
        self.collect(|tag| tag == SpanTag::Added)
    }

    /// Concatenation of every removed span, in order.
    pub fn removed_text(&self) -> String {
        self.collect(|tag| tag == SpanTag::Removed)
    }

    /// Kept + removed spans: the snapshot the script started from.
    pub fn previous_text(&self) -> String {
        self.collect(|tag| tag != SpanTag::Added)
    }

    /// Kept + added spans: the snapshot the script leads to.
    pub fn current_text(&self) -> String {
        self.collect(|tag| tag != SpanTag::Removed)
    }

    fn collect(&self, keep: impl Fn(SpanTag) -> bool) -> String {
        self.spans
            .iter()
            .filter(|s| keep(s.tag))
            .map(|s| s.text.as_str())
            .collect()
    }

    fn push(&mut self, tag: SpanTag, token: &str) {
        match self.spans.last_mut() {
            Some(last) if last.tag == tag => last.text.push_str(token),
            _ => self.spans.push(Span {
                tag,
                text: token.to_string(),
            }),
        }
    }
}

/// Compute the edit script turning `previous` into `current`.
///
/// Deletions are placed before insertions whenever both orders cost the
/// same, so the output is deterministic.
pub fn diff(previous: &str, current: &str, granularity: Granularity) -> EditScript {
    let old = tokenize(previous, granularity);
    let new = tokenize(current, granularity);

    let mut script = EditScript::default();
    for op in shortest_edit(&old, &new) {
        match op {
            Op::Keep(i) => script.push(SpanTag::Kept, old[i]),
            Op::Delete(i) => script.push(SpanTag::Removed, old[i]),
            Op::Insert(j) => script.push(SpanTag::Added, new[j]),
        }
    }
    script
}

fn tokenize(text: &str, granularity: Granularity) -> Vec<&str> {
    match granularity {
        Granularity::Char => text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect(),
        Granularity::Line => text.split_inclusive('\n').collect(),
    }
}

/// Single step of an edit script. Indices point into the old (`Keep`,
/// `Delete`) or new (`Insert`) token sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Keep(usize),
    Delete(usize),
    Insert(usize),
}

fn shortest_edit<T: PartialEq>(old: &[T], new: &[T]) -> Vec<Op> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let a = &old[prefix..old.len() - suffix];
    let b = &new[prefix..new.len() - suffix];

    let mut ops = Vec::with_capacity(old.len().max(new.len()));
    ops.extend((0..prefix).map(Op::Keep));

    let middle = if a.is_empty() || b.is_empty() {
        None
    } else {
        myers(a, b)
    };
    match middle {
        Some(found) => ops.extend(found.into_iter().map(|op| match op {
            Op::Keep(i) => Op::Keep(i + prefix),
            Op::Delete(i) => Op::Delete(i + prefix),
            Op::Insert(j) => Op::Insert(j + prefix),
        })),
        None => {
            ops.extend((prefix..prefix + a.len()).map(Op::Delete));
            ops.extend((prefix..prefix + b.len()).map(Op::Insert));
        }
    }

    ops.extend((old.len() - suffix..old.len()).map(Op::Keep));
    ops
}

/// Greedy forward search, then backtrack through the saved frontiers.
///
/// Returns `None` when the edit cost exceeds [`MAX_EDIT_COST`].
fn myers<T: PartialEq>(a: &[T], b: &[T]) -> Option<Vec<Op>> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max = n + m;
    let offset = max + 1;

    // v[k + offset] = furthest x reached on diagonal k
    let mut v = vec![0isize; (2 * max + 3) as usize];
    // trace[d] = frontier slice for k in -d..=d, taken before round d
    let mut trace: Vec<Vec<isize>> = Vec::new();

    let mut reached = false;
    for d in 0..=max {
        if d > MAX_EDIT_COST {
            return None;
        }
        trace.push(v[(offset - d) as usize..=(offset + d) as usize].to_vec());

        let mut k = -d;
        while k <= d {
            let idx = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                reached = true;
                break;
            }
            k += 2;
        }
        if reached {
            break;
        }
    }

    let mut ops = Vec::with_capacity((n + m) as usize);
    let (mut x, mut y) = (n, m);
    for d in (1..trace.len()).rev() {
        let d = d as isize;
        let frontier = &trace[d as usize];
        let at = |k: isize| frontier[(k + d) as usize];

        let k = x - y;
        let prev_k = if k == -d || (k != d && at(k - 1) < at(k + 1)) {
            k + 1
        } else {
            k - 1
        };
        let prev_x = at(prev_k);
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            x -= 1;
            y -= 1;
            ops.push(Op::Keep(x as usize));
        }
        if x == prev_x {
            ops.push(Op::Insert(prev_y as usize));
        } else {
            ops.push(Op::Delete(prev_x as usize));
        }
        x = prev_x;
        y = prev_y;
    }
    while x > 0 && y > 0 {
        x -= 1;
        y -= 1;
        ops.push(Op::Keep(x as usize));
    }

    ops.reverse();
    Some(ops)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(script: &EditScript) -> Vec<(SpanTag, &str)> {
        script.spans().iter().map(|s| (s.tag, s.text.as_str())).collect()
    }

    #[test]
    fn test_single_insertion() {
        let script = diff("abc", "abXc", Granularity::Char);
        assert_eq!(
            tags(&script),
            vec![
                (SpanTag::Kept, "ab"),
                (SpanTag::Added, "X"),
                (SpanTag::Kept, "c"),
            ]
        );
    }

    #[test]
    fn test_single_deletion() {
        let script = diff("abXc", "abc", Granularity::Char);
        assert_eq!(script.removed_text(), "X");
        assert_eq!(script.added_text(), "");
    }

    #[test]
    fn test_replacement_orders_removal_first() {
        let script = diff("aYc", "aXc", Granularity::Char);
        assert_eq!(
            tags(&script),
            vec![
                (SpanTag::Kept, "a"),
                (SpanTag::Removed, "Y"),
                (SpanTag::Added, "X"),
                (SpanTag::Kept, "c"),
            ]
        );
    }

    #[test]
    fn test_identical_inputs_unchanged() {
        let script = diff("same", "same", Granularity::Char);
        assert!(script.is_unchanged());
        assert_eq!(tags(&script), vec![(SpanTag::Kept, "same")]);
    }

    #[test]
    fn test_empty_sides() {
        let from_empty = diff("", "hello", Granularity::Char);
        assert_eq!(tags(&from_empty), vec![(SpanTag::Added, "hello")]);

        let to_empty = diff("hello", "", Granularity::Char);
        assert_eq!(tags(&to_empty), vec![(SpanTag::Removed, "hello")]);

        assert!(diff("", "", Granularity::Char).spans().is_empty());
    }

    #[test]
    fn test_interleaved_edits_rebuild_both_sides() {
        let previous = "fn main() {\n    let x = 1;\n}\n";
        let current = "fn main() {\n    let y = 2;\n    println!(\"{y}\");\n}\n";
        let script = diff(previous, current, Granularity::Char);

        assert_eq!(script.previous_text(), previous);
        assert_eq!(script.current_text(), current);
    }

    #[test]
    fn test_scattered_changes_are_minimal() {
        // ABCABBA -> CBABAC, the classic example: D = 5
        let script = diff("ABCABBA", "CBABAC", Granularity::Char);
        let edits: usize = script
            .spans()
            .iter()
            .filter(|s| s.tag != SpanTag::Kept)
            .map(|s| s.text.chars().count())
            .sum();
        assert_eq!(edits, 5);
        assert_eq!(script.current_text(), "CBABAC");
        assert_eq!(script.previous_text(), "ABCABBA");
    }

    #[test]
    fn test_multibyte_characters() {
        let script = diff("añb", "añéb", Granularity::Char);
        assert_eq!(script.added_text(), "é");
        assert_eq!(script.removed_text(), "");
    }

    #[test]
    fn test_line_granularity() {
        let previous = "one\ntwo\nthree\n";
        let current = "one\n2\nthree\n";
        let script = diff(previous, current, Granularity::Line);

        assert_eq!(
            tags(&script),
            vec![
                (SpanTag::Kept, "one\n"),
                (SpanTag::Removed, "two\n"),
                (SpanTag::Added, "2\n"),
                (SpanTag::Kept, "three\n"),
            ]
        );
    }

    #[test]
    fn test_line_granularity_without_trailing_newline() {
        let script = diff("a\nb", "a\nb\nc", Granularity::Line);
        assert_eq!(script.removed_text(), "b");
        assert_eq!(script.added_text(), "b\nc");
        assert_eq!(script.current_text(), "a\nb\nc");
    }

    #[test]
    fn test_costly_change_falls_back_to_replace() {
        let previous: String = "ab".repeat(1200);
        let current: String = "cd".repeat(1200);
        let script = diff(&previous, &current, Granularity::Char);

        assert_eq!(script.removed_text(), previous);
        assert_eq!(script.added_text(), current);
    }

    #[test]
    fn test_deterministic_output() {
        let a = diff("the quick fox", "a quick brown fox", Granularity::Char);
        let b = diff("the quick fox", "a quick brown fox", Granularity::Char);
        assert_eq!(a, b);
    }

    #[test]
    fn test_granularity_parse() {
        assert_eq!("line".parse::<Granularity>().unwrap(), Granularity::Line);
        assert_eq!("CHAR".parse::<Granularity>().unwrap(), Granularity::Char);
        assert!("word".parse::<Granularity>().is_err());
    }
}
