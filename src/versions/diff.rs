//! Line diff between two code snapshots.

use serde::Serialize;
use similar::{Algorithm, ChangeTag, TextDiff};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HunkKind {
    Unchanged,
    Added,
    Removed,
}

impl HunkKind {
    fn prefix(&self) -> char {
        match self {
            HunkKind::Unchanged => ' ',
            HunkKind::Added => '+',
            HunkKind::Removed => '-',
        }
    }
}

impl From<ChangeTag> for HunkKind {
    fn from(tag: ChangeTag) -> Self {
        match tag {
            ChangeTag::Equal => HunkKind::Unchanged,
            ChangeTag::Insert => HunkKind::Added,
            ChangeTag::Delete => HunkKind::Removed,
        }
    }
}

/// A run of consecutive lines with the same classification.
///
/// `text` keeps the lines exactly as they appear in the source, newlines included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hunk {
    pub kind: HunkKind,
    pub text: String,
}

impl Hunk {
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }
}

/// One row of the side-by-side view. Row `i` shows hunk `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SideBySideRow {
    pub kind: HunkKind,
    pub left: Vec<String>,
    pub right: Vec<String>,
}

/// Diff `old` against `new` line by line.
pub fn compute_diff(old: &str, new: &str) -> Vec<Hunk> {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Lcs)
        .diff_lines(old, new);

    let mut hunks: Vec<Hunk> = Vec::new();
    for change in diff.iter_all_changes() {
        let kind = HunkKind::from(change.tag());
        match hunks.last_mut() {
            Some(last) if last.kind == kind => last.text.push_str(change.value()),
            _ => hunks.push(Hunk {
                kind,
                text: change.value().to_string(),
            }),
        }
    }
    hunks
}

/// Number of lines of one kind across all hunks.
pub fn count_lines(hunks: &[Hunk], kind: HunkKind) -> usize {
    hunks
        .iter()
        .filter(|h| h.kind == kind)
        .map(|h| h.lines().count())
        .sum()
}

/// Single column, each line prefixed with `+`, `-` or a space.
pub fn render_unified(hunks: &[Hunk]) -> String {
    let mut out = String::new();
    for hunk in hunks {
        for line in hunk.lines() {
            out.push(hunk.kind.prefix());
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Two columns: old side shows unchanged and removed hunks, new side shows
/// unchanged and added hunks.
///
/// Rows line up per hunk, not per line, so a removed hunk and the added hunk
/// replacing it sit on consecutive rows.
pub fn render_side_by_side(hunks: &[Hunk]) -> Vec<SideBySideRow> {
    hunks
        .iter()
        .map(|hunk| {
            let lines: Vec<String> = hunk.lines().map(str::to_string).collect();
            let (left, right) = match hunk.kind {
                HunkKind::Unchanged => (lines.clone(), lines),
                HunkKind::Removed => (lines, Vec::new()),
                HunkKind::Added => (Vec::new(), lines),
            };
            SideBySideRow {
                kind: hunk.kind,
                left,
                right,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rebuild(hunks: &[Hunk], skip: HunkKind) -> String {
        hunks
            .iter()
            .filter(|h| h.kind != skip)
            .map(|h| h.text.as_str())
            .collect()
    }

    #[test]
    fn test_identical_code_has_no_changes() {
        let code = "<!DOCTYPE html>\n<html>\n<body>hi</body>\n</html>\n";
        let hunks = compute_diff(code, code);

        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].kind, HunkKind::Unchanged);
        assert_eq!(count_lines(&hunks, HunkKind::Added), 0);
        assert_eq!(count_lines(&hunks, HunkKind::Removed), 0);
    }

    #[test]
    fn test_changed_line_groups_into_hunks() {
        let hunks = compute_diff("a\nb\nc\n", "a\nx\ny\nc\n");
        let kinds: Vec<HunkKind> = hunks.iter().map(|h| h.kind).collect();

        assert_eq!(
            kinds,
            vec![
                HunkKind::Unchanged,
                HunkKind::Removed,
                HunkKind::Added,
                HunkKind::Unchanged
            ]
        );
        assert_eq!(hunks[2].text, "x\ny\n");
    }

    #[test]
    fn test_unified_prefixes() {
        let rendered = render_unified(&compute_diff("a\nb\n", "a\nc\n"));
        assert_eq!(rendered, " a\n-b\n+c\n");
    }

    #[test]
    fn test_side_by_side_aligns_by_hunk() {
        let hunks = compute_diff("a\nb\n", "a\nc\nd\n");
        let rows = render_side_by_side(&hunks);

        assert_eq!(rows.len(), hunks.len());
        assert_eq!(rows[0].left, rows[0].right);
        assert_eq!(rows[1].left, vec!["b"]);
        assert!(rows[1].right.is_empty());
        assert!(rows[2].left.is_empty());
        assert_eq!(rows[2].right, vec!["c", "d"]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(compute_diff("", "").is_empty());

        let hunks = compute_diff("", "line\n");
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].kind, HunkKind::Added);
    }

    fn snapshot() -> impl Strategy<Value = String> {
        (prop::collection::vec("[abc]{0,3}", 0..10), any::<bool>()).prop_map(
            |(lines, trailing_newline)| {
                let mut text = lines.join("\n");
                if trailing_newline && !text.is_empty() {
                    text.push('\n');
                }
                text
            },
        )
    }

    proptest! {
        #[test]
        fn prop_hunks_rebuild_both_sides(old in snapshot(), new in snapshot()) {
            let hunks = compute_diff(&old, &new);
            prop_assert_eq!(rebuild(&hunks, HunkKind::Added), old);
            prop_assert_eq!(rebuild(&hunks, HunkKind::Removed), new);
        }

        #[test]
        fn prop_adjacent_hunks_differ(old in snapshot(), new in snapshot()) {
            let hunks = compute_diff(&old, &new);
            for pair in hunks.windows(2) {
                prop_assert_ne!(pair[0].kind, pair[1].kind);
            }
        }
    }
}
