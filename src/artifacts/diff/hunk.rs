use crate::artifacts::diff::diff_algorithm::{DiffAlgorithm, Edit, EditKind, MyersDiff};
use crate::artifacts::objects::blob::is_binary;
use std::fmt::Display;

/// Unchanged lines kept around each change
pub const HUNK_CONTEXT: usize = 3;

/// A run of edits with surrounding context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub a_start: usize,
    pub a_len: usize,
    pub b_start: usize,
    pub b_len: usize,
    pub edits: Vec<Edit<Line>>,
}

/// One line of text, keeping its `\n` terminator when it has one
///
/// Lines compare with their terminator, so a missing final newline or a `\r`
/// is a change. Display drops the `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line(String);

impl Line {
    pub fn has_newline(&self) -> bool {
        self.0.ends_with('\n')
    }
}

impl Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.strip_suffix('\n').unwrap_or(&self.0))
    }
}

impl Hunk {
    fn from_edits(edits: &[Edit<Line>]) -> Self {
        let a_len = edits
            .iter()
            .filter(|edit| edit.kind != EditKind::Insert)
            .count();
        let b_len = edits
            .iter()
            .filter(|edit| edit.kind != EditKind::Delete)
            .count();
        let (a_index, b_index) = edits
            .first()
            .map(|edit| (edit.a_index, edit.b_index))
            .unwrap_or_default();

        // an empty side is anchored at the line before it, as `-0,0` for a new file
        Hunk {
            a_start: if a_len == 0 { a_index } else { a_index + 1 },
            a_len,
            b_start: if b_len == 0 { b_index } else { b_index + 1 },
            b_len,
            edits: edits.to_vec(),
        }
    }

    pub fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.a_start, self.a_len, self.b_start, self.b_len
        )
    }
}

/// Result of comparing two blobs' contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentDiff {
    Unchanged,
    Binary,
    Text(Vec<Hunk>),
}

/// Line diff of two contents, grouped into hunks
///
/// Content with a NUL byte near its start on either side is treated as opaque.
pub fn diff_content(a: &[u8], b: &[u8]) -> ContentDiff {
    if a == b {
        return ContentDiff::Unchanged;
    }
    if is_binary(a) || is_binary(b) {
        return ContentDiff::Binary;
    }

    let a_lines = split_lines(a);
    let b_lines = split_lines(b);
    let edits = MyersDiff::new(&a_lines, &b_lines).diff();

    ContentDiff::Text(build_hunks(&edits))
}

pub fn split_lines(content: &[u8]) -> Vec<Line> {
    content
        .split_inclusive(|byte| *byte == b'\n')
        .map(|line| Line(String::from_utf8_lossy(line).into_owned()))
        .collect()
}

/// Group an edit script into hunks, merging changes separated by at most
/// twice the context width
pub fn build_hunks(edits: &[Edit<Line>]) -> Vec<Hunk> {
    let mut hunks = Vec::new();
    let mut cursor = 0;

    while let Some(first_change) = edits[cursor..]
        .iter()
        .position(|edit| !edit.is_equal())
        .map(|position| position + cursor)
    {
        let start = first_change.saturating_sub(HUNK_CONTEXT).max(cursor);
        let mut last_change = first_change;

        for (index, edit) in edits.iter().enumerate().skip(first_change + 1) {
            if !edit.is_equal() {
                last_change = index;
            } else if index - last_change > 2 * HUNK_CONTEXT {
                break;
            }
        }

        let end = (last_change + HUNK_CONTEXT).min(edits.len() - 1);
        hunks.push(Hunk::from_edits(&edits[start..=end]));
        cursor = end + 1;
    }

    hunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn numbered(lines: std::ops::RangeInclusive<usize>) -> String {
        lines.map(|n| format!("{n}\n")).collect()
    }

    #[test]
    fn single_change_gets_three_lines_of_context() {
        let a = numbered(1..=10);
        let b = a.replace("5\n", "five\n");

        let ContentDiff::Text(hunks) = diff_content(a.as_bytes(), b.as_bytes()) else {
            panic!("expected a text diff");
        };

        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].header(), "@@ -2,7 +2,7 @@");
        assert_eq!(
            hunks[0]
                .edits
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>(),
            vec![" 2", " 3", " 4", "-5", "+five", " 6", " 7", " 8"]
        );
    }

    #[test]
    fn distant_changes_form_separate_hunks() {
        let a = numbered(1..=20);
        let b = (1..=20)
            .map(|n| match n {
                2 => "two\n".to_string(),
                18 => "eighteen\n".to_string(),
                n => format!("{n}\n"),
            })
            .collect::<String>();

        let ContentDiff::Text(hunks) = diff_content(a.as_bytes(), b.as_bytes()) else {
            panic!("expected a text diff");
        };

        assert_eq!(
            hunks.iter().map(Hunk::header).collect::<Vec<_>>(),
            vec!["@@ -1,5 +1,5 @@", "@@ -15,6 +15,6 @@"]
        );
    }

    #[test]
    fn new_file_is_anchored_at_zero() {
        let ContentDiff::Text(hunks) = diff_content(b"", b"a\nb\n") else {
            panic!("expected a text diff");
        };

        assert_eq!(hunks[0].header(), "@@ -0,0 +1,2 @@");
    }

    #[test]
    fn nul_bytes_make_content_binary() {
        assert_eq!(diff_content(b"text\n", b"\0\x01\x02"), ContentDiff::Binary);
        assert_eq!(diff_content(b"same", b"same"), ContentDiff::Unchanged);
    }

    fn changed_lines(hunks: &[Hunk]) -> Vec<String> {
        hunks
            .iter()
            .flat_map(|hunk| &hunk.edits)
            .filter(|edit| !edit.is_equal())
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn adding_a_final_newline_changes_the_last_line() {
        let ContentDiff::Text(hunks) = diff_content(b"a\nx", b"a\nx\n") else {
            panic!("expected a text diff");
        };

        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].header(), "@@ -1,2 +1,2 @@");
        assert_eq!(changed_lines(&hunks), vec!["-x", "+x"]);
        assert!(!hunks[0].edits[1].value.has_newline());
        assert!(hunks[0].edits[2].value.has_newline());
    }

    #[test]
    fn line_ending_changes_are_reported() {
        let ContentDiff::Text(hunks) = diff_content(b"x\r\ny\r\n", b"x\ny\r\n") else {
            panic!("expected a text diff");
        };

        assert_eq!(hunks[0].header(), "@@ -1,2 +1,2 @@");
        assert_eq!(changed_lines(&hunks), vec!["-x\r", "+x"]);
    }
}
