//! Line-based unified diffs and the significance filter.

use std::borrow::Cow;

use similar::TextDiff;

/// Lines of unchanged context around each hunk.
pub const CONTEXT_RADIUS: usize = 3;

/// Minimum number of added/removed lines for a diff to matter.
pub const MIN_CHANGED_LINES: usize = 3;

/// Minimum number of those lines that must carry non-whitespace content.
pub const MIN_CONTENT_LINES: usize = 2;

/// Unified diff of `old` against `new`, with `--- previous` / `+++ current`
/// headers. Identical inputs produce an empty string.
pub fn unified_diff(old: &str, new: &str) -> String {
    let old = terminated(old);
    let new = terminated(new);

    TextDiff::from_lines(old.as_ref(), new.as_ref())
        .unified_diff()
        .context_radius(CONTEXT_RADIUS)
        .missing_newline_hint(false)
        .header("previous", "current")
        .to_string()
}

/// End non-empty text with a newline so an appended line does not also show
/// up as an edit of the previous last line.
fn terminated(text: &str) -> Cow<'_, str> {
    if text.is_empty() || text.ends_with('\n') {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("{text}\n"))
    }
}

/// Added/removed line tally for a unified diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangedLines {
    /// Lines starting with `+` or `-`, file headers excluded.
    pub total: usize,
    /// Of those, lines with non-whitespace content after the marker.
    pub with_content: usize,
}

impl ChangedLines {
    /// Count changed lines in `diff`.
    ///
    /// When hunk markers (`@@`) are present, everything before the first hunk
    /// is header; otherwise `+++`/`---` lines are treated as headers.
    pub fn count(diff: &str) -> Self {
        let has_hunks = diff.lines().any(|l| l.starts_with("@@"));
        let mut in_body = !has_hunks;
        let mut counts = Self::default();

        for line in diff.lines() {
            if line.starts_with("@@") {
                in_body = true;
                continue;
            }
            if !in_body || (!has_hunks && (line.starts_with("+++") || line.starts_with("---"))) {
                continue;
            }

            if let Some(body) = line.strip_prefix('+').or_else(|| line.strip_prefix('-')) {
                counts.total += 1;
                if !body.trim().is_empty() {
                    counts.with_content += 1;
                }
            }
        }

        counts
    }

    pub fn is_significant(&self) -> bool {
        self.total >= MIN_CHANGED_LINES && self.with_content >= MIN_CONTENT_LINES
    }
}

/// Whether a diff has enough substantive edits to be worth extracting.
pub fn is_significant(diff: &str) -> bool {
    ChangedLines::count(diff).is_significant()
}

/// Head and tail of a long diff with an omission marker in between.
pub fn summarize_diff(diff: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = diff.lines().collect();
    if lines.len() <= max_lines {
        return diff.to_string();
    }

    let half = max_lines / 2;
    let omitted = lines.len() - 2 * half;
    let mut out: Vec<Cow<'_, str>> = lines[..half].iter().map(|l| Cow::Borrowed(*l)).collect();
    out.push(Cow::Owned(format!("... ({omitted} lines omitted) ...")));
    out.extend(lines[lines.len() - half..].iter().map(|l| Cow::Borrowed(*l)));
    out.join("\n")
}
