use similar::{ChangeTag, TextDiff};

/// Line counts for a proposed edit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub insertions: usize,
    pub deletions: usize,
}

/// Classification of a line of unified diff output, for coloring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiffLineKind {
    Header,
    Hunk,
    Context,
    Insert,
    Delete,
}

pub fn unified_diff(original: &str, proposed: &str, context: usize) -> String {
    TextDiff::from_lines(original, proposed)
        .unified_diff()
        .context_radius(context)
        .header("original", "proposed")
        .to_string()
}

pub fn diff_stats(original: &str, proposed: &str) -> DiffStats {
    let diff = TextDiff::from_lines(original, proposed);
    let mut stats = DiffStats::default();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => stats.insertions += 1,
            ChangeTag::Delete => stats.deletions += 1,
            ChangeTag::Equal => {}
        }
    }
    stats
}

/// Split unified diff text into classified lines.
pub fn classify_lines(diff: &str) -> Vec<(DiffLineKind, &str)> {
    diff.lines()
        .map(|line| {
            let kind = if line.starts_with("+++") || line.starts_with("---") {
                DiffLineKind::Header
            } else if line.starts_with("@@") {
                DiffLineKind::Hunk
            } else if line.starts_with('+') {
                DiffLineKind::Insert
            } else if line.starts_with('-') {
                DiffLineKind::Delete
            } else {
                DiffLineKind::Context
            };
            (kind, line)
        })
        .collect()
}
