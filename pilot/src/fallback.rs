//! Local, best-effort edit used when the model returns nothing usable.
//!
//! Only one shape of instruction is understood: `remove <needle>`. Every line
//! containing the needle (case-insensitively) is dropped. A needle that
//! mentions sleeping also matches the common sleep-call spellings.

use std::sync::LazyLock;

use regex::Regex;

use crate::text::normalize;

static REMOVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)remove\s+(.+)").expect("static regex"));

const SLEEP_SPELLINGS: &[&str] = &["time.sleep(", "sleep("];

/// Apply the `remove <needle>` heuristic to `original`.
///
/// Returns `None` when the instruction does not match, or when dropping the
/// matching lines would not change the text.
pub fn try_simple_remove(original: &str, instruction: &str) -> Option<String> {
    let needle = REMOVE
        .captures(instruction)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())?;
    if needle.is_empty() {
        return None;
    }

    let patterns = removal_patterns(needle);
    let kept: Vec<&str> = split_lines(original)
        .into_iter()
        .filter(|line| {
            let lowered = line.to_lowercase();
            !patterns.iter().any(|p| lowered.contains(p.as_str()))
        })
        .collect();

    let joined = kept.join("\n");
    if normalize(&joined) == normalize(original) {
        return None;
    }
    tracing::debug!(
        needle,
        removed = split_lines(original).len() - kept.len(),
        "fallback removal applied"
    );
    Some(joined)
}

fn removal_patterns(needle: &str) -> Vec<String> {
    let lowered = needle.to_lowercase();
    let mut patterns = vec![lowered.clone()];
    if lowered.contains("sleep") {
        patterns.extend(SLEEP_SPELLINGS.iter().map(|s| s.to_string()));
    }
    patterns
}

/// Split on `\n` or `\r\n`, keeping empty trailing segments like JS `split`.
fn split_lines(text: &str) -> Vec<&str> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect()
}
