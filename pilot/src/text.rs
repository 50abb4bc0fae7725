use std::sync::LazyLock;

use regex::Regex;

static LEADING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*```[a-zA-Z0-9_-]*\s*\r?\n").expect("static regex"));
static TRAILING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n\s*```\s*$").expect("static regex"));

/// Remove one enclosing code fence from a model response.
///
/// Only the first opening fence line (with an optional language tag) and the
/// last closing fence are removed. Fences inside the body are left alone, so a
/// response that embeds illustrative code blocks survives intact.
pub fn strip_fences(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let without_open = LEADING_FENCE.replace(trimmed, "");
    let without_close = TRAILING_FENCE.replace(&without_open, "");
    without_close.trim().to_string()
}

/// Strip trailing whitespace from every line and drop lines left empty.
///
/// Two texts that normalize equal are treated as "no meaningful change", so
/// adding or removing blank lines alone is not an edit.
pub fn normalize(text: &str) -> String {
    text.split('\n')
        .map(|line| line.trim_end())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// The last `n` lines of `text`, joined with `\n`.
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

/// Render `text` as a single-line comment in the given language.
pub fn format_as_comment(language: &str, text: &str) -> String {
    match language {
        "python" | "shellscript" | "ruby" | "makefile" | "elixir" | "toml" | "yaml" => {
            format!("# {text}")
        }
        "lua" | "haskell" | "sql" => format!("-- {text}"),
        "html" | "xml" | "markdown" => format!("<!-- {text} -->"),
        _ => format!("// {text}"),
    }
}
