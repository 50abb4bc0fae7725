use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lines {start}-{end} are outside the document ({lines} lines)")]
    InvalidRange {
        start: usize,
        end: usize,
        lines: usize,
    },
    #[error("document has no backing file")]
    Unbacked,
}

/// The editor-side view of one document and its current selection.
#[async_trait::async_trait]
pub trait Document: Send {
    /// Text of the current selection.
    fn selection_text(&self) -> &str;

    /// Language tag used in prompts (e.g. "rust", "python").
    fn language(&self) -> &str;

    /// Replace the selection with `text` in one edit. The selection then
    /// covers the inserted text.
    async fn replace_selection(&mut self, text: &str) -> Result<(), DocumentError>;

    /// Persist the document.
    async fn save(&mut self) -> Result<(), DocumentError>;
}

/// An in-memory buffer, optionally backed by a file, with a byte-range
/// selection.
#[derive(Debug, Clone)]
pub struct FileDocument {
    path: Option<PathBuf>,
    text: String,
    selection: Range<usize>,
    language: String,
}

impl FileDocument {
    /// Open a file with the whole content selected.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DocumentError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path)?;
        let language = language_for_path(&path).to_string();
        Ok(Self {
            selection: 0..text.len(),
            path: Some(path),
            text,
            language,
        })
    }

    /// Open a file selecting lines `start..=end` (1-based).
    pub fn open_lines(
        path: impl Into<PathBuf>,
        start: usize,
        end: usize,
    ) -> Result<Self, DocumentError> {
        let mut doc = Self::open(path)?;
        doc.select_lines(start, end)?;
        Ok(doc)
    }

    /// A buffer with no backing file; `save` always fails.
    pub fn from_text(text: impl Into<String>, language: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            selection: 0..text.len(),
            path: None,
            text,
            language: language.into(),
        }
    }

    /// Select lines `start..=end` (1-based), excluding the last line break.
    pub fn select_lines(&mut self, start: usize, end: usize) -> Result<(), DocumentError> {
        self.selection = line_range(&self.text, start, end).ok_or(DocumentError::InvalidRange {
            start,
            end,
            lines: self.text.lines().count(),
        })?;
        Ok(())
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Append `text` at the very end of the buffer.
    pub fn append(&mut self, text: &str) {
        self.text.push_str(text);
    }
}

#[async_trait::async_trait]
impl Document for FileDocument {
    fn selection_text(&self) -> &str {
        &self.text[self.selection.clone()]
    }

    fn language(&self) -> &str {
        &self.language
    }

    async fn replace_selection(&mut self, text: &str) -> Result<(), DocumentError> {
        let start = self.selection.start;
        self.text.replace_range(self.selection.clone(), text);
        self.selection = start..start + text.len();
        Ok(())
    }

    async fn save(&mut self) -> Result<(), DocumentError> {
        let path = self.path.clone().ok_or(DocumentError::Unbacked)?;
        let text = self.text.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &text))
            .await
            .map_err(std::io::Error::other)??;
        Ok(())
    }
}

/// Write through a temp file in the same directory, then rename over `path`.
fn write_atomic(path: &Path, text: &str) -> Result<(), DocumentError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(text.as_bytes())?;
    tmp.flush()?;
    if let Ok(meta) = std::fs::metadata(path) {
        std::fs::set_permissions(tmp.path(), meta.permissions())?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Byte range of lines `start..=end` (1-based) without the final line break.
fn line_range(text: &str, start: usize, end: usize) -> Option<Range<usize>> {
    if start == 0 || end < start {
        return None;
    }
    let mut offset = 0;
    let mut begin = None;
    for (i, line) in text.split_inclusive('\n').enumerate() {
        let number = i + 1;
        if number == start {
            begin = Some(offset);
        }
        if number == end {
            let content = line.strip_suffix('\n').unwrap_or(line);
            let content = content.strip_suffix('\r').unwrap_or(content);
            return Some(begin?..offset + content.len());
        }
        offset += line.len();
    }
    None
}

/// Language tag for a path, from its extension.
pub fn language_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "rs" => "rust",
        "py" | "pyi" => "python",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" | "mts" => "typescript",
        "tsx" => "typescriptreact",
        "jsx" => "javascriptreact",
        "go" => "go",
        "rb" => "ruby",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" => "cpp",
        "cs" => "csharp",
        "swift" => "swift",
        "lua" => "lua",
        "hs" => "haskell",
        "ex" | "exs" => "elixir",
        "sh" | "bash" | "zsh" => "shellscript",
        "sql" => "sql",
        "html" | "htm" => "html",
        "xml" => "xml",
        "md" | "markdown" => "markdown",
        "toml" => "toml",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        _ => {
            if path.file_name().and_then(|n| n.to_str()) == Some("Makefile") {
                "makefile"
            } else {
                "plaintext"
            }
        }
    }
}
