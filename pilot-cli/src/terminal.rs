use std::io::Write;

use pilot_core::diff::{DiffLineKind, classify_lines};
use pilot_core::preview::{EditPreview, PreviewSurface, Side};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;

use crate::theme::ansi;

const DIFF_CONTEXT: usize = 3;

/// Line-oriented preview: streams the proposal as it grows, then shows a
/// unified diff and asks y/N questions on `input`.
pub struct TerminalPreview<R, W> {
    input: R,
    out: W,
    color: bool,
    assume_yes: bool,
    /// Cancelling while a question is pending answers it with "no".
    cancel: CancellationToken,
    /// Proposed text already echoed while streaming.
    streamed: String,
}

impl<R, W> TerminalPreview<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    pub fn new(input: R, out: W) -> Self {
        Self {
            input,
            out,
            color: false,
            assume_yes: false,
            cancel: CancellationToken::new(),
            streamed: String::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Apply without asking. Continuation is still asked for.
    pub fn assume_yes(mut self, yes: bool) -> Self {
        self.assume_yes = yes;
        self
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("{code}{text}{}", ansi::RESET)
        } else {
            text.to_string()
        }
    }

    async fn ask(&mut self, question: &str) -> bool {
        let prompt = self.paint(ansi::SODIUM, &format!("{question} [y/N]"));
        let _ = write!(self.out, "{prompt} ");
        let _ = self.out.flush();

        let mut answer = String::new();
        let read = tokio::select! {
            _ = self.cancel.cancelled() => Ok(0),
            read = self.input.read_line(&mut answer) => read,
        };
        match read {
            Ok(0) | Err(_) => {
                let _ = writeln!(self.out);
                false
            }
            Ok(_) => matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
        }
    }

    fn end_stream(&mut self) {
        if !self.streamed.is_empty() {
            let _ = writeln!(self.out);
            self.streamed.clear();
        }
    }

    fn write_diff(&mut self, preview: &EditPreview) {
        let diff = preview.unified_diff(DIFF_CONTEXT);
        for (kind, line) in classify_lines(&diff) {
            let painted = match kind {
                DiffLineKind::Header => self.paint(ansi::ASH_TEXT, line),
                DiffLineKind::Hunk => self.paint(ansi::SODIUM, line),
                DiffLineKind::Insert => self.paint(ansi::LICHEN, line),
                DiffLineKind::Delete => self.paint(ansi::ERR, line),
                DiffLineKind::Context => self.paint(ansi::CHALK, line),
            };
            let _ = writeln!(self.out, "{painted}");
        }
        let stats = preview.stats();
        let summary = format!("+{} -{}", stats.insertions, stats.deletions);
        let _ = writeln!(self.out, "{}", self.paint(ansi::ASH_TEXT, &summary));
    }
}

#[async_trait::async_trait]
impl<R, W> PreviewSurface for TerminalPreview<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: Write + Send,
{
    fn update(&mut self, side: Side, text: &str) {
        match side {
            Side::Original => {
                let header = format!("── proposed edit for {} line(s) ──", text.lines().count());
                let _ = writeln!(self.out, "{}", self.paint(ansi::ASH_TEXT, &header));
            }
            Side::Proposed => {
                // Fence stripping can rewrite the start of the text; only
                // growth at the end is echoed, the diff shows the final result.
                if let Some(suffix) = text.strip_prefix(self.streamed.as_str()) {
                    let _ = write!(self.out, "{}", self.paint(ansi::ASH_TEXT, suffix));
                    let _ = self.out.flush();
                }
                self.streamed = text.to_string();
            }
        }
    }

    async fn confirm_continue(&mut self) -> bool {
        self.end_stream();
        self.ask("The response hit the token limit. Continue generating?")
            .await
    }

    async fn confirm_apply(&mut self, preview: &EditPreview) -> bool {
        self.end_stream();
        self.write_diff(preview);
        if self.assume_yes {
            return true;
        }
        self.ask("Apply this edit?").await
    }

    fn release(&mut self) {
        self.end_stream();
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preview(answers: &'static str) -> TerminalPreview<&'static [u8], Vec<u8>> {
        TerminalPreview::new(answers.as_bytes(), Vec::new())
    }

    fn output<R>(p: &TerminalPreview<R, Vec<u8>>) -> String {
        String::from_utf8(p.out.clone()).unwrap()
    }

    #[test]
    fn streams_only_appended_text() {
        let mut p = preview("");
        p.update(Side::Proposed, "fn");
        p.update(Side::Proposed, "fn main");
        p.update(Side::Proposed, "fn main() {}");
        assert_eq!(output(&p), "fn main() {}");
    }

    #[test]
    fn rewritten_prefix_is_not_echoed_twice() {
        let mut p = preview("");
        p.update(Side::Proposed, "```");
        p.update(Side::Proposed, "x = 1");
        p.update(Side::Proposed, "x = 1\ny = 2");
        assert_eq!(output(&p), "```\ny = 2");
    }

    #[tokio::test]
    async fn apply_shows_diff_and_reads_answer() {
        let mut p = preview("y\n");
        let answer = p.confirm_apply(&EditPreview::new("a\nb\n", "a\nc\n")).await;
        assert!(answer);
        let out = output(&p);
        assert!(out.contains("-b\n"));
        assert!(out.contains("+c\n"));
        assert!(out.contains("+1 -1"));
        assert!(out.contains("Apply this edit? [y/N]"));
        assert!(!out.contains('\x1b'));
    }

    #[tokio::test]
    async fn anything_but_yes_declines() {
        let mut p = preview("nope\n");
        assert!(!p.confirm_apply(&EditPreview::new("a", "b")).await);
        let mut p = preview("");
        assert!(!p.confirm_continue().await);
        let mut p = preview("YES\n");
        assert!(p.confirm_continue().await);
    }

    #[tokio::test]
    async fn cancelled_question_declines() {
        let token = CancellationToken::new();
        token.cancel();
        let (reader, _writer) = tokio::io::duplex(16);
        let mut p = TerminalPreview::new(tokio::io::BufReader::new(reader), Vec::new())
            .with_cancel(token);
        assert!(!p.confirm_apply(&EditPreview::new("a", "b")).await);
    }

    #[tokio::test]
    async fn assume_yes_skips_the_question() {
        let mut p = preview("").assume_yes(true);
        assert!(p.confirm_apply(&EditPreview::new("a", "b")).await);
        assert!(!output(&p).contains("[y/N]"));
    }

    #[tokio::test]
    async fn color_wraps_diff_lines() {
        let mut p = preview("n\n").with_color(true);
        p.confirm_apply(&EditPreview::new("a\n", "b\n")).await;
        let out = output(&p);
        assert!(out.contains(&format!("{}+b{}", ansi::LICHEN, ansi::RESET)));
        assert!(out.contains(&format!("{}-a{}", ansi::ERR, ansi::RESET)));
    }
}
