use std::io::{IsTerminal, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use pilot_core::config::{ALLOWED_MODELS, CommandKind, PilotConfig, status_text};
use pilot_core::credentials::{API_KEY_NAME, CredentialStore, FileCredentials};
use pilot_core::document::{Document, FileDocument};
use pilot_core::panel::{ChatPanel, PanelReply, PanelRequest};
use pilot_core::session::{EditOutcome, EditSession, SessionSettings};
use pilot_core::text::{format_as_comment, strip_fences};
use pilot_core::{CompletionClient, prompt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::history::{HistoryEntry, HistoryLog};
use crate::setup;
use crate::terminal::TerminalPreview;
use crate::theme::ansi;
use crate::util::{elapsed_ms, format_duration_ms, format_elapsed, parse_line_range};

/// Everything a command needs, resolved once from flags and stored state.
pub struct Context {
    pub config: PilotConfig,
    pub client: Arc<dyn CompletionClient>,
    pub credentials: Arc<dyn CredentialStore>,
    pub history: HistoryLog,
    pub color: bool,
}

impl Context {
    fn api_key(&self) -> anyhow::Result<String> {
        self.credentials.get(API_KEY_NAME).ok_or_else(|| {
            anyhow::anyhow!("No API key configured. Run `pilot login` or set PERPLEXITY_API_KEY.")
        })
    }

    /// Ask for a key interactively when none is stored and a terminal is
    /// attached. Without a terminal the command proceeds and reports the
    /// missing key itself.
    fn ensure_api_key(&self) -> anyhow::Result<()> {
        if self.credentials.get(API_KEY_NAME).is_some() || !std::io::stdin().is_terminal() {
            return Ok(());
        }
        eprintln!("No API key configured.");
        let key = setup::run_login()?;
        self.credentials.set(API_KEY_NAME, &key)?;
        Ok(())
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("{code}{text}{}", ansi::RESET)
        } else {
            text.to_string()
        }
    }
}

// ── improve ─────────────────────────────────────────────────────────

pub async fn improve(
    ctx: &Context,
    file: &Path,
    lines: Option<&str>,
    instruction: Option<String>,
    yes: bool,
) -> anyhow::Result<ExitCode> {
    let started = Instant::now();
    let mut document = match lines {
        Some(range) => {
            let (start, end) = parse_line_range(range)?;
            FileDocument::open_lines(file, start, end)?
        }
        None => FileDocument::open(file)?,
    };
    ctx.ensure_api_key()?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let instruction = match instruction {
        Some(text) => text,
        None => {
            eprint!("{} ", ctx.paint(ansi::SODIUM, "Instruction:"));
            std::io::stderr().flush()?;
            read_line(&mut stdin).await?.unwrap_or_default()
        }
    };

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let mut preview = TerminalPreview::new(stdin, std::io::stderr())
        .with_color(ctx.color)
        .with_cancel(cancel.clone())
        .assume_yes(yes);
    let session = EditSession::new(
        SessionSettings::from_config(&ctx.config),
        ctx.client.clone(),
        ctx.credentials.clone(),
    );
    tracing::info!(session = %session.id(), file = %file.display(), "starting edit");
    let report = session
        .run(&mut document, &mut preview, &instruction, &cancel)
        .await;

    let message = report.outcome.message();
    let code = match &report.outcome {
        EditOutcome::Applied {
            persist_error: None,
        } => ansi::LICHEN,
        EditOutcome::Failed(_) => ansi::ERR,
        _ => ansi::ASH_TEXT,
    };
    eprintln!(
        "{} {}",
        ctx.paint(code, &message),
        ctx.paint(ansi::ASH_TEXT, &format!("({})", format_elapsed(started.elapsed())))
    );
    ctx.history.record(
        &HistoryEntry::new(
            "improve",
            &ctx.config.model,
            message,
            elapsed_ms(started.elapsed()),
        )
        .with_file(file),
    );

    Ok(match report.outcome {
        EditOutcome::Failed(_) => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

// ── append ──────────────────────────────────────────────────────────

/// Generate one line for `goal` (or format it as a comment when `note` is
/// set) and append it to `file`.
pub async fn append(ctx: &Context, file: &Path, goal: &str, note: bool) -> anyhow::Result<()> {
    let started = Instant::now();
    let mut document = FileDocument::open(file)?;

    let line = if note {
        format_as_comment(document.language(), goal.trim())
    } else {
        let api_key = ctx.api_key()?;
        let request = ctx.config.request(
            CommandKind::Append,
            prompt::append_messages(goal, document.language()),
        );
        let reply = strip_fences(&ctx.client.complete(&api_key, request).await?);
        anyhow::ensure!(!reply.is_empty(), "No content returned");
        reply
    };

    document.append(&format!("\n{line}\n"));
    document.save().await?;
    eprintln!("{}", ctx.paint(ansi::LICHEN, &format!("Appended: {line}")));
    ctx.history.record(
        &HistoryEntry::new(
            if note { "note" } else { "append" },
            &ctx.config.model,
            line,
            elapsed_ms(started.elapsed()),
        )
        .with_file(file),
    );
    Ok(())
}

// ── complete ────────────────────────────────────────────────────────

/// Best-effort inline completion. Prints nothing on any failure.
pub async fn complete(ctx: &Context, language: &str, prefix: &str) -> Option<String> {
    if prefix.trim().is_empty() {
        return None;
    }
    let api_key = ctx.credentials.get(API_KEY_NAME)?;
    let request = ctx.config.request(
        CommandKind::Complete,
        prompt::completion_messages(language, prefix),
    );
    match ctx.client.complete(&api_key, request).await {
        Ok(reply) => {
            let reply = strip_fences(&reply);
            (!reply.is_empty()).then_some(reply)
        }
        Err(e) => {
            tracing::warn!("inline completion failed: {e}");
            None
        }
    }
}

// ── chat / panel ────────────────────────────────────────────────────

/// Map a line typed in interactive chat to a panel request. `None` quits.
pub fn parse_chat_line(line: &str) -> Option<PanelRequest> {
    let line = line.trim();
    match line.split_once(' ').unwrap_or((line, "")) {
        ("/quit" | "/exit", _) => None,
        ("/clear", _) => Some(PanelRequest::Clear),
        ("/model", model) => Some(PanelRequest::SetModel {
            model: model.trim().to_string(),
        }),
        _ => Some(PanelRequest::SendMessage {
            text: line.to_string(),
        }),
    }
}

pub async fn chat(ctx: &Context) -> anyhow::Result<()> {
    ctx.ensure_api_key()?;
    let mut panel = ChatPanel::new(
        ctx.config.clone(),
        ctx.client.clone(),
        ctx.credentials.clone(),
    );
    let mut stdin = BufReader::new(tokio::io::stdin());
    eprintln!(
        "{}",
        ctx.paint(
            ansi::ASH_TEXT,
            &format!(
                "{}  /model <name>  /clear  /quit",
                status_text(&ctx.config.model)
            )
        )
    );

    loop {
        eprint!("{} ", ctx.paint(ansi::SODIUM, "❯"));
        std::io::stderr().flush()?;
        let Some(line) = read_line(&mut stdin).await? else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        let Some(request) = parse_chat_line(&line) else {
            break;
        };
        let started = Instant::now();
        match panel.handle(request).await {
            PanelReply::BotReply { text } => {
                println!("{}", ctx.paint(ansi::CHALK, &text));
                ctx.history.record(&HistoryEntry::new(
                    "chat",
                    &panel.config().model,
                    "reply",
                    elapsed_ms(started.elapsed()),
                ));
            }
            PanelReply::ModelChanged { model } => {
                persist_model(&model)?;
                eprintln!("{}", ctx.paint(ansi::LICHEN, &status_text(&model)));
            }
            PanelReply::Cleared => {
                eprintln!("{}", ctx.paint(ansi::ASH_TEXT, "Conversation cleared."))
            }
            PanelReply::Error { message } => eprintln!("{}", ctx.paint(ansi::ERR, &message)),
        }
    }
    Ok(())
}

/// JSON-lines bridge: one `PanelRequest` per input line, one `PanelReply`
/// per output line.
pub async fn panel<R, W>(ctx: &Context, input: R, mut out: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut panel = ChatPanel::new(
        ctx.config.clone(),
        ctx.client.clone(),
        ctx.credentials.clone(),
    );
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<PanelRequest>(&line) {
            Ok(request) => panel.handle(request).await,
            Err(e) => PanelReply::Error {
                message: format!("invalid request: {e}"),
            },
        };
        if let PanelReply::ModelChanged { model } = &reply
            && let Err(e) = persist_model(model)
        {
            tracing::warn!("could not save model choice: {e}");
        }
        serde_json::to_writer(&mut out, &reply)?;
        out.write_all(b"\n")?;
        out.flush()?;
    }
    Ok(())
}

// ── model / status / credentials / history ─────────────────────────

/// Save a model choice on top of the stored config, not the flag-adjusted one.
fn persist_model(model: &str) -> anyhow::Result<()> {
    let mut stored = PilotConfig::load().unwrap_or_default();
    stored.set_model(model)?;
    stored.save()?;
    Ok(())
}

pub fn model(ctx: &Context, name: Option<&str>) -> anyhow::Result<()> {
    match name {
        Some(name) => {
            persist_model(name)?;
            println!("{}", status_text(name));
        }
        None => {
            for model in ALLOWED_MODELS {
                let marker = if *model == ctx.config.model { "*" } else { " " };
                println!("{marker} {model}");
            }
        }
    }
    Ok(())
}

pub fn status(ctx: &Context) {
    println!("{}", status_text(&ctx.config.model));
    let key = if ctx.credentials.get(API_KEY_NAME).is_some() {
        "configured"
    } else {
        "not configured"
    };
    println!("API key:  {key}");
    println!("Endpoint: {}", ctx.config.base_url);
    println!("Config:   {}", PilotConfig::config_path().display());
}

pub async fn login() -> anyhow::Result<()> {
    let key = if std::io::stdin().is_terminal() {
        setup::run_login()?
    } else {
        let mut stdin = BufReader::new(tokio::io::stdin());
        read_line(&mut stdin).await?.unwrap_or_default()
    };
    anyhow::ensure!(!key.trim().is_empty(), "No API key given");
    let store = FileCredentials::default_location();
    store.set(API_KEY_NAME, key.trim())?;
    eprintln!("API key saved to {}", store.path().display());
    Ok(())
}

pub fn logout() -> anyhow::Result<()> {
    FileCredentials::default_location().remove(API_KEY_NAME)?;
    eprintln!("API key removed.");
    Ok(())
}

pub fn history(ctx: &Context, limit: usize) {
    for entry in ctx.history.read_recent(limit) {
        let ts = entry.ts.get(..19).unwrap_or(&entry.ts).replace('T', " ");
        let file = entry.file.as_deref().unwrap_or("");
        println!(
            "{}  {:<8} {:<12} {} {} {}",
            ctx.paint(ansi::ASH_TEXT, &ts),
            entry.command,
            entry.model,
            entry.outcome,
            ctx.paint(ansi::ASH_TEXT, file),
            ctx.paint(
                ansi::ASH_TEXT,
                &format!("({})", format_duration_ms(entry.duration_ms))
            ),
        );
    }
}

async fn read_line<R: AsyncBufRead + Unpin>(input: &mut R) -> anyhow::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pilot_core::completion::{ChunkStream, CompletionError, CompletionRequest};
    use pilot_core::credentials::MemoryCredentials;

    use super::*;

    struct CannedClient {
        reply: String,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait::async_trait]
    impl CompletionClient for CannedClient {
        async fn complete(
            &self,
            _api_key: &str,
            request: CompletionRequest,
        ) -> Result<String, CompletionError> {
            self.requests.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }

        fn stream(&self, _api_key: &str, _request: CompletionRequest) -> ChunkStream {
            Box::pin(futures::stream::empty())
        }
    }

    fn context(reply: &str, key: Option<&str>, dir: &Path) -> (Context, Arc<CannedClient>) {
        let client = Arc::new(CannedClient {
            reply: reply.to_string(),
            requests: Mutex::new(Vec::new()),
        });
        let credentials = match key {
            Some(key) => MemoryCredentials::with_api_key(key),
            None => MemoryCredentials::new(),
        };
        let ctx = Context {
            config: PilotConfig::default(),
            client: client.clone(),
            credentials: Arc::new(credentials),
            history: HistoryLog::new(dir.join("history.jsonl")),
            color: false,
        };
        (ctx, client)
    }

    #[test]
    fn chat_lines_map_to_requests() {
        assert_eq!(parse_chat_line("/quit"), None);
        assert_eq!(parse_chat_line("/clear"), Some(PanelRequest::Clear));
        assert_eq!(
            parse_chat_line("/model sonar-pro"),
            Some(PanelRequest::SetModel {
                model: "sonar-pro".into()
            })
        );
        assert_eq!(
            parse_chat_line("  what is a trait? "),
            Some(PanelRequest::SendMessage {
                text: "what is a trait?".into()
            })
        );
    }

    #[tokio::test]
    async fn append_adds_generated_line() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("hello.py");
        std::fs::write(&file, "import sys").unwrap();
        let (ctx, client) = context("```python\nprint('hi')\n```", Some("k"), dir.path());

        append(&ctx, &file, "print hi", false).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "import sys\nprint('hi')\n"
        );
        let requests = client.requests.lock().unwrap();
        assert_eq!(requests[0].max_tokens, 120);
        assert!(requests[0].messages[1].content.contains("Language: python"));
        assert_eq!(ctx.history.read_recent(1)[0].command, "append");
    }

    #[tokio::test]
    async fn append_note_needs_no_network() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("lib.rs");
        std::fs::write(&file, "fn main() {}\n").unwrap();
        let (ctx, client) = context("unused", None, dir.path());

        append(&ctx, &file, "check bounds", true).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "fn main() {}\n\n// check bounds\n"
        );
        assert!(client.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn append_rejects_empty_reply() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.go");
        std::fs::write(&file, "package a").unwrap();
        let (ctx, _) = context("  ", Some("k"), dir.path());

        let err = append(&ctx, &file, "x", false).await.unwrap_err();
        assert_eq!(err.to_string(), "No content returned");
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "package a");
    }

    #[tokio::test]
    async fn complete_skips_blank_prefix_and_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, client) = context("ntln!()", Some("k"), dir.path());
        assert_eq!(complete(&ctx, "rust", "   ").await, None);
        assert!(client.requests.lock().unwrap().is_empty());
        assert_eq!(
            complete(&ctx, "rust", "pri").await.as_deref(),
            Some("ntln!()")
        );
        assert_eq!(client.requests.lock().unwrap()[0].max_tokens, 60);

        let (ctx, client) = context("x", None, dir.path());
        assert_eq!(complete(&ctx, "rust", "pri").await, None);
        assert!(client.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn panel_bridge_answers_each_line() {
        let dir = tempfile::tempdir().unwrap();
        let (ctx, _) = context(" hello ", Some("k"), dir.path());
        let input: &[u8] = b"{\"command\":\"sendMessage\",\"text\":\"hi\"}\n\nnot json\n{\"command\":\"clear\"}\n";
        let mut out = Vec::new();

        panel(&ctx, input, &mut out).await.unwrap();

        let out = String::from_utf8(out).unwrap();
        let replies: Vec<PanelReply> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0], PanelReply::BotReply { text: "hello".into() });
        assert!(matches!(&replies[1], PanelReply::Error { message } if message.starts_with("invalid request")));
        assert_eq!(replies[2], PanelReply::Cleared);
    }
}
