mod command;
mod history;
mod setup;
mod terminal;
mod theme;
mod util;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pilot_core::config::{PilotConfig, pilot_dir};
use pilot_core::credentials::{CredentialStore, FileCredentials, MemoryCredentials};
use pilot_core::ChatClient;

use command::Context;
use history::HistoryLog;

#[derive(Parser)]
#[command(name = "pilot", version, about = "Guided code edits with a hosted LLM")]
struct Args {
    /// Perplexity API key (overrides the stored key for this run)
    #[arg(long, global = true, env = "PERPLEXITY_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model for this run (must be one of `pilot model`)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Base URL of the chat-completion API
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rewrite part of a file following an instruction, with preview
    Improve {
        file: PathBuf,
        /// Lines to edit, `START:END` or `LINE` (1-based); whole file if omitted
        #[arg(long)]
        lines: Option<String>,
        /// What to change; asked for interactively if omitted
        #[arg(short, long)]
        instruction: Option<String>,
        /// Apply without asking once the diff is shown
        #[arg(short, long)]
        yes: bool,
    },
    /// Append a generated line of code to a file
    Append {
        file: PathBuf,
        goal: String,
        /// Append the goal as a comment instead of generating code
        #[arg(long)]
        note: bool,
    },
    /// Complete a line prefix; prints nothing on failure
    Complete {
        #[arg(long, default_value = "plaintext")]
        language: String,
        prefix: String,
    },
    /// Interactive chat about code
    Chat,
    /// JSON-lines chat bridge on stdin/stdout
    Panel,
    /// Show the model list, or switch model
    Model { name: Option<String> },
    /// Show the active model and key state
    Status,
    /// Store the API key
    Login,
    /// Remove the stored API key
    Logout,
    /// Show recent commands
    History {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Set up file-based tracing (logs go to ~/.pilot/pilot.log)
    {
        let log_dir = pilot_dir();
        std::fs::create_dir_all(&log_dir).ok();
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("pilot.log"))?;

        use tracing_subscriber::EnvFilter;
        let filter =
            EnvFilter::try_from_env("PILOT_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(log_file)
            .with_ansi(false)
            .init();
    }

    let args = Args::parse();

    let (mut config, rejected) = PilotConfig::load().unwrap_or_default().validated();
    if let Some(model) = rejected {
        eprintln!(
            "Model \"{model}\" is not supported; switched to \"{}\".",
            config.model
        );
        config.save()?;
    }
    // CLI flags override stored config
    if let Some(ref model) = args.model {
        config.set_model(model)?;
    }
    if let Some(ref url) = args.base_url {
        config.base_url = url.clone();
    }

    let credentials: Arc<dyn CredentialStore> = match args.api_key {
        Some(ref key) if !key.trim().is_empty() => {
            Arc::new(MemoryCredentials::with_api_key(key.trim()))
        }
        _ => Arc::new(FileCredentials::default_location()),
    };
    let ctx = Context {
        client: Arc::new(ChatClient::new(config.base_url.clone())),
        config,
        credentials,
        history: HistoryLog::default_location(),
        color: !args.no_color && std::io::stderr().is_terminal(),
    };

    match args.command {
        Command::Improve {
            file,
            lines,
            instruction,
            yes,
        } => return command::improve(&ctx, &file, lines.as_deref(), instruction, yes).await,
        Command::Append { file, goal, note } => command::append(&ctx, &file, &goal, note).await?,
        Command::Complete { language, prefix } => {
            if let Some(text) = command::complete(&ctx, &language, &prefix).await {
                println!("{text}");
            }
        }
        Command::Chat => command::chat(&ctx).await?,
        Command::Panel => {
            let input = tokio::io::BufReader::new(tokio::io::stdin());
            command::panel(&ctx, input, std::io::stdout().lock()).await?
        }
        Command::Model { name } => command::model(&ctx, name.as_deref())?,
        Command::Status => command::status(&ctx),
        Command::Login => command::login().await?,
        Command::Logout => command::logout()?,
        Command::History { limit } => command::history(&ctx, limit),
    }
    Ok(ExitCode::SUCCESS)
}
