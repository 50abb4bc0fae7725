use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::completion::{ChatMessage, CompletionRequest, DEFAULT_BASE_URL};

/// Models the completion endpoint accepts.
pub const ALLOWED_MODELS: &[&str] = &[
    "sonar",
    "sonar-reasoning",
    "sonar-pro",
    "sonar-reasoning-pro",
    "sonar-deep-research",
    "r1-1776",
];

pub const DEFAULT_MODEL: &str = "sonar";
pub const DEFAULT_MAX_TOKENS: u32 = 120;

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unsupported model \"{0}\" (expected one of: {list})", list = ALLOWED_MODELS.join(", "))]
    UnsupportedModel(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// `~/.pilot`, home of config, credentials and logs.
pub fn pilot_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pilot")
}

/// The command a completion request is made for. Each command scales the
/// configured token budget differently and uses its own temperature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    Improve,
    Append,
    Complete,
    Chat,
}

impl CommandKind {
    pub fn max_tokens(self, base: u32) -> u32 {
        match self {
            CommandKind::Improve => base.saturating_mul(4).clamp(256, 4096),
            CommandKind::Append => base.clamp(16, 2048),
            CommandKind::Complete => 60,
            CommandKind::Chat => 500,
        }
    }

    pub fn temperature(self) -> f32 {
        match self {
            CommandKind::Improve => 0.1,
            CommandKind::Append | CommandKind::Complete => 0.2,
            CommandKind::Chat => 0.5,
        }
    }
}

/// Stored configuration: model choice, token budget base and endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PilotConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            base_url: default_base_url(),
        }
    }
}

impl PilotConfig {
    pub fn config_path() -> PathBuf {
        pilot_dir().join("config.json")
    }

    /// Load from ~/.pilot/config.json.
    pub fn load() -> Option<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Option<Self> {
        let data = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&data) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("ignoring unreadable config {}: {e}", path.display());
                None
            }
        }
    }

    /// Save to ~/.pilot/config.json
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Delete ~/.pilot/config.json
    pub fn clear() -> Result<(), ConfigError> {
        let path = Self::config_path();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Replace an unsupported model with the default. Returns the rejected
    /// name when a replacement happened.
    pub fn validated(mut self) -> (Self, Option<String>) {
        if ALLOWED_MODELS.contains(&self.model.as_str()) {
            return (self, None);
        }
        let rejected = std::mem::replace(&mut self.model, default_model());
        tracing::warn!("unsupported model \"{rejected}\" replaced with \"{DEFAULT_MODEL}\"");
        (self, Some(rejected))
    }

    pub fn set_model(&mut self, model: &str) -> Result<(), ConfigError> {
        if !ALLOWED_MODELS.contains(&model) {
            return Err(ConfigError::UnsupportedModel(model.to_string()));
        }
        self.model = model.to_string();
        Ok(())
    }

    /// Build a request for `kind` with this config's model and budget.
    pub fn request(&self, kind: CommandKind, messages: Vec<ChatMessage>) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            temperature: kind.temperature(),
            max_tokens: kind.max_tokens(self.max_tokens),
            messages,
            stream: false,
        }
    }
}

/// Short status line naming the active model.
pub fn status_text(model: &str) -> String {
    format!("Pilot: {model}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn improve_budget_scales_and_clamps() {
        assert_eq!(CommandKind::Improve.max_tokens(120), 480);
        assert_eq!(CommandKind::Improve.max_tokens(10), 256);
        assert_eq!(CommandKind::Improve.max_tokens(5000), 4096);
        assert_eq!(CommandKind::Improve.max_tokens(u32::MAX), 4096);
    }

    #[test]
    fn append_budget_clamps_base() {
        assert_eq!(CommandKind::Append.max_tokens(120), 120);
        assert_eq!(CommandKind::Append.max_tokens(1), 16);
        assert_eq!(CommandKind::Append.max_tokens(9000), 2048);
    }

    #[test]
    fn fixed_budgets_ignore_base() {
        assert_eq!(CommandKind::Complete.max_tokens(9000), 60);
        assert_eq!(CommandKind::Chat.max_tokens(1), 500);
        assert_eq!(CommandKind::Chat.temperature(), 0.5);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: PilotConfig = serde_json::from_str(r#"{"model":"sonar-pro"}"#).unwrap();
        assert_eq!(config.model, "sonar-pro");
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn unsupported_model_is_replaced() {
        let config = PilotConfig {
            model: "gpt-4".into(),
            ..Default::default()
        };
        let (config, rejected) = config.validated();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(rejected.as_deref(), Some("gpt-4"));

        let (config, rejected) = config.validated();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(rejected.is_none());
    }

    #[test]
    fn set_model_checks_allow_list() {
        let mut config = PilotConfig::default();
        config.set_model("sonar-reasoning-pro").unwrap();
        assert_eq!(config.model, "sonar-reasoning-pro");
        let err = config.set_model("nope").unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedModel(ref m) if m == "nope"));
        assert_eq!(config.model, "sonar-reasoning-pro");
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pilot").join("config.json");
        let config = PilotConfig {
            model: "sonar-pro".into(),
            max_tokens: 300,
            base_url: "http://localhost:9000".into(),
        };
        config.save_to(&path).unwrap();
        assert_eq!(PilotConfig::load_from(&path), Some(config));
    }

    #[test]
    fn request_uses_command_budget() {
        let config = PilotConfig::default();
        let req = config.request(CommandKind::Improve, vec![ChatMessage::user("x")]);
        assert_eq!(req.model, "sonar");
        assert_eq!(req.max_tokens, 480);
        assert_eq!(req.temperature, 0.1);
        assert!(!req.stream);
    }

    #[test]
    fn status_names_model() {
        assert_eq!(status_text("sonar-pro"), "Pilot: sonar-pro");
    }
}
