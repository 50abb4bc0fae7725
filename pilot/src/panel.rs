//! Sidebar chat: a small JSON message protocol and the conversation behind it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::completion::{ChatMessage, CompletionClient};
use crate::config::{CommandKind, PilotConfig};
use crate::credentials::{API_KEY_NAME, CredentialStore};
use crate::prompt::CHAT_SYSTEM;

/// Shown when the model answers with nothing.
pub const NO_RESPONSE: &str = "[No response]";

/// User/assistant turns kept as context for the next question.
const MAX_HISTORY_MESSAGES: usize = 20;

// --- Panel → host ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum PanelRequest {
    SendMessage { text: String },
    SetModel { model: String },
    Clear,
}

// --- Host → panel ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum PanelReply {
    BotReply { text: String },
    ModelChanged { model: String },
    Cleared,
    Error { message: String },
}

pub struct ChatPanel {
    client: Arc<dyn CompletionClient>,
    credentials: Arc<dyn CredentialStore>,
    config: PilotConfig,
    history: Vec<ChatMessage>,
}

impl ChatPanel {
    pub fn new(
        config: PilotConfig,
        client: Arc<dyn CompletionClient>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            client,
            credentials,
            config,
            history: Vec::new(),
        }
    }

    pub fn config(&self) -> &PilotConfig {
        &self.config
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub async fn handle(&mut self, request: PanelRequest) -> PanelReply {
        match request {
            PanelRequest::SendMessage { text } => self.send(text).await,
            PanelRequest::SetModel { model } => match self.config.set_model(&model) {
                Ok(()) => PanelReply::ModelChanged { model },
                Err(e) => PanelReply::Error {
                    message: e.to_string(),
                },
            },
            PanelRequest::Clear => {
                self.history.clear();
                PanelReply::Cleared
            }
        }
    }

    async fn send(&mut self, text: String) -> PanelReply {
        let text = text.trim().to_string();
        if text.is_empty() {
            return PanelReply::Error {
                message: "empty message".to_string(),
            };
        }
        let Some(api_key) = self.credentials.get(API_KEY_NAME) else {
            return PanelReply::Error {
                message: "no API key configured".to_string(),
            };
        };

        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::system(CHAT_SYSTEM));
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(text.clone()));

        let request = self.config.request(CommandKind::Chat, messages);
        match self.client.complete(&api_key, request).await {
            Ok(reply) => {
                let reply = reply.trim();
                let reply = if reply.is_empty() { NO_RESPONSE } else { reply };
                self.remember(ChatMessage::user(text));
                self.remember(ChatMessage::assistant(reply));
                PanelReply::BotReply {
                    text: reply.to_string(),
                }
            }
            Err(e) => {
                tracing::warn!("chat request failed: {e}");
                PanelReply::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    fn remember(&mut self, message: ChatMessage) {
        self.history.push(message);
        if self.history.len() > MAX_HISTORY_MESSAGES {
            let excess = self.history.len() - MAX_HISTORY_MESSAGES;
            self.history.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::completion::{ChunkStream, CompletionError, CompletionRequest, Role};
    use crate::credentials::MemoryCredentials;

    struct CannedClient {
        replies: Mutex<VecDeque<Result<String, CompletionError>>>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl CannedClient {
        fn new(replies: Vec<Result<String, CompletionError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl CompletionClient for CannedClient {
        async fn complete(
            &self,
            _api_key: &str,
            request: CompletionRequest,
        ) -> Result<String, CompletionError> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }

        fn stream(&self, _api_key: &str, _request: CompletionRequest) -> ChunkStream {
            Box::pin(futures::stream::empty())
        }
    }

    fn panel(client: Arc<CannedClient>) -> ChatPanel {
        ChatPanel::new(
            PilotConfig::default(),
            client,
            Arc::new(MemoryCredentials::with_api_key("k")),
        )
    }

    #[test]
    fn requests_use_command_tag() {
        let req: PanelRequest =
            serde_json::from_str(r#"{"command":"sendMessage","text":"hi"}"#).unwrap();
        assert_eq!(req, PanelRequest::SendMessage { text: "hi".into() });
        let req: PanelRequest = serde_json::from_str(r#"{"command":"clear"}"#).unwrap();
        assert_eq!(req, PanelRequest::Clear);
        assert!(serde_json::from_str::<PanelRequest>(r#"{"command":"reboot"}"#).is_err());

        let reply = serde_json::to_string(&PanelReply::BotReply { text: "yo".into() }).unwrap();
        assert_eq!(reply, r#"{"command":"botReply","text":"yo"}"#);
    }

    #[tokio::test]
    async fn reply_is_trimmed_and_remembered() {
        let client = CannedClient::new(vec![Ok("  use a loop \n".into()), Ok("ok".into())]);
        let mut panel = panel(client.clone());

        let reply = panel
            .handle(PanelRequest::SendMessage {
                text: "how do I repeat?".into(),
            })
            .await;
        assert_eq!(reply, PanelReply::BotReply { text: "use a loop".into() });

        panel
            .handle(PanelRequest::SendMessage {
                text: "thanks".into(),
            })
            .await;
        let requests = client.requests.lock().unwrap();
        assert_eq!(requests[0].max_tokens, 500);
        assert_eq!(requests[0].temperature, 0.5);
        let second = &requests[1].messages;
        assert_eq!(second.len(), 4);
        assert_eq!(second[0].role, Role::System);
        assert_eq!(second[2].content, "use a loop");
        assert_eq!(second[3].content, "thanks");
    }

    #[tokio::test]
    async fn empty_reply_falls_back() {
        let mut panel = panel(CannedClient::new(vec![Ok("   ".into())]));
        let reply = panel
            .handle(PanelRequest::SendMessage { text: "?".into() })
            .await;
        assert_eq!(reply, PanelReply::BotReply { text: NO_RESPONSE.into() });
    }

    #[tokio::test]
    async fn failures_are_reported_not_remembered() {
        let client = CannedClient::new(vec![Err(CompletionError::Api {
            status: 401,
            message: "bad key".into(),
        })]);
        let mut panel = panel(client);
        let reply = panel
            .handle(PanelRequest::SendMessage { text: "hi".into() })
            .await;
        match reply {
            PanelReply::Error { message } => assert!(message.contains("bad key")),
            other => panic!("unexpected reply {other:?}"),
        }
        assert!(panel.history().is_empty());
    }

    #[tokio::test]
    async fn missing_key_is_an_error() {
        let client = CannedClient::new(vec![]);
        let mut panel = ChatPanel::new(
            PilotConfig::default(),
            client.clone(),
            Arc::new(MemoryCredentials::new()),
        );
        let reply = panel
            .handle(PanelRequest::SendMessage { text: "hi".into() })
            .await;
        assert!(matches!(reply, PanelReply::Error { .. }));
        assert!(client.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_model_and_clear() {
        let mut panel = panel(CannedClient::new(vec![Ok("a".into())]));
        let reply = panel
            .handle(PanelRequest::SetModel {
                model: "sonar-pro".into(),
            })
            .await;
        assert_eq!(reply, PanelReply::ModelChanged { model: "sonar-pro".into() });
        assert_eq!(panel.config().model, "sonar-pro");

        let reply = panel
            .handle(PanelRequest::SetModel { model: "gpt".into() })
            .await;
        assert!(matches!(reply, PanelReply::Error { .. }));
        assert_eq!(panel.config().model, "sonar-pro");

        panel
            .handle(PanelRequest::SendMessage { text: "q".into() })
            .await;
        assert_eq!(panel.history().len(), 2);
        assert_eq!(panel.handle(PanelRequest::Clear).await, PanelReply::Cleared);
        assert!(panel.history().is_empty());
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let replies = (0..15).map(|i| Ok(format!("r{i}"))).collect();
        let mut panel = panel(CannedClient::new(replies));
        for i in 0..15 {
            panel
                .handle(PanelRequest::SendMessage {
                    text: format!("q{i}"),
                })
                .await;
        }
        assert_eq!(panel.history().len(), MAX_HISTORY_MESSAGES);
        assert_eq!(panel.history().last().unwrap().content, "r14");
    }
}
