pub mod completion;
pub mod config;
pub mod credentials;
pub mod diff;
pub mod document;
pub mod fallback;
pub mod panel;
pub mod preview;
pub mod prompt;
pub mod session;
pub mod sse;
pub mod text;

// Re-exports
pub use completion::{
    ChatClient, ChatMessage, ChunkStream, CompletionClient, CompletionError, CompletionRequest,
    FinishReason, GenerationChunk, Role,
};
pub use config::{ALLOWED_MODELS, CommandKind, ConfigError, PilotConfig, status_text};
pub use credentials::{
    API_KEY_NAME, CredentialError, CredentialStore, FileCredentials, MemoryCredentials,
};
pub use document::{Document, DocumentError, FileDocument};
pub use panel::{ChatPanel, PanelReply, PanelRequest};
pub use preview::{EditPreview, PreviewSurface, Side};
pub use session::{
    EditError, EditOutcome, EditReport, EditRequest, EditSession, Phase, SessionSettings,
    SessionState,
};
