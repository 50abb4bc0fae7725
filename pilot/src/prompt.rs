//! Prompt construction for every command.

use crate::completion::ChatMessage;
use crate::session::EditRequest;
use crate::text::tail_lines;

/// Lines of already-generated output repeated when asking for a continuation.
pub const CONTINUATION_TAIL_LINES: usize = 40;

const EDIT_SYSTEM: &str = "You are a precise code transformation engine. Apply the user's \
    instruction to the given selection and return ONLY the full edited selection as code, in \
    the same language. Do not include commentary or code fences.";

const CONTINUE_INSTRUCTION: &str = "Your previous answer was cut off by the length limit. \
    Continue exactly where you stopped. Do not repeat anything you already wrote and do not \
    add commentary or code fences.";

const APPEND_SYSTEM: &str = "You are a coding assistant. Respond with a single code line that \
    satisfies the user's goal for the indicated language or file context. Do not include code \
    fences or commentary.";

const COMPLETE_SYSTEM: &str =
    "You complete code inline. Respond with a single completion, no backticks, no prose.";

pub const CHAT_SYSTEM: &str =
    "You are a helpful AI assistant. Answer user code questions or chat about code.";

/// System + user messages for a guided edit.
pub fn edit_messages(request: &EditRequest) -> Vec<ChatMessage> {
    let user = [
        format!("Language: {}", request.language()),
        format!("Instruction: {}", request.instruction()),
        "Return: the full edited selection only (no backticks, no prose).".to_string(),
        "--- ORIGINAL SELECTION ---".to_string(),
        request.original_text().to_string(),
        "--- END ORIGINAL ---".to_string(),
    ]
    .join("\n");
    vec![ChatMessage::system(EDIT_SYSTEM), ChatMessage::user(user)]
}

/// Messages asking the model to resume a length-limited edit.
///
/// The partial output goes back as the assistant's turn, followed by a
/// continue instruction anchored on the last `tail` lines.
pub fn continuation_messages(
    request: &EditRequest,
    partial: &str,
    tail: usize,
) -> Vec<ChatMessage> {
    let mut messages = edit_messages(request);
    messages.push(ChatMessage::assistant(partial));
    messages.push(ChatMessage::user(format!(
        "{CONTINUE_INSTRUCTION}\n--- LAST LINES SO FAR ---\n{}\n--- END ---",
        tail_lines(partial, tail)
    )));
    messages
}

/// Messages for generating a single line to append to a file.
pub fn append_messages(goal: &str, language: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(APPEND_SYSTEM),
        ChatMessage::user(format!(
            "Goal: {goal}\nLanguage: {language}\nOutput: a single code line only, no backticks, no commentary."
        )),
    ]
}

/// Messages for an inline completion of `line_prefix`.
pub fn completion_messages(language: &str, line_prefix: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(COMPLETE_SYSTEM),
        ChatMessage::user(format!(
            "Language: {language}\nLine prefix: {line_prefix}\nContinue this line succinctly."
        )),
    ]
}
