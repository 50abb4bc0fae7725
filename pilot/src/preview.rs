use crate::diff::{self, DiffStats};

/// Which pane of the comparison a preview update targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Original,
    Proposed,
}

/// The comparison shown when asking whether to apply an edit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EditPreview {
    pub original: String,
    pub proposed: String,
}

impl EditPreview {
    pub fn new(original: impl Into<String>, proposed: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            proposed: proposed.into(),
        }
    }

    pub fn unified_diff(&self, context: usize) -> String {
        diff::unified_diff(&self.original, &self.proposed, context)
    }

    pub fn stats(&self) -> DiffStats {
        diff::diff_stats(&self.original, &self.proposed)
    }
}

/// Anything that can show original vs. proposed text and ask the user to
/// decide.
///
/// `update` is called from the generation loop and must return promptly;
/// slow surfaces should queue the text and render it elsewhere.
#[async_trait::async_trait]
pub trait PreviewSurface: Send {
    fn update(&mut self, side: Side, text: &str);

    /// The response was cut off at the token limit. Ask whether to continue.
    async fn confirm_continue(&mut self) -> bool;

    /// Ask whether to apply the proposed text.
    async fn confirm_apply(&mut self, preview: &EditPreview) -> bool;

    /// Drop preview buffers and any transient affordances.
    fn release(&mut self);
}
