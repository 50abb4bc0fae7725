use ratatui::style::{Color, Modifier, Style};

// ── Formwork: warm olive-tinted blacks ──────────────────────────────
pub const FORM: Color = Color::Rgb(14, 13, 11);

// ── Ash: structural greys ──────────────────────────────────────────
pub const ASH: Color = Color::Rgb(42, 42, 40);
pub const ASH_MID: Color = Color::Rgb(74, 74, 68);
pub const ASH_TEXT: Color = Color::Rgb(90, 90, 80);

// ── Chalk: text hierarchy ──────────────────────────────────────────
pub const CHALK_MID: Color = Color::Rgb(200, 196, 184);
pub const CHALK: Color = Color::Rgb(232, 228, 208);

// ── Accent colors ──────────────────────────────────────────────────
pub const SODIUM: Color = Color::Rgb(232, 163, 60);
pub const LICHEN: Color = Color::Rgb(138, 158, 108);
pub const ERROR: Color = Color::Rgb(204, 68, 68);

// ── Character constants ────────────────────────────────────────────
pub const PROMPT_CHAR: &str = "❯";

/// The same palette as raw escape sequences, for line-oriented output
/// outside the TUI.
pub mod ansi {
    pub const SODIUM: &str = "\x1b[38;2;232;163;60m"; // #e8a33c
    pub const CHALK: &str = "\x1b[38;2;232;228;208m"; // #e8e4d0
    pub const ASH_TEXT: &str = "\x1b[38;2;90;90;80m"; // #5a5a50
    pub const LICHEN: &str = "\x1b[38;2;138;158;108m"; // #8a9e6c
    pub const ERR: &str = "\x1b[38;2;204;68;68m"; // #c44
    pub const RESET: &str = "\x1b[0m";
}

// ── Style helpers ──────────────────────────────────────────────────

/// Help bar key labels
pub fn help_key() -> Style {
    Style::default().fg(SODIUM).add_modifier(Modifier::BOLD)
}

/// Help bar descriptions
pub fn help_desc() -> Style {
    Style::default().fg(ASH_MID)
}

/// Explanatory text above an input
pub fn hint() -> Style {
    Style::default().fg(ASH_TEXT)
}

/// Input box border
pub fn input_border() -> Style {
    Style::default().fg(ASH)
}

/// Text typed into an input box
pub fn user_input() -> Style {
    Style::default().fg(CHALK_MID)
}

pub fn error() -> Style {
    Style::default().fg(ERROR)
}

pub fn success() -> Style {
    Style::default().fg(LICHEN).add_modifier(Modifier::BOLD)
}
