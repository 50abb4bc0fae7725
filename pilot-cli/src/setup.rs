use crossterm::event::{self, Event, KeyCode, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Paragraph},
};

use crate::theme;

// ── State machine ───────────────────────────────────────────────────

enum LoginStep {
    InputKey {
        input: String,
        cursor: usize,
        error: Option<String>,
    },
    Done,
}

struct LoginApp {
    step: LoginStep,
    /// Show the key in clear text instead of bullets.
    reveal: bool,
}

impl LoginApp {
    fn new() -> Self {
        Self {
            step: LoginStep::InputKey {
                input: String::new(),
                cursor: 0,
                error: None,
            },
            reveal: false,
        }
    }

    /// Apply one key press. Returns the entered key once submitted.
    fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) -> Option<String> {
        if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('r') {
            self.reveal = !self.reveal;
            return None;
        }
        let LoginStep::InputKey {
            input,
            cursor,
            error,
        } = &mut self.step
        else {
            return None;
        };
        match code {
            KeyCode::Char(c) => {
                input.insert(*cursor, c);
                *cursor += c.len_utf8();
                *error = None;
            }
            KeyCode::Backspace => {
                if *cursor > 0 {
                    let prev = prev_boundary(input, *cursor);
                    input.drain(prev..*cursor);
                    *cursor = prev;
                }
            }
            KeyCode::Left => {
                *cursor = prev_boundary(input, *cursor);
            }
            KeyCode::Right => {
                if *cursor < input.len() {
                    *cursor += input[*cursor..]
                        .chars()
                        .next()
                        .map(|c| c.len_utf8())
                        .unwrap_or(0);
                }
            }
            KeyCode::Home => *cursor = 0,
            KeyCode::End => *cursor = input.len(),
            KeyCode::Enter => {
                let val = input.trim().to_string();
                if val.is_empty() {
                    *error = Some("Cannot be empty".into());
                } else {
                    self.step = LoginStep::Done;
                    return Some(val);
                }
            }
            _ => {}
        }
        None
    }
}

fn prev_boundary(input: &str, cursor: usize) -> usize {
    input[..cursor]
        .char_indices()
        .last()
        .map(|(i, _)| i)
        .unwrap_or(0)
}

// ── Public entry point ──────────────────────────────────────────────

/// Ask for the API key on a full-screen prompt.
pub fn run_login() -> anyhow::Result<String> {
    let mut terminal = ratatui::init();
    let result = run_login_inner(&mut terminal);
    ratatui::restore();
    result
}

fn run_login_inner(terminal: &mut ratatui::DefaultTerminal) -> anyhow::Result<String> {
    let mut app = LoginApp::new();
    loop {
        terminal.draw(|frame| draw_login(frame, &app))?;

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if (key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c'))
            || key.code == KeyCode::Esc
        {
            anyhow::bail!("Login cancelled");
        }
        if let Some(api_key) = app.handle_key(key.code, key.modifiers) {
            terminal.draw(|frame| draw_login(frame, &app))?;
            std::thread::sleep(std::time::Duration::from_millis(400));
            return Ok(api_key);
        }
    }
}

// ── Rendering ───────────────────────────────────────────────────────

fn draw_login(frame: &mut Frame, app: &LoginApp) {
    frame.render_widget(
        Block::default().style(Style::default().bg(theme::FORM)),
        frame.area(),
    );

    let step_height: u16 = match &app.step {
        LoginStep::InputKey { error, .. } => {
            if error.is_some() {
                9
            } else {
                8
            }
        }
        LoginStep::Done => 3,
    };

    let chunks = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(2), // title
        Constraint::Length(step_height),
        Constraint::Min(0),
    ])
    .split(frame.area());

    draw_title(frame, chunks[1]);

    match &app.step {
        LoginStep::InputKey {
            input,
            cursor,
            error,
        } => draw_key_input(frame, chunks[2], input, *cursor, error.as_deref(), app.reveal),
        LoginStep::Done => draw_done(frame, chunks[2]),
    }
}

fn draw_title(frame: &mut Frame, area: Rect) {
    let title = "p i l o t";
    let pad = " ".repeat(center_pad(area.width as usize, title.len()));
    let lines = vec![
        Line::from(Span::styled(
            format!("{pad}{title}"),
            Style::default().fg(theme::CHALK),
        )),
        Line::from(Span::styled(
            format!("{pad}─────────"),
            Style::default().fg(theme::ASH_MID),
        )),
    ];
    frame.render_widget(
        Paragraph::new(lines).style(Style::default().bg(theme::FORM)),
        area,
    );
}

fn draw_key_input(
    frame: &mut Frame,
    area: Rect,
    input: &str,
    cursor: usize,
    error: Option<&str>,
    reveal: bool,
) {
    let box_width = 46usize;
    let cx = center_pad(area.width as usize, box_width);
    let pad = " ".repeat(cx);
    let inner_w = box_width.saturating_sub(6);

    let mut lines: Vec<Line> = Vec::new();
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        format!("{pad}Enter your Perplexity API key."),
        theme::hint(),
    )));
    lines.push(Line::from(""));

    let label = "API key";
    lines.push(Line::from(Span::styled(
        format!(
            "{pad}\u{256d} {label} {}\u{256e}",
            "\u{2500}".repeat(box_width.saturating_sub(label.len() + 4)),
        ),
        theme::input_border(),
    )));

    let shown = if reveal {
        input.to_string()
    } else {
        "•".repeat(input.chars().count())
    };
    let shown_cursor = if reveal {
        cursor
    } else {
        input[..cursor].chars().count() * "•".len()
    };
    let display_text = visible_slice(&shown, inner_w, shown_cursor);
    let text_pad = inner_w.saturating_sub(display_text.chars().count());
    lines.push(Line::from(vec![
        Span::styled(format!("{pad}\u{2502} "), theme::input_border()),
        Span::styled(
            format!("{} ", theme::PROMPT_CHAR),
            Style::default().fg(theme::SODIUM),
        ),
        Span::styled(display_text.to_string(), theme::user_input()),
        Span::styled(
            format!("{} \u{2502}", " ".repeat(text_pad)),
            theme::input_border(),
        ),
    ]));
    lines.push(Line::from(Span::styled(
        format!(
            "{pad}\u{2570}{}\u{256f}",
            "\u{2500}".repeat(box_width.saturating_sub(2))
        ),
        theme::input_border(),
    )));

    if let Some(err) = error {
        lines.push(Line::from(Span::styled(
            format!("{pad}  {err}"),
            theme::error(),
        )));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled(format!("{pad}enter"), theme::help_key()),
        Span::styled(" save  ", theme::help_desc()),
        Span::styled("ctrl+r", theme::help_key()),
        Span::styled(" show/hide  ", theme::help_desc()),
        Span::styled("esc", theme::help_key()),
        Span::styled(" cancel", theme::help_desc()),
    ]));

    frame.render_widget(
        Paragraph::new(lines).style(Style::default().bg(theme::FORM)),
        area,
    );

    let cursor_chars = input[..cursor].chars().count();
    let vis_start = visible_start(input.chars().count(), inner_w, cursor_chars);
    let cursor_x = (cx + 4 + cursor_chars.saturating_sub(vis_start)) as u16; // pad + "│ ❯ "
    let cursor_y = area.y + 4;
    if cursor_x < area.width && cursor_y < area.y + area.height {
        frame.set_cursor_position((area.x + cursor_x, cursor_y));
    }
}

fn draw_done(frame: &mut Frame, area: Rect) {
    let pad = " ".repeat(center_pad(area.width as usize, 10));
    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(format!("{pad}Key saved."), theme::success())),
    ];
    frame.render_widget(
        Paragraph::new(lines).style(Style::default().bg(theme::FORM)),
        area,
    );
}

// ── Helpers ─────────────────────────────────────────────────────────

fn center_pad(viewport_width: usize, content_width: usize) -> usize {
    viewport_width.saturating_sub(content_width) / 2
}

/// Return the visible portion of text that fits in `width` chars around the cursor.
fn visible_slice(input: &str, width: usize, cursor_byte: usize) -> &str {
    if width == 0 {
        return "";
    }
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let total = chars.len();
    if total <= width {
        return input;
    }
    let cursor_char = input[..cursor_byte].chars().count();
    let start = visible_start(total, width, cursor_char);
    let end = (start + width).min(total);
    let byte_start = chars[start].0;
    let byte_end = if end < total {
        chars[end].0
    } else {
        input.len()
    };
    &input[byte_start..byte_end]
}

/// Char index of the first visible character.
fn visible_start(total: usize, width: usize, cursor_char: usize) -> usize {
    if total <= width {
        return 0;
    }
    if cursor_char > width.saturating_sub(1) {
        cursor_char - width + 1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_str(app: &mut LoginApp, s: &str) {
        for c in s.chars() {
            app.handle_key(KeyCode::Char(c), KeyModifiers::NONE);
        }
    }

    #[test]
    fn typing_and_editing() {
        let mut app = LoginApp::new();
        type_str(&mut app, "pplx-abd");
        app.handle_key(KeyCode::Backspace, KeyModifiers::NONE);
        app.handle_key(KeyCode::Left, KeyModifiers::NONE);
        type_str(&mut app, "X");
        let LoginStep::InputKey { input, .. } = &app.step else {
            panic!("left input step");
        };
        assert_eq!(input, "pplx-aXb");
    }

    #[test]
    fn empty_submit_shows_error() {
        let mut app = LoginApp::new();
        type_str(&mut app, "   ");
        assert_eq!(app.handle_key(KeyCode::Enter, KeyModifiers::NONE), None);
        let LoginStep::InputKey { error, .. } = &app.step else {
            panic!("left input step");
        };
        assert_eq!(error.as_deref(), Some("Cannot be empty"));
    }

    #[test]
    fn submit_returns_trimmed_key() {
        let mut app = LoginApp::new();
        type_str(&mut app, " pplx-1 ");
        assert_eq!(
            app.handle_key(KeyCode::Enter, KeyModifiers::NONE).as_deref(),
            Some("pplx-1")
        );
        assert!(matches!(app.step, LoginStep::Done));
    }

    #[test]
    fn ctrl_r_toggles_reveal() {
        let mut app = LoginApp::new();
        app.handle_key(KeyCode::Char('r'), KeyModifiers::CONTROL);
        assert!(app.reveal);
        let LoginStep::InputKey { input, .. } = &app.step else {
            panic!("left input step");
        };
        assert!(input.is_empty());
    }

    #[test]
    fn visible_slice_follows_cursor() {
        assert_eq!(visible_slice("abcdef", 10, 3), "abcdef");
        assert_eq!(visible_slice("abcdef", 3, 6), "ef");
        assert_eq!(visible_slice("abcdef", 3, 1), "abc");
    }
}
