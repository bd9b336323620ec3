use std::time::Instant;

use itertools::Itertools;
use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Paragraph, Widget, Wrap},
};
use unicode_width::UnicodeWidthStr;

use crate::display::{BoardView, LetterHandle, LetterState};
use crate::game::Phase;

const HORIZONTAL_MARGIN: u16 = 5;
const VERTICAL_MARGIN: u16 = 1;

// Same red the wrong-key blink has always used
const ERROR_RED: Color = Color::Rgb(241, 95, 121);

const KEY_HINTS: [(&str, &str); 3] = [("space", "restart"), ("tab", "restart"), ("esc", "quit")];

fn phase_color(phase: Phase) -> Color {
    match phase {
        Phase::NotStarted => Color::Cyan,
        Phase::Running => Color::Yellow,
        Phase::Finished => Color::Green,
    }
}

pub fn key_hints() -> String {
    KEY_HINTS
        .iter()
        .map(|(key, action)| format!("({key}) {action}"))
        .join("  ·  ")
}

fn letter_spans(view: &BoardView, now: Instant) -> Vec<Span<'static>> {
    let bold_style = Style::default().add_modifier(Modifier::BOLD);
    let consumed_style = Style::default().fg(Color::DarkGray).add_modifier(Modifier::DIM);
    let next_style = Style::default()
        .patch(bold_style)
        .add_modifier(Modifier::UNDERLINED);
    let flash_style = Style::default()
        .patch(bold_style)
        .fg(Color::White)
        .bg(ERROR_RED);

    let next_idx = view
        .tiles
        .iter()
        .position(|t| t.state == LetterState::Pending);

    let mut spans = Vec::with_capacity(view.tiles.len() * 2);
    for (idx, tile) in view.tiles.iter().enumerate() {
        if idx > 0 {
            spans.push(Span::raw(" "));
        }

        let style = if view.is_flashing(LetterHandle(idx), now) {
            flash_style
        } else if tile.state == LetterState::Consumed {
            consumed_style
        } else if Some(idx) == next_idx {
            next_style
        } else {
            bold_style
        };

        spans.push(Span::styled(tile.letter.to_uppercase().to_string(), style));
    }
    spans
}

impl Widget for &BoardView {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let italic_style = Style::default()
            .fg(Color::Gray)
            .add_modifier(Modifier::ITALIC);

        let letters_line = Line::from(letter_spans(self, Instant::now()));
        let max_chars_per_line = area.width.saturating_sub(HORIZONTAL_MARGIN * 2).max(1);
        let letters_width = letters_line.width() as u16;
        let letter_lines = letters_width.div_ceil(max_chars_per_line).max(1);

        let status_width = self.status.width() as u16;
        let status_lines = status_width.div_ceil(max_chars_per_line).max(1);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .horizontal_margin(HORIZONTAL_MARGIN)
            .vertical_margin(VERTICAL_MARGIN)
            .constraints([
                Constraint::Min(0),
                Constraint::Length(status_lines),
                Constraint::Length(1),
                Constraint::Length(letter_lines),
                Constraint::Length(1),
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);

        Paragraph::new(Span::styled(
            self.status.clone(),
            Style::default()
                .fg(phase_color(self.phase))
                .add_modifier(Modifier::BOLD),
        ))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .render(chunks[1], buf);

        Paragraph::new(letters_line)
            .alignment(if letter_lines == 1 {
                Alignment::Center
            } else {
                Alignment::Left
            })
            .wrap(Wrap { trim: true })
            .render(chunks[3], buf);

        if let Some(best) = &self.best_time {
            Paragraph::new(Span::styled(
                best.clone(),
                Style::default().fg(Color::Magenta),
            ))
            .alignment(Alignment::Center)
            .render(chunks[5], buf);
        }

        Paragraph::new(Span::styled(
            format!("{}   [{}]", key_hints(), self.phase),
            italic_style,
        ))
        .alignment(Alignment::Center)
        .render(chunks[7], buf);
    }
}
