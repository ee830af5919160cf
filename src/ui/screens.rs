//! The three assistant screens: status text, recording indicator, energy bars.
//!
//! Every screen redraws the whole frame, so there is no incremental state to
//! get out of sync; drawing the same screen twice yields the same buffer. The
//! geometry helpers are split out from the frame code so the shapes can be
//! checked without a terminal.

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Text},
    widgets::Paragraph,
    Frame,
};
use unicode_width::UnicodeWidthChar;
use unicode_width::UnicodeWidthStr;

/// Status lines wider than this many columns are truncated with an ellipsis.
pub const MAX_STATUS_COLS: usize = 32;

/// Number of bar columns on the energy screen.
pub const ENERGY_COLUMNS: usize = 5;

/// Full-scale amplitude in abstract segment units before scaling to rows.
const MAX_AMPLITUDE: u32 = 100;

/// Radius of the recording circle in rows.
const REC_RADIUS: i32 = 5;

const STATUS_COLOR: Color = Color::Rgb(210, 205, 200);
const REC_COLOR: Color = Color::Rgb(255, 90, 90);
const BAR_COLOR: Color = Color::Rgb(255, 110, 110);

/// Clip a status line to [`MAX_STATUS_COLS`] display columns.
///
/// Width is measured in terminal columns, so wide characters count double and
/// the clipped line never overflows its budget.
pub fn truncate_status(text: &str) -> String {
    if UnicodeWidthStr::width(text) <= MAX_STATUS_COLS {
        return text.to_string();
    }
    let mut clipped = String::new();
    let mut used = 0usize;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > MAX_STATUS_COLS {
            break;
        }
        clipped.push(c);
        used += w;
    }
    clipped.push_str("...");
    clipped
}

/// Rectangle of `height` rows vertically centered in `area`.
fn centered_rows(area: Rect, height: u16) -> Rect {
    let height = height.min(area.height);
    let pad = area.height.saturating_sub(height) / 2;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(pad),
            Constraint::Length(height),
            Constraint::Min(0),
        ])
        .split(area);
    chunks[1]
}

/// Draw a single centered status line.
pub fn draw_status(frame: &mut Frame<'_>, text: &str) {
    let line = truncate_status(text);
    let widget = Paragraph::new(line)
        .style(Style::default().fg(STATUS_COLOR))
        .alignment(Alignment::Center);
    frame.render_widget(widget, centered_rows(frame.size(), 1));
}

/// Rows of a filled circle, rendered with half-width compensation.
///
/// Terminal cells are roughly twice as tall as they are wide, so a cell at
/// column offset `x` contributes `x / 2` to the radial distance.
fn circle_rows(radius: i32) -> Vec<String> {
    let mut rows = Vec::new();
    for y in -radius..=radius {
        let mut row = String::new();
        for x in -(radius * 2)..=(radius * 2) {
            let dx = x as f32 / 2.0;
            let dy = y as f32;
            if dx * dx + dy * dy <= (radius as f32) * (radius as f32) {
                row.push('█');
            } else {
                row.push(' ');
            }
        }
        rows.push(row);
    }
    rows
}

/// Draw the filled recording circle.
pub fn draw_recording(frame: &mut Frame<'_>) {
    let rows = circle_rows(REC_RADIUS);
    let text = Text::from(rows.into_iter().map(Line::from).collect::<Vec<_>>());
    let height = text.height() as u16;
    let widget = Paragraph::new(text)
        .style(Style::default().fg(REC_COLOR))
        .alignment(Alignment::Center);
    frame.render_widget(widget, centered_rows(frame.size(), height));
}

/// Segment counts for the five bar columns at a given energy.
///
/// The center column carries the full amplitude; each step outward loses two
/// segments, which keeps the silhouette peaked even at high energy.
pub fn bar_segments(energy: f32) -> [u32; ENERGY_COLUMNS] {
    let amplitude = (MAX_AMPLITUDE as f32 * energy.max(0.0)).min(MAX_AMPLITUDE as f32) as u32;
    let mut segments = [0u32; ENERGY_COLUMNS];
    let center = (ENERGY_COLUMNS / 2) as i32;
    for (i, slot) in segments.iter_mut().enumerate() {
        let distance = (i as i32 - center).unsigned_abs();
        *slot = amplitude.saturating_sub(2 * distance);
    }
    segments
}

/// Raster for the energy screen: bars grow symmetrically from the middle row.
fn energy_rows(segments: &[u32; ENERGY_COLUMNS], height: u16) -> Vec<String> {
    let height = height.max(1) as i32;
    let center = height / 2;
    // Half-extent per column, scaled from segment units to rows.
    let half: Vec<i32> = segments
        .iter()
        .map(|&count| {
            let rows = (count * height as u32).div_ceil(MAX_AMPLITUDE);
            rows.div_ceil(2) as i32
        })
        .collect();

    (0..height)
        .map(|row| {
            let distance = (row - center).abs();
            let mut line = String::new();
            for (i, &extent) in half.iter().enumerate() {
                if i > 0 {
                    line.push_str("  ");
                }
                if segments[i] > 0 && distance < extent {
                    line.push_str("██");
                } else {
                    line.push_str("  ");
                }
            }
            line
        })
        .collect()
}

/// Draw the speech-energy visualization for one playback chunk.
pub fn draw_energy(frame: &mut Frame<'_>, energy: f32) {
    let area = frame.size();
    let rows = energy_rows(&bar_segments(energy), area.height);
    let text = Text::from(rows.into_iter().map(Line::from).collect::<Vec<_>>());
    let widget = Paragraph::new(text)
        .style(Style::default().fg(BAR_COLOR))
        .alignment(Alignment::Center);
    frame.render_widget(widget, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::{backend::TestBackend, Terminal};

    fn render(draw: impl Fn(&mut Frame<'_>)) -> Vec<String> {
        let backend = TestBackend::new(60, 20);
        let mut terminal = Terminal::new(backend).expect("terminal");
        terminal.draw(|frame| draw(frame)).expect("draw");
        buffer_rows(&terminal)
    }

    fn buffer_rows(terminal: &Terminal<TestBackend>) -> Vec<String> {
        let buffer = terminal.backend().buffer();
        let area = buffer.area;
        (0..area.height)
            .map(|y| {
                (0..area.width)
                    .map(|x| buffer.get(x, y).symbol().to_string())
                    .collect()
            })
            .collect()
    }

    #[test]
    fn short_status_is_unchanged() {
        assert_eq!(truncate_status("Hold SPACE to talk"), "Hold SPACE to talk");
    }

    #[test]
    fn long_status_is_clipped_with_ellipsis() {
        let long = "a".repeat(40);
        let clipped = truncate_status(&long);
        assert_eq!(clipped, format!("{}...", "a".repeat(32)));
    }

    #[test]
    fn exact_width_status_is_unchanged() {
        let exact = "b".repeat(MAX_STATUS_COLS);
        assert_eq!(truncate_status(&exact), exact);
    }

    #[test]
    fn wide_characters_count_double() {
        let wide = "你".repeat(20); // 40 columns
        let clipped = truncate_status(&wide);
        assert!(clipped.ends_with("..."));
        let body = clipped.trim_end_matches("...");
        assert!(UnicodeWidthStr::width(body) <= MAX_STATUS_COLS);
    }

    #[test]
    fn status_renders_centered_text() {
        let rows = render(|frame| draw_status(frame, "ready"));
        let hit: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.contains("ready"))
            .map(|(y, _)| y)
            .collect();
        assert_eq!(hit.len(), 1);
        // Vertically centered in the 20-row frame.
        assert!((8..=11).contains(&hit[0]));
    }

    #[test]
    fn drawing_a_screen_twice_is_idempotent() {
        let backend = TestBackend::new(60, 20);
        let mut terminal = Terminal::new(backend).expect("terminal");
        terminal
            .draw(|frame| draw_status(frame, "hello"))
            .expect("draw");
        let first = buffer_rows(&terminal);
        terminal
            .draw(|frame| draw_status(frame, "hello"))
            .expect("draw");
        assert_eq!(first, buffer_rows(&terminal));
    }

    #[test]
    fn status_screen_replaces_previous_content() {
        let backend = TestBackend::new(60, 20);
        let mut terminal = Terminal::new(backend).expect("terminal");
        terminal
            .draw(|frame| draw_status(frame, "first message"))
            .expect("draw");
        terminal
            .draw(|frame| draw_status(frame, "second"))
            .expect("draw");
        let rows = buffer_rows(&terminal);
        assert!(rows.iter().any(|row| row.contains("second")));
        assert!(!rows.iter().any(|row| row.contains("first message")));
    }

    #[test]
    fn circle_is_symmetric() {
        let rows = circle_rows(5);
        assert_eq!(rows.len(), 11);
        let mut reversed = rows.clone();
        reversed.reverse();
        assert_eq!(rows, reversed, "top-bottom symmetric");
        for row in &rows {
            let mirrored: String = row.chars().rev().collect();
            assert_eq!(row, &mirrored, "left-right symmetric");
        }
        // Widest at the equator.
        let widths: Vec<usize> = rows
            .iter()
            .map(|row| row.matches('█').count())
            .collect();
        assert_eq!(widths.iter().max(), Some(&widths[5]));
    }

    #[test]
    fn recording_screen_shows_the_circle() {
        let rows = render(draw_recording);
        assert!(rows.iter().any(|row| row.contains('█')));
    }

    #[test]
    fn bar_segments_decay_from_the_center() {
        assert_eq!(bar_segments(1.0), [96, 98, 100, 98, 96]);
        assert_eq!(bar_segments(0.1), [6, 8, 10, 8, 6]);
        assert_eq!(bar_segments(0.0), [0, 0, 0, 0, 0]);
    }

    #[test]
    fn negative_and_oversized_energy_are_clamped() {
        assert_eq!(bar_segments(-3.0), [0, 0, 0, 0, 0]);
        assert_eq!(bar_segments(5.0), bar_segments(1.0));
    }

    #[test]
    fn energy_rows_are_vertically_mirrored() {
        let rows = energy_rows(&bar_segments(0.8), 19);
        for (top, bottom) in rows.iter().zip(rows.iter().rev()) {
            assert_eq!(top.matches('█').count(), bottom.matches('█').count());
        }
    }

    #[test]
    fn silent_energy_draws_no_bars() {
        let rows = render(|frame| draw_energy(frame, 0.0));
        assert!(!rows.iter().any(|row| row.contains('█')));
    }

    #[test]
    fn loud_energy_draws_all_five_columns() {
        let rows = energy_rows(&bar_segments(1.0), 19);
        let center = &rows[9];
        assert_eq!(center.matches("██").count(), ENERGY_COLUMNS);
    }
}
