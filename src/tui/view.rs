use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};

use super::mode::TuiState;
use crate::pipeline::pattern::Column;
use crate::notes::Note;
use crate::pipeline::piano_roll::{lane_of, note_of};
use crate::shared::{DisplayState, TrackView};

const ROLL_WINDOW: usize = 24; // lanes shown at once
const METER_WIDTH: usize = 6;

pub fn render(frame: &mut Frame, area: Rect, state: &DisplayState, ts: &TuiState) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // transport + status
            Constraint::Min(8),    // grid or piano roll
            Constraint::Length(1), // key help
        ])
        .split(area);

    draw_header(frame, sections[0], state);
    match state.piano_roll.and_then(|id| state.tracks.iter().find(|t| t.id == id)) {
        Some(track) => draw_piano_roll(frame, sections[1], track, state, ts),
        None => draw_grid(frame, sections[1], state, ts),
    }
    draw_help(frame, sections[2], state.piano_roll.is_some());
}

// "#rrggbb" from the palette; anything else falls back to white
fn hex_color(hex: &str) -> Color {
    let parse = |i: usize| hex.get(i..i + 2).and_then(|s| u8::from_str_radix(s, 16).ok());
    match (hex.strip_prefix('#').map(str::len), parse(1), parse(3), parse(5)) {
        (Some(6), Some(r), Some(g), Some(b)) => Color::Rgb(r, g, b),
        _ => Color::White,
    }
}

fn meter(level: f32) -> String {
    let filled = ((level * 2.0).clamp(0.0, 1.0) * METER_WIDTH as f32).round() as usize;
    format!("{}{}", "▮".repeat(filled), "·".repeat(METER_WIDTH - filled))
}

fn draw_header(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let play = if state.playing {
        Span::styled("▶ PLAY", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
    } else {
        Span::styled("■ STOP", Style::default().fg(Color::DarkGray))
    };
    let output = if state.output_ready { "audio on" } else { "audio off" };
    let line = Line::from(vec![
        play,
        Span::raw(format!(
            "  {:.1} bpm  row {:02X}  {output} ({} voices)  ",
            state.tempo_bpm, state.current_row, state.live_voices
        )),
        Span::styled(state.status.clone(), Style::default().fg(Color::Yellow)),
    ]);
    let block = Block::default().borders(Borders::ALL).title(" rowseq ");
    frame.render_widget(Paragraph::new(line).block(block), area);
}

// scroll so the cursor stays in the middle of the view
fn visible_rows(total: usize, cursor: usize, height: usize) -> std::ops::Range<usize> {
    let start = cursor.saturating_sub(height / 2).min(total.saturating_sub(height));
    start..(start + height).min(total)
}

fn track_header(track: &TrackView) -> Vec<Span<'static>> {
    let flags = format!(
        "{}{}",
        if track.mute { "M" } else { "-" },
        if track.solo { "S" } else { "-" }
    );
    let mut style = Style::default().fg(hex_color(&track.color));
    if !track.audible {
        style = style.add_modifier(Modifier::DIM);
    }
    vec![
        Span::styled(format!("{} {} {flags} ", track.id, track.waveform.label()), style),
        Span::styled(meter(track.level), style),
        Span::raw(" │"),
    ]
}

fn draw_grid(frame: &mut Frame, area: Rect, state: &DisplayState, ts: &TuiState) {
    let height = area.height.saturating_sub(3) as usize;
    let total = state.tracks.iter().map(|t| t.rows.len()).max().unwrap_or(0);

    let mut header = vec![Span::raw("   │")];
    for track in &state.tracks {
        header.extend(track_header(track));
    }
    let mut lines = vec![Line::from(header)];

    for row in visible_rows(total, ts.cursor_row, height) {
        let playhead = state.last_row == Some(row);
        let row_style = if playhead {
            Style::default().bg(Color::DarkGray)
        } else if row % 4 == 0 {
            Style::default().fg(Color::Gray)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let mut spans = vec![Span::styled(format!("{row:02X} │"), row_style)];

        for (t, track) in state.tracks.iter().enumerate() {
            let Some(cells) = track.rows.get(row) else {
                spans.push(Span::raw(" ".repeat(17) + "│"));
                continue;
            };
            // shorter patterns loop, so each track has its own playhead row
            let playhead = state.last_row.map(|r| r % track.rows.len()) == Some(row);
            for column in Column::ALL {
                let selected = t == ts.cursor_track && row == ts.cursor_row && column == ts.cursor_column;
                let text = match (&ts.edit, selected) {
                    (Some(buf), true) => format!("{buf:_<width$}", width = column.width()),
                    _ => cells.cell_text(column),
                };
                let style = if selected {
                    Style::default().add_modifier(Modifier::REVERSED)
                } else if playhead {
                    Style::default().fg(hex_color(&track.color)).bg(Color::DarkGray)
                } else {
                    row_style
                };
                spans.push(Span::raw(" "));
                spans.push(Span::styled(text, style));
            }
            spans.push(Span::styled("   │", row_style));
        }
        lines.push(Line::from(spans));
    }

    let block = Block::default().borders(Borders::ALL).title(" pattern ");
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_piano_roll(frame: &mut Frame, area: Rect, track: &TrackView, state: &DisplayState, ts: &TuiState) {
    let height = area.height.saturating_sub(3) as usize;
    let first_lane = ts.lane.saturating_sub(ROLL_WINDOW / 2);
    let lanes: Vec<usize> = (first_lane..first_lane + ROLL_WINDOW)
        .filter(|&l| note_of(l).is_some())
        .collect();
    let color = hex_color(&track.color);

    let mut header = vec![Span::raw("   │")];
    for &lane in &lanes {
        let label = note_of(lane).map(|n| n.to_string()).unwrap_or_default();
        // only name the Cs, everything else is a column marker
        let text = if label.starts_with("C-") { label[2..].to_string() } else { " ".into() };
        let style = if lane == ts.lane {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        };
        header.push(Span::styled(format!("{text:<2}"), style));
    }
    let mut lines = vec![Line::from(header)];

    for row in visible_rows(track.rows.len(), ts.cursor_row, height) {
        let playhead = state.last_row.is_some_and(|r| r % track.rows.len().max(1) == row);
        let note_lane = lane_of(track.rows[row].note);
        let mut spans = vec![Span::raw(format!("{row:02X} │"))];
        for &lane in &lanes {
            let cursor = row == ts.cursor_row && lane == ts.lane;
            let (text, mut style) = match note_lane {
                Some(l) if l == lane => ("██", Style::default().fg(color)),
                _ if matches!(note_of(lane), Some(Note::Pitch { class, .. }) if class.is_sharp()) => {
                    ("··", Style::default().fg(Color::DarkGray))
                }
                _ => ("  ", Style::default()),
            };
            if playhead {
                style = style.bg(Color::DarkGray);
            }
            if cursor {
                style = style.add_modifier(Modifier::REVERSED);
            }
            spans.push(Span::styled(text, style));
        }
        lines.push(Line::from(spans));
    }

    let title = format!(" piano roll: track {} ", track.id);
    let block = Block::default().borders(Borders::ALL).title(title);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_help(frame: &mut Frame, area: Rect, roll_open: bool) {
    let text = if roll_open {
        "←→ lane  <> octave  ↑↓ row  ⏎ set/clear  space play  p/esc close"
    } else {
        "↑↓ row  ←→ track  tab column  ⏎ edit  del clear  space play  +- tempo  a add  x remove  m mute  s solo  w wave  r row  p roll  [] gain  S save  L reload  q quit"
    };
    frame.render_widget(Paragraph::new(Span::styled(text, Style::default().fg(Color::DarkGray))), area);
}
