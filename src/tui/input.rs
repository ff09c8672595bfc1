use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};

use super::mode::TuiState;
use crate::pipeline::pattern::Column;
use crate::shared::Command;

const TEMPO_STEP: f64 = 1.0;
const GAIN_STEP: f32 = 0.05;

// poll for input from the terminal, move the cursor in tuistate,
// and resolve keys into commands for the middle layer
pub fn poll_input(timeout: Duration, ts: &mut TuiState) -> anyhow::Result<Vec<Command>> {
    if !event::poll(timeout)? {
        return Ok(vec![]);
    }

    if let Event::Key(key) = event::read()? {
        if key.kind != KeyEventKind::Press {
            return Ok(vec![]);
        }
        return Ok(handle_key(key.code, ts));
    }
    Ok(vec![])
}

pub fn handle_key(code: KeyCode, ts: &mut TuiState) -> Vec<Command> {
    if ts.edit.is_some() {
        return handle_edit_key(code, ts);
    }
    if ts.piano_roll.is_some() {
        if let Some(cmds) = handle_roll_key(code, ts) {
            return cmds;
        }
    }

    let track = ts.current_track();
    match code {
        KeyCode::Esc | KeyCode::Char('q') => vec![Command::Quit],
        KeyCode::Char(' ') => vec![Command::TogglePlay],

        // cursor
        KeyCode::Up => { ts.move_row(-1); vec![] }
        KeyCode::Down => { ts.move_row(1); vec![] }
        KeyCode::PageUp => { ts.move_row(-16); vec![] }
        KeyCode::PageDown => { ts.move_row(16); vec![] }
        KeyCode::Left => { ts.move_track(-1); vec![] }
        KeyCode::Right => { ts.move_track(1); vec![] }
        KeyCode::Tab => { ts.cursor_column = ts.cursor_column.next(); vec![] }

        // cell editing
        KeyCode::Enter => { ts.edit = Some(String::new()); vec![] }
        KeyCode::Backspace | KeyCode::Delete => match track {
            Some(track) => vec![Command::SetCell {
                track,
                row: ts.cursor_row,
                column: ts.cursor_column,
                value: "-".repeat(ts.cursor_column.width()),
            }],
            None => vec![],
        },

        KeyCode::Char('+') | KeyCode::Char('=') => vec![Command::NudgeTempo(TEMPO_STEP)],
        KeyCode::Char('-') => vec![Command::NudgeTempo(-TEMPO_STEP)],
        KeyCode::Char('a') => vec![Command::AddTrack],
        KeyCode::Char('S') => vec![Command::Save],
        KeyCode::Char('L') => vec![Command::Reload],

        // per-track keys, no-ops with no tracks
        KeyCode::Char(c) => match (c, track) {
            ('x', Some(id)) => vec![Command::RemoveTrack(id)],
            ('m', Some(id)) => vec![Command::ToggleMute(id)],
            ('s', Some(id)) => vec![Command::ToggleSolo(id)],
            ('w', Some(id)) => vec![Command::CycleWaveform(id)],
            ('r', Some(id)) => vec![Command::AppendRow(id)],
            ('p', Some(id)) => vec![Command::OpenPianoRoll(id)],
            ('[', Some(id)) => vec![Command::AdjustGain(id, -GAIN_STEP)],
            (']', Some(id)) => vec![Command::AdjustGain(id, GAIN_STEP)],
            _ => vec![],
        },
        _ => vec![],
    }
}

// typing into a cell: committed once the column's width is reached or on Enter
fn handle_edit_key(code: KeyCode, ts: &mut TuiState) -> Vec<Command> {
    let Some(buf) = ts.edit.as_mut() else {
        return vec![];
    };
    match code {
        KeyCode::Esc => {
            ts.edit = None;
            vec![]
        }
        KeyCode::Backspace => {
            buf.pop();
            vec![]
        }
        KeyCode::Enter => commit_edit(ts),
        KeyCode::Char(c) if !c.is_whitespace() => {
            buf.push(c.to_ascii_uppercase());
            if buf.len() >= ts.cursor_column.width() {
                commit_edit(ts)
            } else {
                vec![]
            }
        }
        _ => vec![],
    }
}

fn commit_edit(ts: &mut TuiState) -> Vec<Command> {
    let (Some(value), Some(track)) = (ts.edit.take(), ts.current_track()) else {
        return vec![];
    };
    let cmd = Command::SetCell { track, row: ts.cursor_row, column: ts.cursor_column, value };
    ts.move_row(1);
    vec![cmd]
}

// keys that mean something else while the piano roll is open; None falls through
fn handle_roll_key(code: KeyCode, ts: &mut TuiState) -> Option<Vec<Command>> {
    let cmds = match code {
        KeyCode::Esc | KeyCode::Char('p') => vec![Command::ClosePianoRoll],
        KeyCode::Left => { ts.move_lane(-1); vec![] }
        KeyCode::Right => { ts.move_lane(1); vec![] }
        KeyCode::Char('<') => { ts.move_lane(-12); vec![] }
        KeyCode::Char('>') => { ts.move_lane(12); vec![] }
        KeyCode::Enter => vec![Command::PianoRollClick { row: ts.cursor_row, lane: ts.lane }],
        KeyCode::Tab | KeyCode::Backspace | KeyCode::Delete => vec![],
        _ => return None,
    };
    Some(cmds)
}
