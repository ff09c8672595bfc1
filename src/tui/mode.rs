use crate::pipeline::pattern::Column;
use crate::shared::{DisplayState, PIANO_ROLL_LANES, TrackId};

// state local to the tui: where the cursor is and what is being typed.
// track ids, row counts and the open piano roll are synced from DisplayState per loop
#[derive(Clone, Debug)]
pub struct TuiState {
    pub cursor_track: usize, // index into the synced track list
    pub cursor_row: usize,
    pub cursor_column: Column,
    pub edit: Option<String>, // cell text being typed, committed at full width or on Enter
    pub lane: usize,          // piano roll cursor, lowest pitch = 0
    // synced from DisplayState each frame
    pub playing: bool,
    pub piano_roll: Option<TrackId>,
    pub track_ids: Vec<TrackId>,
    pub row_counts: Vec<usize>,
}

impl Default for TuiState {
    fn default() -> Self {
        Self {
            cursor_track: 0,
            cursor_row: 0,
            cursor_column: Column::Note,
            edit: None,
            lane: 36, // C-4
            playing: false,
            piano_roll: None,
            track_ids: Vec::new(),
            row_counts: Vec::new(),
        }
    }
}

impl TuiState {
    pub fn sync(&mut self, ds: &DisplayState) {
        self.playing = ds.playing;
        self.piano_roll = ds.piano_roll;
        self.track_ids = ds.tracks.iter().map(|t| t.id).collect();
        self.row_counts = ds.tracks.iter().map(|t| t.rows.len()).collect();
        self.clamp();
    }

    // keep the cursor on something that exists after tracks or rows change
    fn clamp(&mut self) {
        self.cursor_track = self.cursor_track.min(self.track_ids.len().saturating_sub(1));
        let rows = self.row_count();
        self.cursor_row = self.cursor_row.min(rows.saturating_sub(1));
        self.lane = self.lane.min(PIANO_ROLL_LANES - 1);
    }

    pub fn current_track(&self) -> Option<TrackId> {
        // the roll edits its own track regardless of the grid cursor
        self.piano_roll.or_else(|| self.track_ids.get(self.cursor_track).copied())
    }

    pub fn row_count(&self) -> usize {
        let idx = match self.piano_roll {
            Some(id) => self.track_ids.iter().position(|&t| t == id),
            None => Some(self.cursor_track),
        };
        idx.and_then(|i| self.row_counts.get(i).copied()).unwrap_or(0)
    }

    pub fn move_row(&mut self, delta: isize) {
        let rows = self.row_count();
        if rows == 0 {
            return;
        }
        self.cursor_row = (self.cursor_row as isize + delta).rem_euclid(rows as isize) as usize;
    }

    pub fn move_track(&mut self, delta: isize) {
        let n = self.track_ids.len();
        if n == 0 {
            return;
        }
        self.cursor_track = (self.cursor_track as isize + delta).rem_euclid(n as isize) as usize;
        self.edit = None;
        self.clamp();
    }

    pub fn move_lane(&mut self, delta: isize) {
        self.lane = (self.lane as isize + delta).clamp(0, PIANO_ROLL_LANES as isize - 1) as usize;
    }
}
