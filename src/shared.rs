// Types and constants shared between the TUI, the middle layer and the engine.
//
// The TUI never touches tracks or the transport directly: it turns key presses
// into `Command`s, hands them to `Middle::handle_input`, and once per frame
// draws whatever `Middle::display_state()` returns.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio_api::Waveform;
use crate::pipeline::pattern::{Column, Row};

pub const DEFAULT_PATTERN_LEN: usize = 64;
pub const DEFAULT_TEMPO_BPM: f64 = 130.0;
pub const ROWS_PER_BEAT: f64 = 4.0; // sixteenth notes

pub const TRACK_PALETTE: [&str; 6] = [
    "#ff9900", "#00ccff", "#ff3366", "#66ff66", "#cc66ff", "#ffcc00",
];

// Voice envelope
pub const VOICE_ATTACK: Duration = Duration::from_millis(5);
pub const VOICE_DURATION: Duration = Duration::from_millis(500);
pub const VOICE_RELEASE: Duration = Duration::from_millis(100);
pub const VOICE_LEVEL: f32 = 0.25;
pub const MASTER_GAIN: f32 = 0.5;

// Piano roll
pub const PIANO_ROLL_LOWEST_MIDI: u8 = 24; // C-1
pub const PIANO_ROLL_LANES: usize = 84; // 7 octaves
pub const PIANO_ROLL_SET_VOLUME: u8 = 0x64;
pub const PREVIEW_VOLUME: u8 = 0x40;
pub const PREVIEW_TIMEOUT: Duration = Duration::from_millis(400);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u32);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

// The control surface. Input bindings resolve to these; nothing else mutates state.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Play,
    Stop,
    TogglePlay,
    SetTempo(f64),
    NudgeTempo(f64),

    AddTrack,
    RemoveTrack(TrackId),
    ToggleMute(TrackId),
    ToggleSolo(TrackId),
    CycleWaveform(TrackId),
    AdjustGain(TrackId, f32),
    AppendRow(TrackId),

    SetCell {
        track: TrackId,
        row: usize,
        column: Column,
        value: String,
    },

    OpenPianoRoll(TrackId),
    ClosePianoRoll,
    PianoRollClick { row: usize, lane: usize },

    Save,
    Reload,
    Quit,
}

#[derive(Clone, Debug)]
pub struct TrackView {
    pub id: TrackId,
    pub color: String,
    pub waveform: Waveform,
    pub gain: f32,
    pub mute: bool,
    pub solo: bool,
    pub audible: bool,
    pub sounding: bool,
    pub rows: Vec<Row>,
    pub level: f32, // latest peak from the bus analysis tap
}

#[derive(Clone, Debug)]
pub struct DisplayState {
    pub playing: bool,
    pub current_row: usize, // row the next tick will play
    pub last_row: Option<usize>, // row the previous tick played, for the playhead
    pub tempo_bpm: f64,
    pub output_ready: bool,
    pub live_voices: usize,
    pub tracks: Vec<TrackView>,
    pub piano_roll: Option<TrackId>,
    pub status: String,
}
