//! Transport: the STOPPED/PLAYING state machine and the row scheduler.
//!
//! Playback is driven cooperatively. The main loop pumps [`Transport::due_ticks`]
//! with wall-clock time and calls [`Transport::advance`] once per due tick;
//! tests call `advance` directly and never need real time to pass. `advance`
//! is the only thing that triggers or cuts voices during playback.

use std::time::Duration;

use log::{debug, info};

use super::track::Track;
use crate::audio::AudioBackend;
use crate::error::{Result, SeqError};
use crate::notes::Note;
use crate::shared::{DEFAULT_PATTERN_LEN, ROWS_PER_BEAT};

// A stalled main loop catches up at most this many rows; the rest are dropped.
const MAX_CATCH_UP: u32 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
}

/// Read-only notifications for whoever draws the playhead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    RowAdvanced(usize),
    PlayheadReset,
}

pub fn tick_interval_ms(tempo_bpm: f64) -> f64 {
    60_000.0 / tempo_bpm / ROWS_PER_BEAT
}

/// Periodic driver. Behaves like an interval timer: the first tick is due one
/// full interval after it starts.
#[derive(Clone, Debug)]
pub struct Clock {
    interval: Duration,
    elapsed: Duration,
}

impl Clock {
    pub fn new(tempo_bpm: f64) -> Self {
        // absurd tempos still get a usable interval: never zero, never overflowing
        let interval = Duration::try_from_secs_f64(tick_interval_ms(tempo_bpm) / 1000.0)
            .unwrap_or(Duration::MAX)
            .max(Duration::from_nanos(1));
        Self { interval, elapsed: Duration::ZERO }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn due(&mut self, dt: Duration) -> u32 {
        let elapsed = self.elapsed.saturating_add(dt).as_nanos();
        let interval = self.interval.as_nanos();
        self.elapsed = Duration::from_nanos((elapsed % interval) as u64);
        let ticks = elapsed / interval;
        if ticks > MAX_CATCH_UP as u128 {
            debug!("clock fell behind, dropping {} rows", ticks - MAX_CATCH_UP as u128);
            return MAX_CATCH_UP;
        }
        ticks as u32
    }
}

pub struct Transport {
    state: TransportState,
    tempo_bpm: f64,
    current_row: usize,
    clock: Option<Clock>,
    events: Vec<TransportEvent>,
}

impl Transport {
    pub fn new(tempo_bpm: f64) -> Self {
        Self {
            state: TransportState::Stopped,
            tempo_bpm,
            current_row: 0,
            clock: None,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn tempo(&self) -> f64 {
        self.tempo_bpm
    }

    pub fn current_row(&self) -> usize {
        self.current_row
    }

    pub fn tick_interval(&self) -> Duration {
        Clock::new(self.tempo_bpm).interval()
    }

    /// Stopped -> Playing. The caller makes sure the audio output is running.
    pub fn play(&mut self) {
        if self.is_playing() {
            return;
        }
        self.state = TransportState::Playing;
        self.clock = Some(Clock::new(self.tempo_bpm));
        info!("play from row {} at {} bpm", self.current_row, self.tempo_bpm);
    }

    /// Playing -> Stopped: silences every track and rewinds to row 0.
    pub fn stop(&mut self, tracks: &mut [Track], backend: &mut AudioBackend) {
        if !self.is_playing() {
            return;
        }
        self.state = TransportState::Stopped;
        self.clock = None;
        for track in tracks.iter_mut() {
            track.cut(backend);
        }
        self.current_row = 0;
        self.events.push(TransportEvent::PlayheadReset);
        info!("stop");
    }

    pub fn toggle_play(&mut self, tracks: &mut [Track], backend: &mut AudioBackend) {
        match self.state {
            TransportState::Playing => self.stop(tracks, backend),
            TransportState::Stopped => self.play(),
        }
    }

    /// While playing, the driver restarts at the new interval; the row position is kept.
    pub fn set_tempo(&mut self, bpm: f64) -> Result<()> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(SeqError::InvalidTempo(bpm));
        }
        self.tempo_bpm = bpm;
        if self.is_playing() {
            self.clock = Some(Clock::new(self.tempo_bpm));
        }
        debug!("tempo {} bpm", self.tempo_bpm);
        Ok(())
    }

    /// Number of rows due after `dt` of wall time. Zero while stopped.
    pub fn due_ticks(&mut self, dt: Duration) -> u32 {
        match (&self.state, self.clock.as_mut()) {
            (TransportState::Playing, Some(clock)) => clock.due(dt),
            _ => 0,
        }
    }

    /// Play one row on every track and move the playhead.
    pub fn advance(&mut self, tracks: &mut [Track], backend: &mut AudioBackend) {
        backend.reap();
        let any_solo = tracks.iter().any(|t| t.solo);

        for track in tracks.iter_mut() {
            let Some(row) = track.pattern.row_at(self.current_row).copied() else {
                continue;
            };
            match row.note {
                Note::Rest => {}
                Note::Cut => track.cut(backend),
                Note::Pitch { .. } => {
                    // reset monophony even when muted so no voice is left behind
                    track.cut(backend);
                    if track.is_audible(any_solo) {
                        track.trigger(row.note, row.volume, backend);
                    }
                }
            }
        }

        self.events.push(TransportEvent::RowAdvanced(self.current_row));

        let max_len = tracks
            .iter()
            .map(|t| t.pattern.len())
            .max()
            .filter(|&len| len > 0)
            .unwrap_or(DEFAULT_PATTERN_LEN);
        self.current_row = (self.current_row + 1) % max_len;
    }

    pub fn drain_events(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut self.events)
    }

    // Import replaces the project wholesale; playback restarts from the top.
    pub fn reset(&mut self, tempo_bpm: f64) {
        self.state = TransportState::Stopped;
        self.clock = None;
        self.current_row = 0;
        self.tempo_bpm = tempo_bpm;
        self.events.push(TransportEvent::PlayheadReset);
    }
}
