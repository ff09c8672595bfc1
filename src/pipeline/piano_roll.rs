// Piano-roll editing on top of one track's pattern.
//
// Lanes are pitches, lowest first: lane 0 is MIDI 24 (C-1), lane 83 is MIDI 107
// (B-7). A click on (row, lane) either clears the row (same pitch already there)
// or writes that pitch and plays a short preview. Only one preview may sound.

use std::time::Duration;

use log::trace;

use super::pattern::{CellValue, Volume};
use super::track::Track;
use crate::audio::{AudioBackend, VoiceHandle};
use crate::error::{Result, SeqError};
use crate::notes::Note;
use crate::shared::{
    PIANO_ROLL_LANES, PIANO_ROLL_LOWEST_MIDI, PIANO_ROLL_SET_VOLUME, PREVIEW_TIMEOUT,
    PREVIEW_VOLUME, TrackId,
};

pub fn lane_of(note: Note) -> Option<usize> {
    let midi = note.midi()?;
    let lane = midi.checked_sub(PIANO_ROLL_LOWEST_MIDI)? as usize;
    (lane < PIANO_ROLL_LANES).then_some(lane)
}

pub fn note_of(lane: usize) -> Option<Note> {
    if lane >= PIANO_ROLL_LANES {
        return None;
    }
    Note::from_midi(PIANO_ROLL_LOWEST_MIDI + lane as u8)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClickOutcome {
    Cleared,
    Set(Note),
}

#[derive(Debug)]
struct Preview {
    voice: VoiceHandle,
    remaining: Duration,
}

#[derive(Debug, Default)]
pub struct PianoRoll {
    track: Option<TrackId>,
    preview: Option<Preview>,
}

impl PianoRoll {
    pub fn track(&self) -> Option<TrackId> {
        self.track
    }

    pub fn is_open(&self) -> bool {
        self.track.is_some()
    }

    pub fn open(&mut self, track: TrackId, backend: &mut AudioBackend) {
        self.stop_preview(backend);
        self.track = Some(track);
    }

    pub fn close(&mut self, backend: &mut AudioBackend) {
        self.stop_preview(backend);
        self.track = None;
    }

    pub fn preview_voice(&self) -> Option<VoiceHandle> {
        self.preview.as_ref().map(|p| p.voice)
    }

    pub fn click(
        &mut self,
        track: &mut Track,
        row: usize,
        lane: usize,
        backend: &mut AudioBackend,
    ) -> Result<ClickOutcome> {
        let note = note_of(lane).ok_or_else(|| SeqError::InvalidPitch(format!("lane {lane}")))?;
        let current = track
            .pattern
            .get(row)
            .ok_or(SeqError::RowOutOfRange { row, len: track.pattern.len() })?
            .note;

        self.stop_preview(backend);

        if current == note {
            track.set_cell_value(row, CellValue::Note(Note::Rest))?;
            track.set_cell_value(row, CellValue::Volume(None))?;
            return Ok(ClickOutcome::Cleared);
        }

        track.set_cell_value(row, CellValue::Note(note))?;
        track.set_cell_value(row, CellValue::Volume(Volume::new(PIANO_ROLL_SET_VOLUME)))?;
        self.preview = backend
            .trigger_voice(note, track.waveform, Volume::new(PREVIEW_VOLUME), track.bus())
            .map(|voice| Preview { voice, remaining: PREVIEW_TIMEOUT });
        Ok(ClickOutcome::Set(note))
    }

    /// Count down the preview and cut it when its time is up.
    pub fn tick(&mut self, dt: Duration, backend: &mut AudioBackend) {
        let expired = match self.preview.as_mut() {
            Some(preview) => {
                preview.remaining = preview.remaining.saturating_sub(dt);
                preview.remaining.is_zero()
            }
            None => false,
        };
        if expired {
            self.stop_preview(backend);
        }
    }

    pub fn stop_preview(&mut self, backend: &mut AudioBackend) {
        if let Some(preview) = self.preview.take() {
            if let Err(e) = backend.cut_voice(preview.voice) {
                trace!("preview: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::OfflineSink;
    use crate::pipeline::pattern::Column;
    use crate::pipeline::track::palette_color;

    fn setup() -> (AudioBackend, Track, PianoRoll) {
        let mut backend = AudioBackend::new(Box::new(OfflineSink::new(44_100)));
        backend.ensure_running().unwrap();
        let track = Track::new(TrackId(0), palette_color(0), &mut backend);
        let mut roll = PianoRoll::default();
        roll.open(track.id, &mut backend);
        (backend, track, roll)
    }

    #[test]
    fn lane_mapping_round_trips_over_the_range() {
        assert_eq!(note_of(0).unwrap().to_string(), "C-1");
        assert_eq!(note_of(PIANO_ROLL_LANES - 1).unwrap().to_string(), "B-7");
        assert_eq!(note_of(PIANO_ROLL_LANES), None);
        for lane in 0..PIANO_ROLL_LANES {
            assert_eq!(lane_of(note_of(lane).unwrap()), Some(lane));
        }
    }

    #[test]
    fn out_of_range_pitches_have_no_lane() {
        assert_eq!(lane_of(Note::parse("B-0").unwrap()), None);
        assert_eq!(lane_of(Note::parse("C-8").unwrap()), None);
        assert_eq!(lane_of(Note::Rest), None);
        assert_eq!(lane_of(Note::Cut), None);
    }

    #[test]
    fn clicking_the_same_cell_twice_returns_to_rest() {
        let (mut backend, mut track, mut roll) = setup();
        let lane = lane_of(Note::parse("C-4").unwrap()).unwrap();

        let first = roll.click(&mut track, 5, lane, &mut backend).unwrap();
        assert_eq!(first, ClickOutcome::Set(Note::parse("C-4").unwrap()));
        assert_eq!(track.pattern.rows()[5].cell_text(Column::Volume), "64");

        let second = roll.click(&mut track, 5, lane, &mut backend).unwrap();
        assert_eq!(second, ClickOutcome::Cleared);
        assert_eq!(track.pattern.rows()[5].note, Note::Rest);
        assert_eq!(track.pattern.rows()[5].volume, None);
    }

    #[test]
    fn clicking_another_pitch_replaces_the_note() {
        let (mut backend, mut track, mut roll) = setup();
        roll.click(&mut track, 0, 10, &mut backend).unwrap();
        roll.click(&mut track, 0, 11, &mut backend).unwrap();
        assert_eq!(Some(track.pattern.rows()[0].note), note_of(11));
    }

    #[test]
    fn only_one_preview_sounds_at_a_time() {
        let (mut backend, mut track, mut roll) = setup();
        roll.click(&mut track, 0, 30, &mut backend).unwrap();
        let first = roll.preview_voice().unwrap();
        roll.click(&mut track, 1, 31, &mut backend).unwrap();
        let second = roll.preview_voice().unwrap();
        assert!(!backend.is_live(first));
        assert!(backend.is_live(second));
        assert_eq!(backend.live_voices(), 1);
    }

    #[test]
    fn preview_is_cut_after_its_timeout() {
        let (mut backend, mut track, mut roll) = setup();
        roll.click(&mut track, 0, 30, &mut backend).unwrap();
        let voice = roll.preview_voice().unwrap();
        roll.tick(PREVIEW_TIMEOUT - Duration::from_millis(1), &mut backend);
        assert!(backend.is_live(voice));
        roll.tick(Duration::from_millis(1), &mut backend);
        assert_eq!(roll.preview_voice(), None);
        assert!(!backend.is_live(voice));
    }

    #[test]
    fn close_cuts_the_preview() {
        let (mut backend, mut track, mut roll) = setup();
        roll.click(&mut track, 0, 30, &mut backend).unwrap();
        roll.close(&mut backend);
        assert!(!roll.is_open());
        assert_eq!(backend.live_voices(), 0);
    }

    #[test]
    fn click_outside_the_grid_is_rejected() {
        let (mut backend, mut track, mut roll) = setup();
        assert!(roll.click(&mut track, 64, 0, &mut backend).is_err());
        assert!(roll.click(&mut track, 0, PIANO_ROLL_LANES, &mut backend).is_err());
        assert_eq!(backend.live_voices(), 0);
    }
}
