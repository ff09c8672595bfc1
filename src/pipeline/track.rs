use log::{debug, trace};

use super::pattern::{CellValue, Column, Pattern, Volume};
use crate::audio::{AudioBackend, VoiceHandle};
use crate::audio_api::{BusId, Waveform};
use crate::error::Result;
use crate::notes::Note;
use crate::shared::{TRACK_PALETTE, TrackId};

/// One column of the rack: a pattern, the bus it plays into, and at most one
/// sounding voice. Tracks are monophonic; a new note cuts the previous one.
#[derive(Debug)]
pub struct Track {
    pub id: TrackId,
    pub color: String,
    pub waveform: Waveform,
    pub pattern: Pattern,
    pub mute: bool,
    pub solo: bool,
    gain: f32,
    bus: BusId,
    voice: Option<VoiceHandle>,
}

pub fn palette_color(index: usize) -> &'static str {
    TRACK_PALETTE[index % TRACK_PALETTE.len()]
}

impl Track {
    pub fn new(id: TrackId, color: impl Into<String>, backend: &mut AudioBackend) -> Self {
        Self::with_pattern(id, color, Waveform::default(), Pattern::default(), backend)
    }

    pub fn with_pattern(
        id: TrackId,
        color: impl Into<String>,
        waveform: Waveform,
        pattern: Pattern,
        backend: &mut AudioBackend,
    ) -> Self {
        Self {
            id,
            color: color.into(),
            waveform,
            pattern,
            mute: false,
            solo: false,
            gain: 1.0,
            bus: backend.create_track_bus(),
            voice: None,
        }
    }

    pub fn bus(&self) -> BusId {
        self.bus
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32, backend: &mut AudioBackend) {
        self.gain = gain.clamp(0.0, 1.0);
        backend.set_bus_gain(self.bus, self.gain);
    }

    pub fn current_voice(&self) -> Option<VoiceHandle> {
        self.voice
    }

    pub fn is_sounding(&self, backend: &AudioBackend) -> bool {
        self.current_voice().is_some_and(|v| backend.is_live(v))
    }

    pub fn append_row(&mut self) -> usize {
        self.pattern.append_row()
    }

    /// Text edit from the grid. The prior value stays if `text` is not valid
    /// for `column`.
    pub fn set_cell(&mut self, row: usize, column: Column, text: &str) -> Result<()> {
        let value = CellValue::parse(column, text)?;
        self.set_cell_value(row, value)
    }

    pub fn set_cell_value(&mut self, row: usize, value: CellValue) -> Result<()> {
        self.pattern.set(row, value)
    }

    /// Whether this track may trigger, given whether any track in the project is soloed.
    pub fn is_audible(&self, any_solo_active: bool) -> bool {
        !(self.mute || (any_solo_active && !self.solo))
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.mute = !self.mute;
        self.mute
    }

    pub fn toggle_solo(&mut self) -> bool {
        self.solo = !self.solo;
        self.solo
    }

    pub fn cycle_waveform(&mut self) -> Waveform {
        self.waveform = self.waveform.next();
        self.waveform
    }

    /// Cut whatever is sounding. A voice that already ran out is not an error here.
    pub fn cut(&mut self, backend: &mut AudioBackend) {
        if let Some(handle) = self.voice.take() {
            if let Err(e) = backend.cut_voice(handle) {
                trace!("track {}: {e}", self.id);
            }
        }
    }

    // Last-note priority: whatever was sounding is cut first.
    pub fn trigger(&mut self, note: Note, volume: Option<Volume>, backend: &mut AudioBackend) {
        self.cut(backend);
        self.voice = backend.trigger_voice(note, self.waveform, volume, self.bus);
    }

    /// Silence and detach from the engine; the track must not be used afterwards.
    pub fn teardown(&mut self, backend: &mut AudioBackend) {
        self.cut(backend);
        backend.remove_bus(self.bus);
        debug!("track {} torn down", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::OfflineSink;
    use crate::error::SeqError;

    fn setup() -> (AudioBackend, Track) {
        let mut backend = AudioBackend::new(Box::new(OfflineSink::new(1000)));
        backend.ensure_running().unwrap();
        let track = Track::new(TrackId(0), palette_color(0), &mut backend);
        (backend, track)
    }

    #[test]
    fn set_cell_validates_and_keeps_prior_value() {
        let (_backend, mut track) = setup();
        track.set_cell(3, Column::Note, "D-2").unwrap();
        let err = track.set_cell(3, Column::Note, "nope").unwrap_err();
        assert!(matches!(err, SeqError::InvalidCellValue { column: Column::Note, .. }));
        assert_eq!(track.pattern.rows()[3].note.to_string(), "D-2");

        track.set_cell(3, Column::Volume, "20").unwrap();
        assert!(track.set_cell(3, Column::Volume, "A0").is_err());
        assert_eq!(track.pattern.rows()[3].cell_text(Column::Volume), "20");
    }

    #[test]
    fn set_cell_past_the_end_is_rejected() {
        let (_backend, mut track) = setup();
        assert_eq!(
            track.set_cell(64, Column::Note, "C-4"),
            Err(SeqError::RowOutOfRange { row: 64, len: 64 })
        );
        track.append_row();
        track.set_cell(64, Column::Note, "C-4").unwrap();
    }

    #[test]
    fn audibility_follows_mute_and_solo() {
        let (_backend, mut track) = setup();
        assert!(track.is_audible(false));
        assert!(!track.is_audible(true));
        track.toggle_solo();
        assert!(track.is_audible(true));
        track.toggle_mute();
        // soloed but muted: still silent
        assert!(!track.is_audible(true));
        assert!(!track.is_audible(false));
    }

    #[test]
    fn new_note_cuts_the_previous_voice() {
        let (mut backend, mut track) = setup();
        track.trigger(Note::parse("C-4").unwrap(), None, &mut backend);
        let first = track.current_voice().unwrap();
        track.trigger(Note::parse("E-4").unwrap(), None, &mut backend);
        let second = track.current_voice().unwrap();
        assert_ne!(first, second);
        assert!(!backend.is_live(first));
        assert!(backend.is_live(second));
        assert_eq!(backend.live_voices(), 1);
    }

    #[test]
    fn teardown_cuts_the_voice() {
        let (mut backend, mut track) = setup();
        track.trigger(Note::parse("C-4").unwrap(), None, &mut backend);
        track.teardown(&mut backend);
        assert_eq!(track.current_voice(), None);
        assert_eq!(backend.live_voices(), 0);
    }

    #[test]
    fn palette_cycles() {
        assert_eq!(palette_color(0), palette_color(TRACK_PALETTE.len()));
        assert_ne!(palette_color(0), palette_color(1));
    }
}
