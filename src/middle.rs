// The middle layer: owns the audio backend, the transport, the tracks and the
// piano roll. The TUI talks to it with Commands and reads DisplayState back;
// the main loop pumps tick() with the time elapsed since the previous frame.

use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info, warn};

use crate::audio::{AudioBackend, AudioSink, StereoFrame};
use crate::error::{Result, SeqError};
use crate::pipeline::persistence;
use crate::pipeline::piano_roll::{ClickOutcome, PianoRoll};
use crate::pipeline::project::{ProjectDocument, TrackSnapshot};
use crate::pipeline::track::{Track, palette_color};
use crate::pipeline::transport::{Transport, TransportEvent};
use crate::shared::{Command, DEFAULT_PATTERN_LEN, DisplayState, TrackId, TrackView};

pub struct Middle {
    backend: AudioBackend,
    transport: Transport,
    tracks: Vec<Track>,
    next_track_id: u32,
    piano_roll: PianoRoll,
    project_dir: Option<PathBuf>,
    last_row: Option<usize>,
    status: String,
}

impl Middle {
    /// A fresh project: default tempo and one empty track.
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        let doc = ProjectDocument::default();
        let mut middle = Self {
            backend: AudioBackend::new(sink),
            transport: Transport::new(doc.tempo_bpm),
            tracks: Vec::new(),
            next_track_id: 0,
            piano_roll: PianoRoll::default(),
            project_dir: None,
            last_row: None,
            status: String::new(),
        };
        middle.apply_document(doc);
        middle
    }

    pub fn set_project_dir(&mut self, dir: impl Into<PathBuf>) {
        self.project_dir = Some(dir.into());
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn backend(&self) -> &AudioBackend {
        &self.backend
    }

    pub fn piano_roll(&self) -> &PianoRoll {
        &self.piano_roll
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    fn index_of(&self, id: TrackId) -> Result<usize> {
        self.tracks
            .iter()
            .position(|t| t.id == id)
            .ok_or(SeqError::UnknownTrack(id))
    }

    fn track_mut(&mut self, id: TrackId) -> Result<&mut Track> {
        let idx = self.index_of(id)?;
        Ok(&mut self.tracks[idx])
    }

    // Length the global row counter wraps on.
    pub fn pattern_span(&self) -> usize {
        self.tracks
            .iter()
            .map(|t| t.pattern.len())
            .max()
            .filter(|&len| len > 0)
            .unwrap_or(DEFAULT_PATTERN_LEN)
    }

    /// Apply one control command. Failures are logged and shown in the status
    /// line; the caller may ignore the returned error.
    pub fn handle_input(&mut self, cmd: Command) -> Result<()> {
        debug!("command {cmd:?}");
        let result = self.apply(cmd);
        if let Err(e) = &result {
            warn!("{e}");
            self.status = e.to_string();
        }
        result
    }

    fn apply(&mut self, cmd: Command) -> Result<()> {
        match cmd {
            Command::Play => self.play()?,
            Command::Stop => self.stop(),
            Command::TogglePlay => {
                if !self.transport.is_playing() {
                    self.backend.ensure_running()?;
                }
                self.transport.toggle_play(&mut self.tracks, &mut self.backend);
            }
            Command::SetTempo(bpm) => self.transport.set_tempo(bpm)?,
            Command::NudgeTempo(delta) => {
                let bpm = self.transport.tempo() + delta;
                self.transport.set_tempo(bpm)?;
            }

            Command::AddTrack => {
                let id = self.add_track()?;
                self.status = format!("added track {id}");
            }
            Command::RemoveTrack(id) => {
                self.remove_track(id)?;
                self.status = format!("removed track {id}");
            }
            Command::ToggleMute(id) => {
                self.track_mut(id)?.toggle_mute();
            }
            Command::ToggleSolo(id) => {
                self.track_mut(id)?.toggle_solo();
            }
            Command::CycleWaveform(id) => {
                let waveform = self.track_mut(id)?.cycle_waveform();
                self.status = format!("track {id}: {}", waveform.label());
            }
            Command::AdjustGain(id, delta) => {
                let idx = self.index_of(id)?;
                let track = &mut self.tracks[idx];
                let gain = track.gain() + delta;
                track.set_gain(gain, &mut self.backend);
            }
            Command::AppendRow(id) => {
                let row = self.track_mut(id)?.append_row();
                debug!("track {id}: appended row {row}");
            }
            Command::SetCell { track, row, column, value } => {
                self.track_mut(track)?.set_cell(row, column, &value)?;
            }

            Command::OpenPianoRoll(id) => {
                self.index_of(id)?;
                self.piano_roll.open(id, &mut self.backend);
            }
            Command::ClosePianoRoll => self.piano_roll.close(&mut self.backend),
            Command::PianoRollClick { row, lane } => {
                let Some(id) = self.piano_roll.track() else {
                    debug!("piano roll click with no roll open");
                    return Ok(());
                };
                let idx = self.index_of(id)?;
                // a click is a user gesture; the preview needs a running output
                if let Err(e) = self.backend.ensure_running() {
                    warn!("{e}");
                }
                let outcome = self.piano_roll.click(&mut self.tracks[idx], row, lane, &mut self.backend)?;
                self.status = match outcome {
                    ClickOutcome::Set(note) => format!("row {row:02X}: {note}"),
                    ClickOutcome::Cleared => format!("row {row:02X}: cleared"),
                };
            }

            Command::Save => self.save(),
            Command::Reload => self.reload()?,
            Command::Quit => {}
        }
        Ok(())
    }

    pub fn play(&mut self) -> Result<()> {
        self.backend.ensure_running()?;
        self.transport.play();
        Ok(())
    }

    pub fn stop(&mut self) {
        self.transport.stop(&mut self.tracks, &mut self.backend);
    }

    pub fn add_track(&mut self) -> Result<TrackId> {
        let id = TrackId(self.next_track_id);
        self.next_track_id = id.0.checked_add(1).ok_or(SeqError::TrackIdsExhausted)?;
        let track = Track::new(id, palette_color(id.0 as usize), &mut self.backend);
        self.tracks.push(track);
        info!("track {id} added");
        Ok(id)
    }

    // Synchronous: the voice is cut and the track is gone before the next tick.
    pub fn remove_track(&mut self, id: TrackId) -> Result<()> {
        let idx = self.index_of(id)?;
        if self.piano_roll.track() == Some(id) {
            self.piano_roll.close(&mut self.backend);
        }
        let mut track = self.tracks.remove(idx);
        track.teardown(&mut self.backend);
        Ok(())
    }

    /// Pump the driver with wall-clock time. Plays every row that came due.
    pub fn tick(&mut self, dt: Duration) {
        self.backend.reap();
        self.piano_roll.tick(dt, &mut self.backend);
        for _ in 0..self.transport.due_ticks(dt) {
            self.transport.advance(&mut self.tracks, &mut self.backend);
        }
        self.collect_events();
    }

    /// Play the current row right now, regardless of the clock.
    pub fn advance(&mut self) {
        self.transport.advance(&mut self.tracks, &mut self.backend);
        self.collect_events();
    }

    fn collect_events(&mut self) {
        for event in self.transport.drain_events() {
            self.last_row = match event {
                TransportEvent::RowAdvanced(row) => Some(row),
                TransportEvent::PlayheadReset => None,
            };
        }
    }

    // Offline sinks only.
    pub fn render(&mut self, out: &mut [StereoFrame]) -> Result<()> {
        self.backend.render(out)
    }

    pub fn display_state(&self) -> DisplayState {
        let any_solo = self.tracks.iter().any(|t| t.solo);
        DisplayState {
            playing: self.transport.is_playing(),
            current_row: self.transport.current_row(),
            last_row: self.last_row,
            tempo_bpm: self.transport.tempo(),
            output_ready: self.backend.is_running(),
            live_voices: self.backend.live_voices(),
            tracks: self
                .tracks
                .iter()
                .map(|t| TrackView {
                    id: t.id,
                    color: t.color.clone(),
                    waveform: t.waveform,
                    gain: t.gain(),
                    mute: t.mute,
                    solo: t.solo,
                    audible: t.is_audible(any_solo),
                    sounding: t.is_sounding(&self.backend),
                    rows: t.pattern.rows().to_vec(),
                    level: self.backend.level(t.bus()),
                })
                .collect(),
            piano_roll: self.piano_roll.track(),
            status: self.status.clone(),
        }
    }

    // ── Project I/O ───────────────────────────────────────────────

    pub fn export_project(&self) -> ProjectDocument {
        ProjectDocument {
            tempo_bpm: self.transport.tempo(),
            tracks: self
                .tracks
                .iter()
                .map(|t| TrackSnapshot {
                    id: t.id,
                    color: t.color.clone(),
                    waveform: t.waveform,
                    gain: t.gain(),
                    pattern: t.pattern.clone(),
                })
                .collect(),
        }
    }

    /// Replace the whole project. The document is fully validated before
    /// anything live is touched, so a bad one leaves the current state as is.
    pub fn import_project(&mut self, json: &str) -> Result<()> {
        let doc = ProjectDocument::from_json(json)?;
        self.apply_document(doc);
        Ok(())
    }

    pub fn load_document(&mut self, doc: ProjectDocument) -> Result<()> {
        doc.validate()?;
        self.apply_document(doc);
        Ok(())
    }

    fn apply_document(&mut self, doc: ProjectDocument) {
        self.piano_roll.close(&mut self.backend);
        for track in self.tracks.iter_mut() {
            track.teardown(&mut self.backend);
        }
        self.tracks.clear();

        for snapshot in doc.tracks {
            let mut track = Track::with_pattern(
                snapshot.id,
                snapshot.color,
                snapshot.waveform,
                snapshot.pattern,
                &mut self.backend,
            );
            track.set_gain(snapshot.gain, &mut self.backend);
            self.tracks.push(track);
        }
        self.next_track_id = self.tracks.iter().map(|t| t.id.0 + 1).max().unwrap_or(0);
        self.transport.reset(doc.tempo_bpm);
        self.collect_events();
        info!("project loaded: {} tracks at {} bpm", self.tracks.len(), self.transport.tempo());
    }

    pub fn save(&mut self) {
        let Some(dir) = self.project_dir.clone() else {
            self.status = "no project directory".into();
            return;
        };
        self.status = match persistence::save_project(&dir, &self.export_project()) {
            Ok(()) => "saved".into(),
            Err(e) => {
                warn!("save failed: {e:#}");
                format!("save failed: {e}")
            }
        };
    }

    fn reload(&mut self) -> Result<()> {
        let Some(dir) = self.project_dir.clone() else {
            self.status = "no project directory".into();
            return Ok(());
        };
        match persistence::load_project(&dir) {
            Ok(Some(doc)) => {
                self.load_document(doc)?;
                self.status = "reloaded".into();
            }
            Ok(None) => self.status = "nothing saved yet".into(),
            Err(e) => {
                warn!("reload failed: {e:#}");
                self.status = format!("reload failed: {e}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::OfflineSink;
    use crate::audio_api::Waveform;
    use crate::pipeline::pattern::Column;
    use crate::pipeline::piano_roll::lane_of;
    use crate::notes::Note;
    use pretty_assertions::assert_eq;

    fn middle() -> Middle {
        Middle::new(Box::new(OfflineSink::new(44_100)))
    }

    fn set_note(m: &mut Middle, track: TrackId, row: usize, note: &str) {
        m.handle_input(Command::SetCell { track, row, column: Column::Note, value: note.into() })
            .unwrap();
    }

    #[test]
    fn starts_with_one_track_stopped() {
        let m = middle();
        let ds = m.display_state();
        assert_eq!(ds.tracks.len(), 1);
        assert_eq!(ds.tempo_bpm, 130.0);
        assert!(!ds.playing);
        assert!(!ds.output_ready);
        assert_eq!(ds.tracks[0].rows.len(), 64);
    }

    #[test]
    fn play_starts_the_output_and_tick_plays_rows() {
        let mut m = middle();
        m.handle_input(Command::SetTempo(120.0)).unwrap();
        set_note(&mut m, TrackId(0), 0, "C-4");
        m.handle_input(Command::Play).unwrap();
        assert!(m.backend().is_running());

        m.tick(Duration::from_millis(124));
        assert_eq!(m.display_state().last_row, None);
        m.tick(Duration::from_millis(1));
        let ds = m.display_state();
        assert_eq!(ds.last_row, Some(0));
        assert_eq!(ds.current_row, 1);
        assert!(ds.tracks[0].sounding);
    }

    #[test]
    fn stop_clears_the_playhead() {
        let mut m = middle();
        m.handle_input(Command::Play).unwrap();
        m.advance();
        m.handle_input(Command::TogglePlay).unwrap();
        m.tick(Duration::ZERO);
        let ds = m.display_state();
        assert!(!ds.playing);
        assert_eq!(ds.current_row, 0);
        assert_eq!(ds.last_row, None);
    }

    #[test]
    fn track_ids_never_repeat() {
        let mut m = middle();
        let a = m.add_track().unwrap();
        let b = m.add_track().unwrap();
        m.remove_track(b).unwrap();
        let c = m.add_track().unwrap();
        assert_eq!((a, b, c), (TrackId(1), TrackId(2), TrackId(3)));
        assert_ne!(m.track(a).unwrap().color, m.track(c).unwrap().color);
    }

    #[test]
    fn unknown_track_is_reported_in_status() {
        let mut m = middle();
        let err = m.handle_input(Command::ToggleMute(TrackId(9))).unwrap_err();
        assert_eq!(err, SeqError::UnknownTrack(TrackId(9)));
        assert_eq!(m.status(), "no track with id 09");
    }

    #[test]
    fn bad_cell_edit_keeps_the_old_value() {
        let mut m = middle();
        set_note(&mut m, TrackId(0), 2, "G-3");
        let result = m.handle_input(Command::SetCell {
            track: TrackId(0),
            row: 2,
            column: Column::Note,
            value: "H-3".into(),
        });
        assert!(result.is_err());
        assert_eq!(m.tracks()[0].pattern.rows()[2].note.to_string(), "G-3");
    }

    #[test]
    fn solo_through_commands() {
        let mut m = middle();
        let b = m.add_track().unwrap();
        set_note(&mut m, TrackId(0), 0, "C-4");
        set_note(&mut m, b, 0, "E-4");
        m.handle_input(Command::ToggleSolo(TrackId(0))).unwrap();
        m.handle_input(Command::Play).unwrap();
        m.advance();

        let ds = m.display_state();
        assert!(ds.tracks[0].sounding);
        assert!(!ds.tracks[1].sounding);
        assert!(!ds.tracks[1].audible);
    }

    #[test]
    fn removing_a_track_while_playing_silences_it() {
        let mut m = middle();
        let b = m.add_track().unwrap();
        set_note(&mut m, b, 0, "C-4");
        m.handle_input(Command::AppendRow(b)).unwrap();
        m.handle_input(Command::Play).unwrap();
        m.advance();
        assert_eq!(m.backend().live_voices(), 1);
        assert_eq!(m.pattern_span(), 65);

        m.handle_input(Command::RemoveTrack(b)).unwrap();
        assert_eq!(m.backend().live_voices(), 0);
        assert_eq!(m.tracks().len(), 1);
        assert_eq!(m.pattern_span(), 64);
        m.advance();
    }

    #[test]
    fn tempo_changes_are_validated_not_clamped() {
        let mut m = middle();
        m.handle_input(Command::NudgeTempo(-5.0)).unwrap();
        assert_eq!(m.transport().tempo(), 125.0);
        m.handle_input(Command::SetTempo(5000.0)).unwrap();
        assert_eq!(m.transport().tempo(), 5000.0);
        m.handle_input(Command::SetTempo(10.0)).unwrap();
        assert_eq!(m.transport().tick_interval(), Duration::from_millis(1500));
        assert!(m.handle_input(Command::SetTempo(0.0)).is_err());
        assert!(m.handle_input(Command::NudgeTempo(-10.0)).is_err());
        assert_eq!(m.transport().tempo(), 10.0);
    }

    #[test]
    fn imported_tempo_survives_export() {
        let mut m = middle();
        let mut doc = ProjectDocument::default();
        doc.tempo_bpm = 1200.0;
        m.import_project(&doc.to_json().unwrap()).unwrap();
        assert_eq!(m.export_project().tempo_bpm, 1200.0);
    }

    #[test]
    fn import_rejects_the_last_track_id_before_teardown() {
        let mut m = middle();
        set_note(&mut m, TrackId(0), 0, "C-4");
        let before = m.export_project();

        let mut doc = ProjectDocument::default();
        doc.tracks[0].id = TrackId(u32::MAX);
        let err = m.import_project(&doc.to_json().unwrap()).unwrap_err();
        assert!(matches!(err, SeqError::MalformedProject(_)));
        assert_eq!(m.export_project(), before);
    }

    #[test]
    fn track_ids_run_out_without_panicking() {
        let mut m = middle();
        let mut doc = ProjectDocument::default();
        doc.tracks[0].id = TrackId(u32::MAX - 1);
        m.load_document(doc).unwrap();

        let err = m.handle_input(Command::AddTrack).unwrap_err();
        assert_eq!(err, SeqError::TrackIdsExhausted);
        assert_eq!(m.tracks().len(), 1);
    }

    #[test]
    fn gain_is_clamped() {
        let mut m = middle();
        m.handle_input(Command::AdjustGain(TrackId(0), 0.5)).unwrap();
        assert_eq!(m.tracks()[0].gain(), 1.0);
        m.handle_input(Command::AdjustGain(TrackId(0), -0.25)).unwrap();
        assert_eq!(m.tracks()[0].gain(), 0.75);
    }

    #[test]
    fn export_then_import_restores_the_project() {
        let mut m = middle();
        m.handle_input(Command::SetTempo(96.0)).unwrap();
        let b = m.add_track().unwrap();
        m.handle_input(Command::CycleWaveform(b)).unwrap();
        m.handle_input(Command::AppendRow(b)).unwrap();
        set_note(&mut m, TrackId(0), 0, "C-4");
        set_note(&mut m, b, 64, "===");
        let exported = m.export_project();
        let json = exported.to_json().unwrap();

        let mut other = middle();
        other.import_project(&json).unwrap();
        assert_eq!(other.export_project(), exported);
        assert_eq!(other.transport().tempo(), 96.0);
        assert_eq!(other.track(b).unwrap().waveform, Waveform::Triangle);
        assert_eq!(other.add_track(), Ok(TrackId(2)));
    }

    #[test]
    fn malformed_import_leaves_state_untouched() {
        let mut m = middle();
        m.add_track().unwrap();
        set_note(&mut m, TrackId(0), 1, "A-4");
        let before = m.export_project();

        let bad = r##"{ "tempoBPM": 120, "tracks": [
            { "id": 0, "color": "#fff", "pattern": [
                { "note": "C-4", "instrument": "--", "volume": "--", "effect": "---" },
                { "note": "Z-9", "instrument": "--", "volume": "--", "effect": "---" } ] } ] }"##;
        let err = m.import_project(bad).unwrap_err();
        assert!(matches!(err, SeqError::MalformedProject(_)));
        assert_eq!(m.export_project(), before);
    }

    #[test]
    fn import_stops_playback_and_silences_old_tracks() {
        let mut m = middle();
        set_note(&mut m, TrackId(0), 0, "C-4");
        m.handle_input(Command::Play).unwrap();
        m.advance();
        assert_eq!(m.backend().live_voices(), 1);

        m.load_document(ProjectDocument::default()).unwrap();
        assert!(!m.transport().is_playing());
        assert_eq!(m.backend().live_voices(), 0);
        assert_eq!(m.display_state().last_row, None);
    }

    #[test]
    fn piano_roll_through_commands() {
        let mut m = middle();
        let lane = lane_of(Note::parse("E-3").unwrap()).unwrap();

        // no roll open: ignored
        m.handle_input(Command::PianoRollClick { row: 0, lane }).unwrap();
        assert_eq!(m.tracks()[0].pattern.rows()[0].note, Note::Rest);

        m.handle_input(Command::OpenPianoRoll(TrackId(0))).unwrap();
        m.handle_input(Command::PianoRollClick { row: 0, lane }).unwrap();
        assert_eq!(m.tracks()[0].pattern.rows()[0].note.to_string(), "E-3");
        assert!(m.piano_roll().preview_voice().is_some());

        m.tick(Duration::from_millis(400));
        assert_eq!(m.piano_roll().preview_voice(), None);

        m.handle_input(Command::RemoveTrack(TrackId(0))).unwrap();
        assert!(!m.piano_roll().is_open());
    }

    #[test]
    fn save_and_reload_through_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut m = middle();
        m.set_project_dir(dir.path());
        set_note(&mut m, TrackId(0), 3, "D#5");
        m.handle_input(Command::Save).unwrap();
        assert_eq!(m.status(), "saved");

        set_note(&mut m, TrackId(0), 3, "---");
        m.handle_input(Command::Reload).unwrap();
        assert_eq!(m.tracks()[0].pattern.rows()[3].note.to_string(), "D#5");
    }
}
