//! Control-side half of the audio path.
//!
//! `AudioBackend` hands out bus and voice ids, turns notes into start/stop
//! commands for whichever [`AudioSink`] it owns, and keeps enough bookkeeping
//! (live voices, latest meter readings) to answer questions without ever
//! waiting on the render thread.

use std::collections::HashMap;

use log::{debug, warn};

use super::{AudioSink, StereoFrame};
use crate::audio_api::{AudioCommand, BusId, VoiceId, VoiceParams, Waveform};
use crate::error::{Result, SeqError};
use crate::notes::Note;
use crate::pipeline::pattern::Volume;
use crate::shared::VOICE_LEVEL;

/// Handle to a voice started by [`AudioBackend::trigger_voice`]. Cutting it
/// after it has already finished is reported, never fatal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoiceHandle {
    pub id: VoiceId,
}

pub struct AudioBackend {
    sink: Box<dyn AudioSink>,
    next_voice: u64,
    next_bus: u32,
    live: HashMap<VoiceId, VoiceParams>,
    levels: HashMap<BusId, f32>,
    warned_suspended: bool,
}

impl AudioBackend {
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        Self {
            sink,
            next_voice: 0,
            next_bus: 0,
            live: HashMap::new(),
            levels: HashMap::new(),
            warned_suspended: false,
        }
    }

    /// Safe to call from every user action; only the first successful call does anything.
    pub fn ensure_running(&mut self) -> Result<()> {
        if self.sink.is_running() {
            return Ok(());
        }
        self.sink.resume()?;
        self.warned_suspended = false;
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.sink.is_running()
    }

    pub fn create_track_bus(&mut self) -> BusId {
        let id = BusId(self.next_bus);
        self.next_bus += 1;
        self.sink.send(AudioCommand::CreateBus { id, gain: 1.0 });
        id
    }

    pub fn set_bus_gain(&mut self, id: BusId, gain: f32) {
        self.sink.send(AudioCommand::SetBusGain { id, gain: gain.clamp(0.0, 1.0) });
    }

    pub fn remove_bus(&mut self, id: BusId) {
        self.levels.remove(&id);
        self.sink.send(AudioCommand::RemoveBus { id });
    }

    /// Starts a voice for a pitched note. Rest, Cut and a suspended output
    /// all yield `None`.
    pub fn trigger_voice(
        &mut self,
        note: Note,
        waveform: Waveform,
        volume: Option<Volume>,
        bus: BusId,
    ) -> Option<VoiceHandle> {
        let frequency = note.frequency()?;
        if !self.sink.is_running() {
            if !self.warned_suspended {
                warn!("{}; call ensure_running first", SeqError::OutputSuspended);
                self.warned_suspended = true;
            }
            return None;
        }

        let id = VoiceId(self.next_voice);
        self.next_voice += 1;
        let params = VoiceParams {
            id,
            bus,
            frequency,
            waveform,
            amplitude: volume.unwrap_or(Volume::MAX).gain() * VOICE_LEVEL,
        };
        debug!("voice {} start {note} ({frequency:.2} Hz) on bus {}", id.0, bus.0);
        self.live.insert(id, params.clone());
        self.sink.send(AudioCommand::StartVoice(params));
        Some(VoiceHandle { id })
    }

    pub fn cut_voice(&mut self, handle: VoiceHandle) -> Result<()> {
        self.reap();
        if self.live.remove(&handle.id).is_none() {
            return Err(SeqError::VoiceAlreadyStopped(handle.id));
        }
        debug!("voice {} cut", handle.id.0);
        self.sink.send(AudioCommand::CutVoice { id: handle.id });
        Ok(())
    }

    /// Forget voices the engine reports as finished, and pick up meter readings.
    pub fn reap(&mut self) {
        for id in self.sink.drain_expired() {
            self.live.remove(&id);
        }
        for reading in self.sink.drain_meters() {
            self.levels.insert(reading.bus, reading.peak);
        }
    }

    pub fn is_live(&self, handle: VoiceHandle) -> bool {
        self.live.contains_key(&handle.id)
    }

    pub fn voice(&self, handle: VoiceHandle) -> Option<&VoiceParams> {
        self.live.get(&handle.id)
    }

    pub fn live_voices(&self) -> usize {
        self.live.len()
    }

    pub fn level(&self, bus: BusId) -> f32 {
        self.levels.get(&bus).copied().unwrap_or(0.0)
    }

    pub fn render(&mut self, out: &mut [StereoFrame]) -> Result<()> {
        self.sink.render(out)?;
        self.reap();
        Ok(())
    }
}
