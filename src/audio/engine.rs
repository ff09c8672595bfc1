use crossbeam_channel::Sender;

use super::frame::StereoFrame;
use super::voice::Voice;
use crate::audio_api::{AudioCommand, BusId, MeterReading, VoiceId, VoiceParams};
use crate::shared::MASTER_GAIN;

const MAX_VOICES: usize = 32; // hard cap so we wont malloc in audio callback
const MAX_BUSES: usize = 64;

// Track gain -> analysis tap -> master.
#[derive(Clone, Debug)]
struct Bus {
    id: BusId,
    gain: f32,
    acc: f32,  // this frame's sum of voices
    peak: f32, // loudest post-gain sample since the last meter report
    detached: bool,
}

pub struct Engine {
    sample_rate: f32,
    voices: [Option<Voice>; MAX_VOICES], // fixed pool of voices
    buses: Vec<Bus>,
    master_gain: f32,
    expired_tx: Option<Sender<VoiceId>>,
    meter_tx: Option<Sender<MeterReading>>,
}

impl Engine {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            voices: std::array::from_fn(|_| None),
            buses: Vec::with_capacity(MAX_BUSES),
            master_gain: MASTER_GAIN,
            expired_tx: None,
            meter_tx: None,
        }
    }

    pub fn set_expired_tx(&mut self, tx: Sender<VoiceId>) {
        self.expired_tx = Some(tx);
    }

    pub fn set_meter_tx(&mut self, tx: Sender<MeterReading>) {
        self.meter_tx = Some(tx);
    }

    pub fn handle_cmd(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::CreateBus { id, gain } => self.create_bus(id, gain),
            AudioCommand::SetBusGain { id, gain } => {
                if let Some(i) = self.bus_index(id) {
                    self.buses[i].gain = gain;
                }
            }
            AudioCommand::RemoveBus { id } => {
                if let Some(i) = self.bus_index(id) {
                    self.buses[i].detached = true;
                }
            }
            AudioCommand::StartVoice(params) => self.start_voice(params),
            AudioCommand::CutVoice { id } => {
                if let Some(v) = self.voices.iter_mut().flatten().find(|v| v.id == id) {
                    v.release();
                }
            }
        }
    }

    // Never grows past MAX_BUSES. A full table reuses a detached slot, else the
    // bus is dropped and its voices mix in unrouted.
    fn create_bus(&mut self, id: BusId, gain: f32) {
        if self.bus_index(id).is_some() {
            return;
        }
        let bus = Bus { id, gain, acc: 0.0, peak: 0.0, detached: false };
        if self.buses.len() < MAX_BUSES {
            self.buses.push(bus);
        } else if let Some(slot) = self.buses.iter_mut().find(|b| b.detached) {
            *slot = bus;
        }
    }

    fn bus_index(&self, id: BusId) -> Option<usize> {
        self.buses.iter().position(|b| b.id == id)
    }

    fn start_voice(&mut self, params: VoiceParams) {
        // what slot do we write to? a free one, else steal the oldest
        let slot = match self.voices.iter().position(Option::is_none) {
            Some(slot) => slot,
            None => {
                let oldest = self
                    .voices
                    .iter()
                    .enumerate()
                    .filter_map(|(i, v)| v.as_ref().map(|v| (i, v.id)))
                    .min_by_key(|&(_, id)| id)
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                if let Some(stolen) = self.voices[oldest].take() {
                    self.report_expired(stolen.id);
                }
                oldest
            }
        };
        self.voices[slot] = Some(Voice::new(&params, self.sample_rate));
    }

    fn report_expired(&self, id: VoiceId) {
        if let Some(tx) = &self.expired_tx {
            let _ = tx.try_send(id);
        }
    }

    #[cfg(test)]
    pub fn active_voices(&self) -> usize {
        self.voices.iter().flatten().filter(|v| v.is_active()).count()
    }

    #[cfg(test)]
    pub fn has_bus(&self, id: BusId) -> bool {
        self.bus_index(id).is_some()
    }

    pub fn render_block(&mut self, out: &mut [StereoFrame]) {
        for frame in out.iter_mut() {
            for bus in &mut self.buses {
                bus.acc = 0.0;
            }
            let mut unrouted = 0.0f32;

            for slot in self.voices.iter_mut() {
                let Some(voice) = slot else { continue };
                let s = voice.next_sample();
                match self.buses.iter_mut().find(|b| b.id == voice.bus) {
                    Some(bus) => bus.acc += s,
                    None => unrouted += s,
                }
                if !voice.is_active() {
                    if let Some(tx) = &self.expired_tx {
                        let _ = tx.try_send(voice.id);
                    }
                    *slot = None;
                }
            }

            let mut mix = unrouted;
            for bus in &mut self.buses {
                let post = bus.acc * bus.gain;
                bus.peak = bus.peak.max(post.abs());
                mix += post;
            }
            *frame = StereoFrame::mono((mix * self.master_gain).clamp(-1.0, 1.0));
        }

        if let Some(tx) = &self.meter_tx {
            for bus in &self.buses {
                let _ = tx.try_send(MeterReading { bus: bus.id, peak: bus.peak });
            }
        }
        for bus in &mut self.buses {
            bus.peak = 0.0;
        }

        // drop detached buses once their last voice has finished releasing
        let voices = &self.voices;
        self.buses.retain(|b| {
            !b.detached || voices.iter().flatten().any(|v| v.bus == b.id)
        });
    }
}
