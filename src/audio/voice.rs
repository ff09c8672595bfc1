use crate::audio_api::{BusId, VoiceId, VoiceParams, Waveform};
use crate::shared::{VOICE_ATTACK, VOICE_DURATION, VOICE_RELEASE};

// Envelope floor; exponential segments aim for this fraction of the peak (-60 dB).
const FLOOR: f32 = 0.001;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Attack,
    Decay,
    Release,
    Done,
}

// One oscillator with its own envelope, rendering into a bus.
#[derive(Clone, Debug)]
pub struct Voice {
    pub id: VoiceId,
    pub bus: BusId,
    waveform: Waveform,
    phase: f32, // 0..1
    phase_inc: f32,
    amplitude: f32,
    level: f32,
    stage: Stage,
    elapsed: u32, // samples since the current stage began
    attack_samples: u32,
    decay_samples: u32,
    decay_coef: f32,
    release_samples: u32,
    release_coef: f32,
}

fn samples(duration: std::time::Duration, sample_rate: f32) -> u32 {
    ((duration.as_secs_f32() * sample_rate).round() as u32).max(1)
}

impl Voice {
    pub fn new(params: &VoiceParams, sample_rate: f32) -> Self {
        let attack_samples = samples(VOICE_ATTACK, sample_rate);
        let decay_samples = samples(VOICE_DURATION, sample_rate)
            .saturating_sub(attack_samples)
            .max(1);
        let release_samples = samples(VOICE_RELEASE, sample_rate);
        Self {
            id: params.id,
            bus: params.bus,
            waveform: params.waveform,
            phase: 0.0,
            phase_inc: params.frequency / sample_rate,
            amplitude: params.amplitude,
            level: 0.0,
            stage: Stage::Attack,
            elapsed: 0,
            attack_samples,
            decay_samples,
            decay_coef: FLOOR.powf(1.0 / decay_samples as f32),
            release_samples,
            release_coef: FLOOR.powf(1.0 / release_samples as f32),
        }
    }

    pub fn is_active(&self) -> bool {
        self.stage != Stage::Done
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    // Release from wherever the envelope is now, so a cut mid-attack does not click.
    pub fn release(&mut self) {
        if matches!(self.stage, Stage::Attack | Stage::Decay) {
            self.stage = Stage::Release;
            self.elapsed = 0;
        }
    }

    pub fn kill(&mut self) {
        self.stage = Stage::Done;
        self.level = 0.0;
    }

    pub fn next_sample(&mut self) -> f32 {
        if !self.is_active() {
            return 0.0;
        }
        let out = self.oscillator() * self.level;

        self.phase += self.phase_inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        self.step_envelope();
        out
    }

    fn oscillator(&self) -> f32 {
        let p = self.phase;
        match self.waveform {
            Waveform::Sine => (std::f32::consts::TAU * p).sin(),
            Waveform::Square => if p < 0.5 { 1.0 } else { -1.0 },
            Waveform::Sawtooth => 2.0 * p - 1.0,
            Waveform::Triangle => 1.0 - 4.0 * (p - 0.5).abs(),
        }
    }

    fn step_envelope(&mut self) {
        self.elapsed += 1;
        match self.stage {
            Stage::Attack => {
                self.level = self.amplitude * (self.elapsed as f32 / self.attack_samples as f32);
                if self.elapsed >= self.attack_samples {
                    self.level = self.amplitude;
                    self.stage = Stage::Decay;
                    self.elapsed = 0;
                }
            }
            Stage::Decay => {
                self.level *= self.decay_coef;
                if self.elapsed >= self.decay_samples {
                    self.kill();
                }
            }
            Stage::Release => {
                self.level *= self.release_coef;
                if self.elapsed >= self.release_samples {
                    self.kill();
                }
            }
            Stage::Done => {}
        }
    }
}
