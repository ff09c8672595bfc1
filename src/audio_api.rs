// Messages from the control side to the render engine. Ids are allocated by
// the control side (AudioBackend) so it never has to wait for an answer.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BusId(pub u32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    #[default]
    Sawtooth,
    Triangle,
}

impl Waveform {
    pub fn next(self) -> Self {
        match self {
            Waveform::Sine => Waveform::Square,
            Waveform::Square => Waveform::Sawtooth,
            Waveform::Sawtooth => Waveform::Triangle,
            Waveform::Triangle => Waveform::Sine,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Waveform::Sine => "SIN",
            Waveform::Square => "SQR",
            Waveform::Sawtooth => "SAW",
            Waveform::Triangle => "TRI",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VoiceParams {
    pub id: VoiceId,
    pub bus: BusId,
    pub frequency: f32,
    pub waveform: Waveform,
    pub amplitude: f32, // peak level reached at the end of the attack
}

#[derive(Clone, Debug, PartialEq)]
pub enum AudioCommand {
    CreateBus { id: BusId, gain: f32 },
    SetBusGain { id: BusId, gain: f32 },
    // Bus is dropped once no voice is rendering into it anymore
    RemoveBus { id: BusId },

    StartVoice(VoiceParams),
    // Fast release then stop; unknown ids are ignored
    CutVoice { id: VoiceId },
}

// Engine -> control side
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeterReading {
    pub bus: BusId,
    pub peak: f32,
}
