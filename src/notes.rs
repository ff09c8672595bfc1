// Tracker pitch names <-> MIDI numbers <-> frequency.
//
// Cells are always three characters wide:
//   "---"  rest, nothing happens on this row
//   "==="  cut, silence whatever the track is playing
//   "C-4"  pitch class (dash for naturals) followed by a single-digit octave
//   "F#3"  sharps only, the tracker never writes flats
//
// midi = class + (octave + 1) * 12, so C-4 is 60 and A-4 is 69.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqError};

pub const REST_TEXT: &str = "---";
pub const CUT_TEXT: &str = "===";

const CLASS_NAMES: [&str; 12] = [
    "C-", "C#", "D-", "D#", "E-", "F-", "F#", "G-", "G#", "A-", "A#", "B-",
];

pub const MAX_OCTAVE: u8 = 9;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PitchClass(u8); // 0 = C .. 11 = B

impl PitchClass {
    pub fn new(index: u8) -> Option<Self> {
        (index < 12).then_some(Self(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    pub fn is_sharp(self) -> bool {
        matches!(self.0, 1 | 3 | 6 | 8 | 10)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Note {
    #[default]
    Rest,
    Cut,
    Pitch { class: PitchClass, octave: u8 },
}

impl Note {
    pub fn pitch(class: u8, octave: u8) -> Option<Self> {
        if octave > MAX_OCTAVE {
            return None;
        }
        PitchClass::new(class).map(|class| Note::Pitch { class, octave })
    }

    pub fn parse(text: &str) -> Result<Self> {
        let upper = text.trim().to_ascii_uppercase();
        match upper.as_str() {
            REST_TEXT => return Ok(Note::Rest),
            CUT_TEXT => return Ok(Note::Cut),
            _ => {}
        }
        let invalid = || SeqError::InvalidPitch(text.to_string());
        if upper.len() != 3 || !upper.is_ascii() {
            return Err(invalid());
        }
        let (name, octave) = upper.split_at(2);
        let class = CLASS_NAMES
            .iter()
            .position(|n| *n == name)
            .ok_or_else(invalid)?;
        let octave = octave
            .chars()
            .next()
            .and_then(|c| c.to_digit(10))
            .ok_or_else(invalid)?;
        Note::pitch(class as u8, octave as u8).ok_or_else(invalid)
    }

    pub fn from_midi(midi: u8) -> Option<Self> {
        let octave = (midi / 12).checked_sub(1)?;
        Note::pitch(midi % 12, octave)
    }

    pub fn midi(self) -> Option<u8> {
        match self {
            Note::Pitch { class, octave } => Some(class.index() + (octave + 1) * 12),
            _ => None,
        }
    }

    pub fn frequency(self) -> Option<f32> {
        self.midi().map(midi_to_frequency)
    }
}

pub fn midi_to_frequency(midi: u8) -> f32 {
    440.0 * 2.0_f32.powf((midi as f32 - 69.0) / 12.0)
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Note::Rest => f.write_str(REST_TEXT),
            Note::Cut => f.write_str(CUT_TEXT),
            Note::Pitch { class, octave } => {
                write!(f, "{}{}", CLASS_NAMES[class.index() as usize], octave)
            }
        }
    }
}

impl TryFrom<String> for Note {
    type Error = SeqError;

    fn try_from(text: String) -> Result<Self> {
        Note::parse(&text)
    }
}

impl From<Note> for String {
    fn from(note: Note) -> Self {
        note.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_440() {
        let f = Note::parse("A-4").unwrap().frequency().unwrap();
        assert!((f - 440.0).abs() < 1e-6);
        assert_eq!(Note::parse("A-4").unwrap().midi(), Some(69));
    }

    #[test]
    fn middle_c() {
        let c4 = Note::parse("C-4").unwrap();
        assert_eq!(c4.midi(), Some(60));
        assert!((c4.frequency().unwrap() - 261.63).abs() < 0.01);
    }

    #[test]
    fn frequency_strictly_increases_with_midi() {
        let mut last = 0.0;
        for midi in 12..=131u8 {
            let note = Note::from_midi(midi).unwrap();
            assert_eq!(note.midi(), Some(midi));
            let f = note.frequency().unwrap();
            assert!(f > last, "{note} at {f} Hz is not above {last} Hz");
            last = f;
        }
    }

    #[test]
    fn parses_rest_cut_and_sharps() {
        assert_eq!(Note::parse("---").unwrap(), Note::Rest);
        assert_eq!(Note::parse("===").unwrap(), Note::Cut);
        assert_eq!(Note::parse("f#3").unwrap().to_string(), "F#3");
        assert_eq!(Note::parse("F#3").unwrap().midi(), Some(54));
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "H-4", "C4", "Db4", "C-x", "C-10", "----"] {
            assert_eq!(
                Note::parse(bad),
                Err(SeqError::InvalidPitch(bad.to_string())),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn rest_and_cut_have_no_frequency() {
        assert_eq!(Note::Rest.frequency(), None);
        assert_eq!(Note::Cut.frequency(), None);
        assert_eq!(Note::parse("---").unwrap().frequency(), None);
    }

    #[test]
    fn serde_uses_cell_text() {
        let json = serde_json::to_string(&Note::parse("G#2").unwrap()).unwrap();
        assert_eq!(json, "\"G#2\"");
        let back: Note = serde_json::from_str(&json).unwrap();
        assert_eq!(back.to_string(), "G#2");
        assert!(serde_json::from_str::<Note>("\"X-1\"").is_err());
    }
}
