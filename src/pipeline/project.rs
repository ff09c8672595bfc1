// The persisted project document. This is only a data shape; Middle turns it
// into live tracks (import) and back (export).
//
// {
//   "tempoBPM": 130.0,
//   "tracks": [
//     { "id": 0, "color": "#ff9900", "waveform": "sawtooth", "gain": 1.0,
//       "pattern": [ { "note": "C-4", "instrument": "01", "volume": "40", "effect": "---" }, ... ] }
//   ]
// }

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::pattern::Pattern;
use super::track::palette_color;
use crate::audio_api::Waveform;
use crate::error::{Result, SeqError};
use crate::shared::{DEFAULT_TEMPO_BPM, TrackId};

fn unity_gain() -> f32 {
    1.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    pub id: TrackId,
    pub color: String,
    #[serde(default)]
    pub waveform: Waveform,
    #[serde(default = "unity_gain")]
    pub gain: f32,
    pub pattern: Pattern,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectDocument {
    #[serde(rename = "tempoBPM")]
    pub tempo_bpm: f64,
    pub tracks: Vec<TrackSnapshot>,
}

impl Default for ProjectDocument {
    fn default() -> Self {
        Self {
            tempo_bpm: DEFAULT_TEMPO_BPM,
            tracks: vec![TrackSnapshot {
                id: TrackId(0),
                color: palette_color(0).to_string(),
                waveform: Waveform::default(),
                gain: 1.0,
                pattern: Pattern::default(),
            }],
        }
    }
}

impl ProjectDocument {
    /// Parse and validate. Nothing about a document is applied until this succeeds.
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: ProjectDocument = serde_json::from_str(json)?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.tempo_bpm.is_finite() || self.tempo_bpm <= 0.0 {
            return Err(SeqError::MalformedProject(format!("bad tempo {}", self.tempo_bpm)));
        }
        let mut ids = HashSet::new();
        for track in &self.tracks {
            // the next added track takes max id + 1
            if track.id.0 == u32::MAX {
                return Err(SeqError::MalformedProject(format!("track id {} is out of range", track.id.0)));
            }
            if !ids.insert(track.id) {
                return Err(SeqError::MalformedProject(format!("duplicate track id {}", track.id)));
            }
            if track.pattern.is_empty() {
                return Err(SeqError::MalformedProject(format!("track {} has no rows", track.id)));
            }
            if !(0.0..=1.0).contains(&track.gain) {
                return Err(SeqError::MalformedProject(format!(
                    "track {} gain {} is outside 0..1",
                    track.id, track.gain
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = r##"{
        "tempoBPM": 96,
        "tracks": [
            { "id": 3, "color": "#123456", "waveform": "square",
              "pattern": [
                { "note": "C-4", "instrument": "01", "volume": "40", "effect": "---" },
                { "note": "===", "instrument": "--", "volume": "--", "effect": "A0F" }
              ] }
        ]
    }"##;

    #[test]
    fn parses_the_document_shape() {
        let doc = ProjectDocument::from_json(DOC).unwrap();
        assert_eq!(doc.tempo_bpm, 96.0);
        assert_eq!(doc.tracks.len(), 1);
        let track = &doc.tracks[0];
        assert_eq!(track.id, TrackId(3));
        assert_eq!(track.waveform, Waveform::Square);
        assert_eq!(track.gain, 1.0);
        assert_eq!(track.pattern.len(), 2);
    }

    #[test]
    fn json_round_trip_is_lossless() {
        let doc = ProjectDocument::from_json(DOC).unwrap();
        let again = ProjectDocument::from_json(&doc.to_json().unwrap()).unwrap();
        assert_eq!(doc, again);
    }

    #[test]
    fn rejects_malformed_documents() {
        let cases = [
            "not json",
            r#"{ "tracks": [] }"#,
            r#"{ "tempoBPM": 0, "tracks": [] }"#,
            r##"{ "tempoBPM": 120, "tracks": [ { "id": 0, "color": "#fff", "pattern": [] } ] }"##,
            r##"{ "tempoBPM": 120, "tracks": [ { "id": 0, "color": "#fff", "waveform": "organ",
                "pattern": [ { "note": "---", "instrument": "--", "volume": "--", "effect": "---" } ] } ] }"##,
            r##"{ "tempoBPM": 120, "tracks": [ { "id": 0, "color": "#fff",
                "pattern": [ { "note": "Q-4", "instrument": "--", "volume": "--", "effect": "---" } ] } ] }"##,
        ];
        for json in cases {
            assert!(
                matches!(ProjectDocument::from_json(json), Err(SeqError::MalformedProject(_))),
                "accepted: {json}"
            );
        }
    }

    #[test]
    fn rejects_duplicate_ids() {
        let mut doc = ProjectDocument::default();
        doc.tracks.push(doc.tracks[0].clone());
        assert!(doc.validate().is_err());
    }

    #[test]
    fn rejects_an_id_with_no_successor() {
        let mut doc = ProjectDocument::default();
        doc.tracks[0].id = TrackId(u32::MAX);
        assert!(matches!(doc.validate(), Err(SeqError::MalformedProject(_))));
        doc.tracks[0].id = TrackId(u32::MAX - 1);
        assert_eq!(doc.validate(), Ok(()));
    }
}
