// Rows and patterns: the data the grid editor, the piano roll and playback share.
//
// A row is four cells, written the way the tracker shows them:
//   note   "C-4" / "---" / "==="
//   inst   "01"  / "--"          two hex digits
//   vol    "40"  / "--"          two hex digits, 00..7F
//   fx     "A0F" / "---"         three of [0-9A-Z], stored but not interpreted

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeqError};
use crate::notes::Note;
use crate::shared::DEFAULT_PATTERN_LEN;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Column {
    Note,
    Instrument,
    Volume,
    Effect,
}

impl Column {
    pub const ALL: [Column; 4] = [Column::Note, Column::Instrument, Column::Volume, Column::Effect];

    pub fn width(self) -> usize {
        match self {
            Column::Note | Column::Effect => 3,
            Column::Instrument | Column::Volume => 2,
        }
    }

    pub fn next(self) -> Self {
        match self {
            Column::Note => Column::Instrument,
            Column::Instrument => Column::Volume,
            Column::Volume => Column::Effect,
            Column::Effect => Column::Note,
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Column::Note => "note",
            Column::Instrument => "instrument",
            Column::Volume => "volume",
            Column::Effect => "effect",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Volume(u8);

impl Volume {
    pub const MAX: Volume = Volume(0x7F);

    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAX.0).then_some(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn gain(self) -> f32 {
        self.0 as f32 / Self::MAX.0 as f32
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EffectCode([u8; 3]);

impl EffectCode {
    pub fn parse(text: &str) -> Option<Self> {
        let bytes: [u8; 3] = text.as_bytes().try_into().ok()?;
        bytes
            .iter()
            .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
            .then_some(Self(bytes))
    }
}

impl fmt::Display for EffectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // only ascii alphanumerics get in through parse
        f.write_str(std::str::from_utf8(&self.0).unwrap_or("???"))
    }
}

// A parsed value for one column, the typed form of an edit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CellValue {
    Note(Note),
    Instrument(Option<u8>),
    Volume(Option<Volume>),
    Effect(Option<EffectCode>),
}

fn is_unset(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b == b'-')
}

fn parse_hex_byte(text: &str) -> Option<u8> {
    if text.len() != 2 {
        return None;
    }
    u8::from_str_radix(text, 16).ok()
}

impl CellValue {
    pub fn parse(column: Column, text: &str) -> Result<Self> {
        let upper = text.trim().to_ascii_uppercase();
        let invalid = || SeqError::InvalidCellValue { column, value: text.to_string() };
        let unset = is_unset(&upper) && upper.len() == column.width();
        match column {
            Column::Note => Note::parse(&upper).map(CellValue::Note).map_err(|_| invalid()),
            Column::Instrument if unset => Ok(CellValue::Instrument(None)),
            Column::Instrument => parse_hex_byte(&upper)
                .map(|b| CellValue::Instrument(Some(b)))
                .ok_or_else(invalid),
            Column::Volume if unset => Ok(CellValue::Volume(None)),
            Column::Volume => parse_hex_byte(&upper)
                .and_then(Volume::new)
                .map(|v| CellValue::Volume(Some(v)))
                .ok_or_else(invalid),
            Column::Effect if unset => Ok(CellValue::Effect(None)),
            Column::Effect => EffectCode::parse(&upper)
                .map(|e| CellValue::Effect(Some(e)))
                .ok_or_else(invalid),
        }
    }

    pub fn column(&self) -> Column {
        match self {
            CellValue::Note(_) => Column::Note,
            CellValue::Instrument(_) => Column::Instrument,
            CellValue::Volume(_) => Column::Volume,
            CellValue::Effect(_) => Column::Effect,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RowText", into = "RowText")]
pub struct Row {
    pub note: Note,
    pub instrument: Option<u8>,
    pub volume: Option<Volume>,
    pub effect: Option<EffectCode>,
}

impl Row {
    pub fn get(&self, column: Column) -> CellValue {
        match column {
            Column::Note => CellValue::Note(self.note),
            Column::Instrument => CellValue::Instrument(self.instrument),
            Column::Volume => CellValue::Volume(self.volume),
            Column::Effect => CellValue::Effect(self.effect),
        }
    }

    pub fn set(&mut self, value: CellValue) {
        match value {
            CellValue::Note(note) => self.note = note,
            CellValue::Instrument(inst) => self.instrument = inst,
            CellValue::Volume(vol) => self.volume = vol,
            CellValue::Effect(fx) => self.effect = fx,
        }
    }

    pub fn cell_text(&self, column: Column) -> String {
        match column {
            Column::Note => self.note.to_string(),
            Column::Instrument => self.instrument.map_or("--".into(), |i| format!("{i:02X}")),
            Column::Volume => self.volume.map_or("--".into(), |v| format!("{:02X}", v.value())),
            Column::Effect => self.effect.map_or("---".into(), |e| e.to_string()),
        }
    }
}

// The on-disk shape of a row: every cell as its tracker text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RowText {
    pub note: String,
    pub instrument: String,
    pub volume: String,
    pub effect: String,
}

impl TryFrom<RowText> for Row {
    type Error = SeqError;

    fn try_from(text: RowText) -> Result<Self> {
        let mut row = Row::default();
        row.set(CellValue::parse(Column::Note, &text.note)?);
        row.set(CellValue::parse(Column::Instrument, &text.instrument)?);
        row.set(CellValue::parse(Column::Volume, &text.volume)?);
        row.set(CellValue::parse(Column::Effect, &text.effect)?);
        Ok(row)
    }
}

impl From<Row> for RowText {
    fn from(row: Row) -> Self {
        Self {
            note: row.cell_text(Column::Note),
            instrument: row.cell_text(Column::Instrument),
            volume: row.cell_text(Column::Volume),
            effect: row.cell_text(Column::Effect),
        }
    }
}

// Ordered rows owned by one track. Rows are only ever appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern {
    rows: Vec<Row>,
}

impl Default for Pattern {
    fn default() -> Self {
        Self::with_len(DEFAULT_PATTERN_LEN)
    }
}

impl Pattern {
    pub fn with_len(len: usize) -> Self {
        Self { rows: vec![Row::default(); len] }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    // Playback index for a global row counter; patterns loop on their own length.
    pub fn row_at(&self, current_row: usize) -> Option<&Row> {
        if self.rows.is_empty() {
            return None;
        }
        self.rows.get(current_row % self.rows.len())
    }

    pub fn append_row(&mut self) -> usize {
        self.rows.push(Row::default());
        self.rows.len() - 1
    }

    pub fn set(&mut self, index: usize, value: CellValue) -> Result<()> {
        let len = self.rows.len();
        let row = self
            .rows
            .get_mut(index)
            .ok_or(SeqError::RowOutOfRange { row: index, len })?;
        row.set(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_pattern_is_64_rests() {
        let p = Pattern::default();
        assert_eq!(p.len(), 64);
        assert!(p.rows().iter().all(|r| *r == Row::default()));
        assert_eq!(p.rows()[0].note, Note::Rest);
    }

    #[test]
    fn row_at_wraps_on_pattern_length() {
        let mut p = Pattern::with_len(4);
        p.set(1, CellValue::Note(Note::Cut)).unwrap();
        assert_eq!(p.row_at(5).unwrap().note, Note::Cut);
        assert_eq!(p.row_at(4).unwrap().note, Note::Rest);
    }

    #[test]
    fn parses_each_column_domain() {
        assert_eq!(
            CellValue::parse(Column::Note, "c#5").unwrap(),
            CellValue::Note(Note::parse("C#5").unwrap())
        );
        assert_eq!(CellValue::parse(Column::Instrument, "1f").unwrap(), CellValue::Instrument(Some(0x1F)));
        assert_eq!(CellValue::parse(Column::Instrument, "--").unwrap(), CellValue::Instrument(None));
        assert_eq!(CellValue::parse(Column::Volume, "7F").unwrap(), CellValue::Volume(Volume::new(127)));
        assert_eq!(CellValue::parse(Column::Volume, "--").unwrap(), CellValue::Volume(None));
        assert_eq!(CellValue::parse(Column::Effect, "---").unwrap(), CellValue::Effect(None));
        assert_eq!(
            CellValue::parse(Column::Effect, "a0f").unwrap().column(),
            Column::Effect
        );
    }

    #[test]
    fn rejects_values_outside_the_column_domain() {
        for (column, text) in [
            (Column::Note, "X-4"),
            (Column::Instrument, "1"),
            (Column::Instrument, "GG"),
            (Column::Volume, "80"),
            (Column::Volume, "FF"),
            (Column::Volume, "---"),
            (Column::Effect, "A0"),
            (Column::Effect, "A_0"),
        ] {
            assert_eq!(
                CellValue::parse(column, text),
                Err(SeqError::InvalidCellValue { column, value: text.to_string() })
            );
        }
    }

    #[test]
    fn row_text_shape() {
        let mut row = Row::default();
        row.set(CellValue::Note(Note::parse("A-3").unwrap()));
        row.set(CellValue::Volume(Volume::new(0x40)));
        let json = serde_json::to_value(row).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "note": "A-3", "instrument": "--", "volume": "40", "effect": "---" })
        );
    }

    #[test]
    fn bad_cell_in_json_is_rejected() {
        let bad = r#"{ "note": "C-4", "instrument": "--", "volume": "99", "effect": "---" }"#;
        assert!(serde_json::from_str::<Row>(bad).is_err());
    }

    #[test]
    fn set_out_of_range_row_fails() {
        let mut p = Pattern::with_len(2);
        assert_eq!(
            p.set(2, CellValue::Note(Note::Cut)),
            Err(SeqError::RowOutOfRange { row: 2, len: 2 })
        );
    }

    #[test]
    fn append_grows_by_one_default_row() {
        let mut p = Pattern::with_len(2);
        assert_eq!(p.append_row(), 2);
        assert_eq!(p.len(), 3);
        assert_eq!(p.rows()[2], Row::default());
    }
}
