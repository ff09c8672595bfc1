use thiserror::Error;

use crate::audio_api::VoiceId;
use crate::pipeline::pattern::Column;
use crate::shared::TrackId;

pub type Result<T> = std::result::Result<T, SeqError>;

// Everything except MalformedProject is recoverable: callers log it and move on.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SeqError {
    #[error("invalid pitch '{0}'")]
    InvalidPitch(String),

    #[error("'{value}' is not a valid {column} value")]
    InvalidCellValue { column: Column, value: String },

    #[error("row {row} is out of range (pattern has {len} rows)")]
    RowOutOfRange { row: usize, len: usize },

    #[error("no track with id {0}")]
    UnknownTrack(TrackId),

    #[error("tempo must be a positive number of beats per minute, got {0}")]
    InvalidTempo(f64),

    #[error("voice {0} already stopped")]
    VoiceAlreadyStopped(VoiceId),

    #[error("no track ids left")]
    TrackIdsExhausted,

    #[error("audio output is suspended")]
    OutputSuspended,

    #[error("offline rendering is not available on a realtime output")]
    OfflineOnly,

    #[error("malformed project: {0}")]
    MalformedProject(String),
}

impl From<serde_json::Error> for SeqError {
    fn from(err: serde_json::Error) -> Self {
        SeqError::MalformedProject(err.to_string())
    }
}
