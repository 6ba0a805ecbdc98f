// Error type shared by the whole library.
//
// "No match" and "no decision" are not errors: the trie and the selection
// policies report them as `None`, and `Model::next` recovers with a uniform
// draw. Everything here is either a caller mistake (unknown viewpoint, too
// little training data) or a failure at the MIDI/JSON boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("model needs at least one viewpoint")]
    NoViewpoints,

    #[error("viewpoint '{0}' is configured more than once")]
    DuplicateViewpoint(String),

    #[error("unknown viewpoint '{0}'")]
    UnknownViewpoint(String),

    #[error("state is missing viewpoint '{0}'")]
    MissingViewpoint(String),

    #[error("cannot seed {requested} states from a model trained on {available}")]
    InsufficientData {
        requested: usize,
        available: usize,
    },

    #[error("model has no trained states")]
    EmptyModel,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("MIDI decode error: {0}")]
    Midi(#[from] midly::Error),

    #[error("unsupported MIDI timing: only metrical (ticks per beat) files are supported")]
    UnsupportedTiming,

    #[error("{field} {value} does not fit in a MIDI file")]
    MidiRange {
        field: &'static str,
        value: u64,
    },

    #[error("track {index} out of range (file has {count} tracks)")]
    TrackOutOfRange {
        index: usize,
        count: usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
