// States: the unit the model learns and generates.
//
// A `State` is one event cluster: a group of overlapping notes together with
// the silence that follows them. It carries a set of named viewpoint values
// (pitch set, durations, dynamic, ...) that the model predicts on, plus the
// raw note events needed to turn it back into MIDI. The model never looks at
// the note events; the serializer never looks at anything else except
// `total_duration`.
//
// Once a state is inserted into a model it is given a position, its index in
// the model's training sequence. Generated states are clones of trained
// states, so their position tells you where in the source they came from
// (see stats.rs for the plagiarism measures built on this).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Index of a state in a model's training sequence.
pub type Position = usize;

/// A raw viewpoint value.
///
/// Floats and sets are not usable as hash keys directly; `Alphabet` keys them
/// through `ValueKey` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    /// Unordered collection, e.g. the pitches sounding in a state.
    Set(BTreeSet<i64>),
}

/// Hashable canonical form of a `Value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ValueKey {
    Int(i64),
    Float(u64),
    Text(String),
    Set(Vec<i64>),
}

impl Value {
    pub(crate) fn key(&self) -> ValueKey {
        match self {
            Value::Int(v) => ValueKey::Int(*v),
            Value::Float(v) => ValueKey::Float(float_bits(*v)),
            Value::Text(s) => ValueKey::Text(s.clone()),
            Value::Set(set) => ValueKey::Set(set.iter().copied().collect()),
        }
    }

    /// Numeric view of an `Int` or `Float`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// Bit pattern with -0.0 folded into 0.0 and every NaN folded into one.
fn float_bits(v: f64) -> u64 {
    if v == 0.0 {
        0.0f64.to_bits()
    } else if v.is_nan() {
        f64::NAN.to_bits()
    } else {
        v.to_bits()
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<BTreeSet<i64>> for Value {
    fn from(v: BTreeSet<i64>) -> Self {
        Value::Set(v)
    }
}

/// One note inside a state. Times are in beats from the state's start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    pub pitch: u8,
    pub velocity: u8,
    pub start: f64,
    pub end: f64,
}

/// One event cluster with its viewpoint values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    values: BTreeMap<String, Value>,
    notes: Vec<NoteEvent>,
    position: Option<Position>,
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of `set`.
    pub fn with(mut self, viewpoint: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(viewpoint, value);
        self
    }

    /// Set a viewpoint value, returning the previous one.
    pub fn set(&mut self, viewpoint: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(viewpoint.into(), value.into())
    }

    pub fn get(&self, viewpoint: &str) -> Option<&Value> {
        self.values.get(viewpoint)
    }

    /// Numeric value of a viewpoint, if present and numeric.
    pub fn number(&self, viewpoint: &str) -> Option<f64> {
        self.get(viewpoint).and_then(Value::as_f64)
    }

    pub fn viewpoints(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn push_note(&mut self, note: NoteEvent) {
        self.notes.push(note);
    }

    /// Position in the training sequence, once inserted into a model.
    pub fn position(&self) -> Option<Position> {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: Position) {
        self.position = Some(position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_keys_fold_signed_zero() {
        assert_eq!(Value::Float(0.0).key(), Value::Float(-0.0).key());
        assert_ne!(Value::Float(0.5).key(), Value::Float(0.25).key());
    }

    #[test]
    fn set_keys_ignore_insertion_order() {
        let a: BTreeSet<i64> = [64, 60, 67].into_iter().collect();
        let b: BTreeSet<i64> = [67, 64, 60].into_iter().collect();
        assert_eq!(Value::Set(a).key(), Value::Set(b).key());
    }

    #[test]
    fn int_and_float_keys_differ() {
        assert_ne!(Value::Int(1).key(), Value::Float(1.0).key());
    }

    #[test]
    fn builder_and_lookup() {
        let state = State::new().with("letter", "A").with("total_duration", 1.5);
        assert_eq!(state.get("letter"), Some(&Value::Text("A".into())));
        assert_eq!(state.number("total_duration"), Some(1.5));
        assert_eq!(state.number("letter"), None);
        assert_eq!(state.position(), None);
        let names: Vec<&str> = state.viewpoints().collect();
        assert_eq!(names, vec!["letter", "total_duration"]);
    }

    #[test]
    fn state_serializes() {
        let mut state = State::new().with("pitches", BTreeSet::from([60i64, 64]));
        state.push_note(NoteEvent {
            pitch: 60,
            velocity: 80,
            start: 0.0,
            end: 1.0,
        });
        let json = serde_json::to_string(&state).unwrap();
        let restored: State = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, state);
    }
}
