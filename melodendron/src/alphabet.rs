// Per-viewpoint alphabet: raw values to dense integer codes.
//
// The context tries are keyed by `Code`, never by raw values. The first time
// a value is seen it is given the next unused code; equal values always get
// the same code and codes are never recycled, so a code is stable for the
// lifetime of the model that owns the alphabet.
//
// Training grows the alphabet (`encode`). Querying only looks codes up
// (`code`): a value never seen in training has no code, and since no trie
// path can contain it the caller treats it as the end of the usable context.

use crate::state::{Value, ValueKey};
use rustc_hash::FxHashMap;

/// Dense integer code for a viewpoint value.
pub type Code = u32;

#[derive(Debug, Clone, Default)]
pub struct Alphabet {
    codes: FxHashMap<ValueKey, Code>,
    values: Vec<Value>,
}

impl Alphabet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Code for `value`, allocating the next one on first sight.
    pub fn encode(&mut self, value: &Value) -> Code {
        let key = value.key();
        if let Some(&code) = self.codes.get(&key) {
            return code;
        }
        let code = self.values.len() as Code;
        self.codes.insert(key, code);
        self.values.push(value.clone());
        code
    }

    /// Code for `value` without growing the alphabet.
    pub fn code(&self, value: &Value) -> Option<Code> {
        self.codes.get(&value.key()).copied()
    }

    /// The first-seen raw value behind `code`.
    pub fn decode(&self, code: Code) -> Option<&Value> {
        self.values.get(code as usize)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
