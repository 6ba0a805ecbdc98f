// Viewpoint names and derived-viewpoint reductions.
//
// The MIDI ingester always fills the four core viewpoints (pitch set and the
// three durations). Everything else is an enrichment pass over states that
// are already built: `add_derived` computes a value per state from its notes
// and existing viewpoints, `add_constant` stamps the same value on every
// state (file-level facts like the time signature).

use crate::state::{State, Value};

pub const PITCHES: &str = "pitches";
pub const ON_DURATION: &str = "on_duration";
pub const OFF_DURATION: &str = "off_duration";
pub const TOTAL_DURATION: &str = "total_duration";
pub const DYNAMIC: &str = "dynamic";
pub const DENSITY: &str = "density";
pub const TIME_SIGNATURE: &str = "time_signature";
pub const KEY_SIGNATURE: &str = "key_signature";

/// Viewpoints every ingested state carries.
pub const CORE: [&str; 4] = [PITCHES, ON_DURATION, OFF_DURATION, TOTAL_DURATION];

/// Set `viewpoint` on every state to `reduce(state)`.
pub fn add_derived<F>(states: &mut [State], viewpoint: &str, reduce: F)
where
    F: Fn(&State) -> Value,
{
    for state in states {
        let value = reduce(&*state);
        state.set(viewpoint, value);
    }
}

/// Set `viewpoint` on every state to the same value.
pub fn add_constant(states: &mut [State], viewpoint: &str, value: &Value) {
    add_derived(states, viewpoint, |_| value.clone());
}

/// Mean note velocity bucketed into the eight dynamic markings.
pub fn dynamic(state: &State) -> Value {
    let notes = state.notes();
    if notes.is_empty() {
        return Value::from("none");
    }
    let mean = notes.iter().map(|n| n.velocity as f64).sum::<f64>() / notes.len() as f64;
    let marking = match mean {
        m if m <= 16.0 => "ppp",
        m if m <= 32.0 => "pp",
        m if m <= 48.0 => "p",
        m if m <= 64.0 => "mp",
        m if m <= 80.0 => "mf",
        m if m <= 96.0 => "f",
        m if m <= 112.0 => "ff",
        _ => "fff",
    };
    Value::from(marking)
}

/// Note events per beat of sounding time; 0 for a state with no sounding time.
pub fn density(state: &State) -> Value {
    let on = state.number(ON_DURATION).unwrap_or(0.0);
    if on <= 0.0 {
        return Value::Float(0.0);
    }
    Value::Float(state.notes().len() as f64 / on)
}
