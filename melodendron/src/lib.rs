// Melodendron: style-imitating music generation with a multiple-viewpoint
// variable-order Markov model.
//
// A source piece is cut into states (clusters of overlapping notes). Each
// state is described from several viewpoints (pitch set, durations, dynamic,
// ...), and each viewpoint gets its own context trie recording which
// positions of the source followed which contexts. Generation queries every
// trie with the recent output, fuses their proposals with a selection
// policy, and emits the chosen source state. The result locally resembles the
// source without reproducing long stretches of it.
//
// Architecture:
// - state.rs: States, viewpoint values, note events
// - alphabet.rs: Per-viewpoint dense integer codes for raw values
// - trie.rs: Context trie with longest-available-match queries
// - model.rs: Multiple-viewpoint model, training and the generation loop
// - selector.rs: Selection policies fusing per-viewpoint candidates
// - viewpoint.rs: Viewpoint names and derived-viewpoint enrichment
// - midi.rs: MIDI file to states, states to MIDI file
// - stats.rs: Sequence and plagiarism summaries
// - config.rs: JSON-loadable generator configuration
// - error.rs: Library error type
//
// All randomness goes through a caller-supplied `melodendron_prng::Prng`, so
// a seed reproduces a run exactly.

pub mod alphabet;
pub mod config;
pub mod error;
pub mod midi;
pub mod model;
pub mod selector;
pub mod state;
pub mod stats;
pub mod trie;
pub mod viewpoint;

pub use error::{Error, Result};
pub use model::Model;
pub use selector::{Candidates, Policy, Selector};
pub use state::{NoteEvent, Position, State, Value};
