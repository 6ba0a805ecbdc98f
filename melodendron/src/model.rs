// Multiple-viewpoint variable-order Markov model.
//
// The model owns the training sequence of states and, for each configured
// viewpoint, an alphabet and a context trie. Every insertion goes to all
// viewpoints at once with the same position, so the tries agree on what a
// position means: whichever trie proposes position p, p names the same
// stored state.
//
// Prediction (`next`) projects the context onto each viewpoint, asks each
// trie for its longest-match continuations, and lets a `Selector` fuse the
// results. If the selector declines, the model draws a uniformly random
// trained state instead, so generation never stalls.
//
// `generate` is the generation loop: a seed of `order` distinct trained
// states drawn at random, then one `next` per remaining output using the last
// `order` outputs as context. The seed is not predicted; callers should
// treat it as cold-start material.
//
// All randomness comes from the `Prng` the caller passes in.

use crate::alphabet::{Alphabet, Code};
use crate::error::{Error, Result};
use crate::selector::{Candidates, Selector};
use crate::state::{Position, State, Value};
use crate::trie::ContextTrie;
use melodendron_prng::Prng;
use tracing::{debug, warn};

/// One prediction channel: a named projection with its own alphabet and trie.
#[derive(Debug, Clone)]
struct Viewpoint {
    name: String,
    alphabet: Alphabet,
    trie: ContextTrie<Code>,
}

/// How `next` arrived at a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Choice {
    Selected(Position),
    Fallback(Position),
}

impl Choice {
    fn position(self) -> Position {
        match self {
            Choice::Selected(p) | Choice::Fallback(p) => p,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Model {
    viewpoints: Vec<Viewpoint>,
    states: Vec<State>,
    max_order: usize,
}

impl Model {
    /// Create an untrained model over the given viewpoints.
    ///
    /// Contexts longer than `max_order` are trimmed to their newest
    /// `max_order` states, both in training and in prediction.
    pub fn new<I, S>(viewpoints: I, max_order: usize) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut built: Vec<Viewpoint> = Vec::new();
        for name in viewpoints {
            let name = name.into();
            if built.iter().any(|v| v.name == name) {
                return Err(Error::DuplicateViewpoint(name));
            }
            built.push(Viewpoint {
                name,
                alphabet: Alphabet::new(),
                trie: ContextTrie::new(),
            });
        }
        if built.is_empty() {
            return Err(Error::NoViewpoints);
        }
        Ok(Model {
            viewpoints: built,
            states: Vec::new(),
            max_order,
        })
    }

    pub fn viewpoints(&self) -> impl Iterator<Item = &str> {
        self.viewpoints.iter().map(|v| v.name.as_str())
    }

    pub fn max_order(&self) -> usize {
        self.max_order
    }

    /// The training sequence, indexed by position.
    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn state(&self, position: Position) -> Option<&State> {
        self.states.get(position)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The context trie of one viewpoint.
    pub fn trie(&self, viewpoint: &str) -> Result<&ContextTrie<Code>> {
        self.find(viewpoint).map(|v| &v.trie)
    }

    /// The alphabet of one viewpoint.
    pub fn alphabet(&self, viewpoint: &str) -> Result<&Alphabet> {
        self.find(viewpoint).map(|v| &v.alphabet)
    }

    /// Append `state` to the training sequence and record it in every trie
    /// as the continuation of `context` (oldest-first, the states that
    /// immediately preceded it).
    ///
    /// Fails without modifying the model if any state lacks a configured
    /// viewpoint.
    pub fn insert(&mut self, mut state: State, context: &[State]) -> Result<Position> {
        let context = self.trim(context);
        self.check(&state)?;
        for s in context {
            self.check(s)?;
        }

        let position = self.states.len();
        for viewpoint in &mut self.viewpoints {
            viewpoint.alphabet.encode(viewpoint_value(&state, &viewpoint.name)?);
            let codes = context
                .iter()
                .map(|s| {
                    let value = viewpoint_value(s, &viewpoint.name)?;
                    Ok(viewpoint.alphabet.encode(value))
                })
                .collect::<Result<Vec<Code>>>()?;
            viewpoint.trie.insert(position, &codes);
        }

        state.set_position(position);
        self.states.push(state);
        Ok(position)
    }

    /// Train on a whole sequence: every state is inserted with up to
    /// `max_order` of the states before it as context.
    ///
    /// Early states get whatever shorter context exists. A `max_order` above
    /// the model's own is capped by it. Every state is checked first, so a
    /// state missing a viewpoint leaves the model untouched.
    pub fn ingest(&mut self, states: &[State], max_order: usize) -> Result<()> {
        for state in states {
            self.check(state)?;
        }
        let max_order = max_order.min(self.max_order);
        for (i, state) in states.iter().enumerate() {
            let start = i.saturating_sub(max_order);
            self.insert(state.clone(), &states[start..i])?;
        }
        for viewpoint in &self.viewpoints {
            debug!(
                viewpoint = %viewpoint.name,
                symbols = viewpoint.alphabet.len(),
                roots = viewpoint.trie.root_count(),
                nodes = viewpoint.trie.node_count(),
                "viewpoint trained"
            );
        }
        debug!(
            ingested = states.len(),
            total = self.states.len(),
            max_order,
            "ingest complete"
        );
        Ok(())
    }

    /// Query every viewpoint's trie for the continuations of `context`.
    pub fn candidates(&self, context: &[State]) -> Result<Candidates<'_>> {
        let context = self.trim(context);
        let mut candidates = Candidates::new();
        for viewpoint in &self.viewpoints {
            let codes = project_query(viewpoint, context)?;
            candidates.push(&viewpoint.name, viewpoint.trie.query(&codes));
        }
        Ok(candidates)
    }

    /// Predict the state that follows `context`.
    ///
    /// Returns the stored state at the position the selector picks, or a
    /// uniformly random stored state if it picks nothing.
    pub fn next<S>(&self, context: &[State], selector: &S, rng: &mut Prng) -> Result<&State>
    where
        S: Selector + ?Sized,
    {
        let position = self.choose(context, selector, rng)?.position();
        self.states.get(position).ok_or(Error::EmptyModel)
    }

    /// `n` distinct trained states drawn uniformly.
    pub fn random_states(&self, n: usize, rng: &mut Prng) -> Result<Vec<&State>> {
        if n > self.states.len() {
            return Err(Error::InsufficientData {
                requested: n,
                available: self.states.len(),
            });
        }
        Ok(rng
            .sample_indices(self.states.len(), n)
            .into_iter()
            .map(|p| &self.states[p])
            .collect())
    }

    /// Generate exactly `n` states.
    ///
    /// The first `order` (or `n`, if smaller) are a random seed drawn without
    /// replacement; each later state is predicted from the previous `order`
    /// outputs. Fails if the model holds fewer than `order` states.
    pub fn generate<S>(
        &self,
        n: usize,
        selector: &S,
        order: usize,
        rng: &mut Prng,
    ) -> Result<Vec<State>>
    where
        S: Selector + ?Sized,
    {
        if order > self.states.len() {
            return Err(Error::InsufficientData {
                requested: order,
                available: self.states.len(),
            });
        }

        let mut output: Vec<State> = self
            .random_states(order.min(n), rng)?
            .into_iter()
            .cloned()
            .collect();

        let mut fallbacks = 0usize;
        while output.len() < n {
            let start = output.len().saturating_sub(order);
            let choice = self.choose(&output[start..], selector, rng)?;
            if let Choice::Fallback(_) = choice {
                fallbacks += 1;
            }
            let state = self.states.get(choice.position()).ok_or(Error::EmptyModel)?;
            output.push(state.clone());
        }

        debug!(n, order, fallbacks, "generation complete");
        Ok(output)
    }

    fn choose<S>(&self, context: &[State], selector: &S, rng: &mut Prng) -> Result<Choice>
    where
        S: Selector + ?Sized,
    {
        if self.states.is_empty() {
            return Err(Error::EmptyModel);
        }
        let candidates = self.candidates(context)?;
        match selector.select(&candidates, rng) {
            Some(position) if position < self.states.len() => Ok(Choice::Selected(position)),
            selected => {
                if let Some(position) = selected {
                    warn!(
                        position,
                        len = self.states.len(),
                        "selector returned an unknown position"
                    );
                }
                let position = rng.range_usize(0, self.states.len());
                debug!(position, "no decision, drawing uniformly");
                Ok(Choice::Fallback(position))
            }
        }
    }

    fn find(&self, viewpoint: &str) -> Result<&Viewpoint> {
        self.viewpoints
            .iter()
            .find(|v| v.name == viewpoint)
            .ok_or_else(|| Error::UnknownViewpoint(viewpoint.to_string()))
    }

    fn check(&self, state: &State) -> Result<()> {
        for viewpoint in &self.viewpoints {
            viewpoint_value(state, &viewpoint.name)?;
        }
        Ok(())
    }

    fn trim<'c>(&self, context: &'c [State]) -> &'c [State] {
        &context[context.len().saturating_sub(self.max_order)..]
    }
}

fn viewpoint_value<'s>(state: &'s State, viewpoint: &str) -> Result<&'s Value> {
    state
        .get(viewpoint)
        .ok_or_else(|| Error::MissingViewpoint(viewpoint.to_string()))
}

/// Codes of the context for a query, oldest-first.
///
/// A value the alphabet has never seen cannot appear on any trie path, so
/// only the values newer than the newest unseen one are kept.
fn project_query(viewpoint: &Viewpoint, context: &[State]) -> Result<Vec<Code>> {
    let mut codes = Vec::with_capacity(context.len());
    for state in context {
        match viewpoint.alphabet.code(viewpoint_value(state, &viewpoint.name)?) {
            Some(code) => codes.push(code),
            None => codes.clear(),
        }
    }
    Ok(codes)
}
