// Context trie: the variable-order Markov predictor for one viewpoint.
//
// The trie records, for every context seen in training, which positions
// followed it. It is built "upside down": each root is keyed by the most
// recent context value, and walking down the trie moves back in time. A node
// at depth k therefore holds every position that was preceded by exactly the
// k-value run spelled by its path.
//
// Rooting at the newest value makes back-off fall out of the walk: a query
// descends as far as the context keeps matching and answers with the deepest
// node it reached, so the oldest context is the first to be dropped when the
// full context was never seen.
//
// Nodes live in an arena (`Vec<Node>`) addressed by index. Each node maps the
// next-older context value to its child, so a step costs one hash lookup and
// insert/query are O(context length).
//
// Contexts are passed oldest-first everywhere, matching the order in which
// states appear in a sequence.

use crate::alphabet::Code;
use crate::state::Position;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::hash::Hash;

/// Positions that followed a context, in ascending order.
pub type ContinuationSet = BTreeSet<Position>;

type NodeId = usize;

#[derive(Debug, Clone)]
struct Node<K> {
    continuations: ContinuationSet,
    children: FxHashMap<K, NodeId>,
}

impl<K> Node<K> {
    fn new() -> Self {
        Node {
            continuations: ContinuationSet::new(),
            children: FxHashMap::default(),
        }
    }
}

/// Result of a longest-available-match query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match<'a> {
    /// Number of context values matched, newest first. Always >= 1.
    pub depth: usize,
    pub continuations: &'a ContinuationSet,
}

/// Context trie over values of type `K` (alphabet codes in the model).
#[derive(Debug, Clone)]
pub struct ContextTrie<K = Code> {
    nodes: Vec<Node<K>>,
    roots: FxHashMap<K, NodeId>,
}

impl<K: Eq + Hash + Clone> Default for ContextTrie<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> ContextTrie<K> {
    pub fn new() -> Self {
        ContextTrie {
            nodes: Vec::new(),
            roots: FxHashMap::default(),
        }
    }

    /// Record that `position` followed `context` (oldest-first).
    ///
    /// The position is added to every node on the path, root included. An
    /// empty context records nothing.
    pub fn insert(&mut self, position: Position, context: &[K]) {
        let mut older = context.iter().rev();
        let Some(newest) = older.next() else {
            return;
        };

        let mut current = match self.roots.get(newest) {
            Some(&id) => id,
            None => {
                let id = self.alloc();
                self.roots.insert(newest.clone(), id);
                id
            }
        };
        self.nodes[current].continuations.insert(position);

        for value in older {
            current = self.child_or_insert(current, value);
            self.nodes[current].continuations.insert(position);
        }
    }

    /// Continuations of the longest suffix of `context` seen in training.
    ///
    /// `None` when the context is empty or its newest value never started a
    /// context.
    pub fn query(&self, context: &[K]) -> Option<&ContinuationSet> {
        self.longest_match(context).map(|m| m.continuations)
    }

    /// Like `query`, also reporting how many context values matched.
    pub fn longest_match(&self, context: &[K]) -> Option<Match<'_>> {
        let mut older = context.iter().rev();
        let newest = older.next()?;
        let mut current = *self.roots.get(newest)?;
        let mut depth = 1;

        for value in older {
            match self.nodes[current].children.get(value) {
                Some(&child) => {
                    current = child;
                    depth += 1;
                }
                None => break,
            }
        }

        Some(Match {
            depth,
            continuations: &self.nodes[current].continuations,
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn root_count(&self) -> usize {
        self.roots.len()
    }

    fn alloc(&mut self) -> NodeId {
        self.nodes.push(Node::new());
        self.nodes.len() - 1
    }

    fn child_or_insert(&mut self, parent: NodeId, value: &K) -> NodeId {
        if let Some(&child) = self.nodes[parent].children.get(value) {
            return child;
        }
        let child = self.alloc();
        self.nodes[parent].children.insert(value.clone(), child);
        child
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(positions: &[Position]) -> ContinuationSet {
        positions.iter().copied().collect()
    }

    /// Train on `sequence` the way the model does: every position with up to
    /// `max_order` preceding values.
    fn train(trie: &mut ContextTrie<char>, sequence: &[char], offset: usize, max_order: usize) {
        for i in 0..sequence.len() {
            let start = i.saturating_sub(max_order);
            trie.insert(offset + i, &sequence[start..i]);
        }
    }

    #[test]
    fn empty_trie_and_empty_context() {
        let mut trie: ContextTrie<char> = ContextTrie::new();
        assert!(trie.query(&['A']).is_none());
        trie.insert(0, &[]);
        assert_eq!(trie.node_count(), 0);
        trie.insert(1, &['A']);
        assert!(trie.query(&[]).is_none());
    }

    #[test]
    fn abcda_order_two() {
        let mut trie = ContextTrie::new();
        train(&mut trie, &['A', 'B', 'C', 'D', 'A'], 0, 2);

        assert_eq!(trie.query(&['A', 'B']), Some(&set(&[2])));
        assert_eq!(trie.query(&['A']), Some(&set(&[1])));
        assert_eq!(trie.query(&['C', 'D']), Some(&set(&[4])));
        assert!(trie.query(&['Z']).is_none());
        // Newest value unseen as a context: no match even though A is known.
        assert!(trie.query(&['A', 'Z']).is_none());
    }

    #[test]
    fn shared_prefixes_aggregate_continuations() {
        let mut trie = ContextTrie::new();
        train(&mut trie, &['A', 'B', 'C', 'D'], 0, 8);
        train(&mut trie, &['A', 'B', 'B', 'C'], 4, 8);

        // Every position preceded by B.
        assert_eq!(trie.query(&['B']), Some(&set(&[2, 6, 7])));
        // Preceded by A,B.
        assert_eq!(trie.query(&['A', 'B']), Some(&set(&[2, 6])));
        // Preceded by B,B.
        assert_eq!(trie.query(&['B', 'B']), Some(&set(&[7])));
    }

    #[test]
    fn backs_off_to_deepest_matching_node() {
        let mut trie = ContextTrie::new();
        train(&mut trie, &['A', 'B', 'C', 'D'], 0, 8);
        train(&mut trie, &['A', 'B', 'B', 'C'], 4, 8);

        // X,A,B was never seen; the walk stops after B <- A.
        let m = trie.longest_match(&['X', 'A', 'B']).unwrap();
        assert_eq!(m.depth, 2);
        assert_eq!(m.continuations, &set(&[2, 6]));

        // Q,B was never seen; only the root matches.
        let m = trie.longest_match(&['Q', 'B']).unwrap();
        assert_eq!(m.depth, 1);
        assert_eq!(m.continuations, &set(&[2, 6, 7]));
    }

    #[test]
    fn never_returns_shorter_match_than_available() {
        let sequence: Vec<char> = "ABRACADABRA".chars().collect();
        let mut trie = ContextTrie::new();
        train(&mut trie, &sequence, 0, 4);

        // The second "RA" ends the sequence, so only index 4 followed one.
        assert_eq!(trie.query(&['R', 'A']), Some(&set(&[4])));
        // Longer, seen context narrows further.
        let m = trie.longest_match(&['A', 'B', 'R', 'A']).unwrap();
        assert_eq!(m.depth, 4);
        assert_eq!(m.continuations, &set(&[4]));
        // The shorter suffix alone is strictly more general.
        assert_eq!(trie.query(&['A']), Some(&set(&[1, 4, 6, 8])));
    }

    #[test]
    fn node_counts() {
        let mut trie = ContextTrie::new();
        trie.insert(0, &['A', 'B']);
        trie.insert(1, &['C', 'B']);
        // Root B with children A and C.
        assert_eq!(trie.root_count(), 1);
        assert_eq!(trie.node_count(), 3);
    }
}
