// Selection policies: fusing per-viewpoint predictions into one decision.
//
// `Model::next` queries every viewpoint's trie and hands the results to a
// selector as a `Candidates` map. A viewpoint whose trie found no match is
// present in the map with `None`; every policy skips such entries rather than
// treating them as an empty set. A selector answers with one position or
// `None` ("no decision"), in which case the model falls back to a uniform
// draw over the whole training sequence.
//
// Four policies are provided as variants of `Policy`:
// - UniformUnion: pool every candidate (with multiplicity) and draw one.
// - StrictIntersection: draw from positions proposed by every present
//   viewpoint.
// - InverseSizeWeighted: a viewpoint proposing k positions gives each 1/k;
//   weights sum across viewpoints, so selective viewpoints count more.
// - ExponentialWeighted: the same weights remapped through exp(w * f) - 1,
//   sharpening the contrast as the factor f grows.
//
// Any closure `Fn(&Candidates, &mut Prng) -> Option<Position>` is also a
// `Selector`, so callers can plug in their own fusion rule.

use crate::error::Error;
use crate::state::Position;
use crate::trie::ContinuationSet;
use melodendron_prng::Prng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Per-viewpoint query results, in the model's viewpoint order.
#[derive(Debug, Clone, Default)]
pub struct Candidates<'a> {
    entries: Vec<(&'a str, Option<&'a ContinuationSet>)>,
}

impl<'a> Candidates<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, viewpoint: &'a str, continuations: Option<&'a ContinuationSet>) {
        self.entries.push((viewpoint, continuations));
    }

    /// Result for one viewpoint; `None` if it is absent or had no match.
    pub fn get(&self, viewpoint: &str) -> Option<&'a ContinuationSet> {
        self.entries
            .iter()
            .find(|(name, _)| *name == viewpoint)
            .and_then(|(_, set)| *set)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'a str, Option<&'a ContinuationSet>)> + '_ {
        self.entries.iter().copied()
    }

    /// Sets of the viewpoints that found a match.
    pub fn present(&self) -> impl Iterator<Item = &'a ContinuationSet> + '_ {
        self.entries.iter().filter_map(|(_, set)| *set)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, Option<&'a ContinuationSet>)> for Candidates<'a> {
    fn from_iter<I: IntoIterator<Item = (&'a str, Option<&'a ContinuationSet>)>>(iter: I) -> Self {
        Candidates {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Chooses the next position from the candidates, or declines.
pub trait Selector {
    fn select(&self, candidates: &Candidates<'_>, rng: &mut Prng) -> Option<Position>;
}

impl<F> Selector for F
where
    F: Fn(&Candidates<'_>, &mut Prng) -> Option<Position>,
{
    fn select(&self, candidates: &Candidates<'_>, rng: &mut Prng) -> Option<Position> {
        self(candidates, rng)
    }
}

/// The built-in selection policies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Policy {
    UniformUnion,
    StrictIntersection,
    InverseSizeWeighted,
    ExponentialWeighted {
        #[serde(default = "default_factor")]
        factor: f64,
    },
}

fn default_factor() -> f64 {
    1.0
}

impl Default for Policy {
    fn default() -> Self {
        Policy::ExponentialWeighted {
            factor: default_factor(),
        }
    }
}

impl Selector for Policy {
    fn select(&self, candidates: &Candidates<'_>, rng: &mut Prng) -> Option<Position> {
        let selected = match *self {
            Policy::UniformUnion => uniform_union(candidates, rng),
            Policy::StrictIntersection => strict_intersection(candidates, rng),
            Policy::InverseSizeWeighted => inverse_size_weighted(candidates, rng),
            Policy::ExponentialWeighted { factor } => exponential_weighted(candidates, factor, rng),
        };
        tracing::trace!(policy = ?self, ?selected, "selection");
        selected
    }
}

impl FromStr for Policy {
    type Err = Error;

    /// Parse a policy name. The exponential policy gets the default factor.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "uniform" | "uniform_union" | "union" => Ok(Policy::UniformUnion),
            "intersection" | "strict_intersection" | "intersect" => Ok(Policy::StrictIntersection),
            "weighted" | "inverse_size_weighted" => Ok(Policy::InverseSizeWeighted),
            "exponential" | "exponential_weighted" | "exp" => Ok(Policy::default()),
            other => Err(Error::InvalidConfig(format!("unknown policy '{other}'"))),
        }
    }
}

/// Uniform draw from the multiset union of all present candidates.
pub fn uniform_union(candidates: &Candidates<'_>, rng: &mut Prng) -> Option<Position> {
    let pooled: Vec<Position> = candidates.present().flatten().copied().collect();
    rng.choose(&pooled).copied()
}

/// Uniform draw from the positions every present viewpoint proposes.
pub fn strict_intersection(candidates: &Candidates<'_>, rng: &mut Prng) -> Option<Position> {
    let mut sets = candidates.present();
    let first = sets.next()?;
    let mut common: Vec<Position> = first.iter().copied().collect();
    for set in sets {
        common.retain(|p| set.contains(p));
    }
    rng.choose(&common).copied()
}

/// Weighted draw where each viewpoint gives 1/|its set| to each proposal.
pub fn inverse_size_weighted(candidates: &Candidates<'_>, rng: &mut Prng) -> Option<Position> {
    weighted_draw(&inverse_size_weights(candidates), rng)
}

/// Inverse-size weights remapped through exp(w * factor) - 1, then drawn.
///
/// A factor <= 0 makes every weight non-positive, which is "no decision".
pub fn exponential_weighted(
    candidates: &Candidates<'_>,
    factor: f64,
    rng: &mut Prng,
) -> Option<Position> {
    let weights = exponential_remap(inverse_size_weights(candidates), factor);
    weighted_draw(&weights, rng)
}

/// Pre-remap weight of every candidate position.
pub fn inverse_size_weights(candidates: &Candidates<'_>) -> BTreeMap<Position, f64> {
    let mut weights = BTreeMap::new();
    for set in candidates.present() {
        if set.is_empty() {
            continue;
        }
        let share = 1.0 / set.len() as f64;
        for &position in set {
            *weights.entry(position).or_insert(0.0) += share;
        }
    }
    weights
}

/// w -> exp(w * factor) - 1: monotonic and maps 0 to 0.
///
/// With a positive peak exponent every weight is scaled by exp(-peak), so
/// the largest remapped weight is at most 1 and large factors cannot
/// overflow. Scaling leaves the draw proportions unchanged.
pub fn exponential_remap(
    mut weights: BTreeMap<Position, f64>,
    factor: f64,
) -> BTreeMap<Position, f64> {
    let peak = weights
        .values()
        .map(|w| w * factor)
        .fold(f64::NEG_INFINITY, f64::max);
    if peak.is_finite() && peak > 0.0 {
        let floor = (-peak).exp();
        for weight in weights.values_mut() {
            *weight = (*weight * factor - peak).exp() - floor;
        }
    } else {
        for weight in weights.values_mut() {
            *weight = (*weight * factor).exp_m1();
        }
    }
    weights
}

fn weighted_draw(weights: &BTreeMap<Position, f64>, rng: &mut Prng) -> Option<Position> {
    let (positions, values): (Vec<Position>, Vec<f64>) =
        weights.iter().map(|(&p, &w)| (p, w)).unzip();
    rng.weighted_index(&values).map(|i| positions[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(positions: &[Position]) -> ContinuationSet {
        positions.iter().copied().collect()
    }

    #[test]
    fn intersection_draws_only_common_positions() {
        let (v1, v2) = (set(&[3, 5]), set(&[5, 7]));
        let candidates: Candidates = [("v1", Some(&v1)), ("v2", Some(&v2))].into_iter().collect();
        let mut rng = Prng::new(1);
        for _ in 0..200 {
            assert_eq!(strict_intersection(&candidates, &mut rng), Some(5));
        }
    }

    #[test]
    fn union_reaches_every_proposal() {
        let (v1, v2) = (set(&[3, 5]), set(&[5, 7]));
        let candidates: Candidates = [("v1", Some(&v1)), ("v2", Some(&v2))].into_iter().collect();
        let mut rng = Prng::new(2);
        let mut seen = BTreeMap::new();
        for _ in 0..2000 {
            let p = uniform_union(&candidates, &mut rng).unwrap();
            *seen.entry(p).or_insert(0) += 1;
        }
        assert_eq!(seen.keys().copied().collect::<Vec<_>>(), vec![3, 5, 7]);
        // 5 appears twice in the multiset, so it is drawn about twice as often.
        assert!(seen[&5] > seen[&3] && seen[&5] > seen[&7]);
    }

    #[test]
    fn absent_viewpoints_do_not_veto() {
        let v1 = set(&[4, 9]);
        let candidates: Candidates = [("v1", Some(&v1)), ("v2", None)].into_iter().collect();
        let mut rng = Prng::new(3);
        for _ in 0..100 {
            let p = strict_intersection(&candidates, &mut rng).unwrap();
            assert!(v1.contains(&p));
            let p = uniform_union(&candidates, &mut rng).unwrap();
            assert!(v1.contains(&p));
        }
    }

    #[test]
    fn nothing_present_is_no_decision() {
        let candidates: Candidates = [("v1", None), ("v2", None)].into_iter().collect();
        let mut rng = Prng::new(4);
        for policy in [
            Policy::UniformUnion,
            Policy::StrictIntersection,
            Policy::InverseSizeWeighted,
            Policy::default(),
        ] {
            assert_eq!(policy.select(&candidates, &mut rng), None, "{policy:?}");
        }
        let empty = Candidates::new();
        assert_eq!(Policy::UniformUnion.select(&empty, &mut rng), None);
    }

    #[test]
    fn disjoint_intersection_is_no_decision() {
        let (v1, v2) = (set(&[1]), set(&[2]));
        let candidates: Candidates = [("v1", Some(&v1)), ("v2", Some(&v2))].into_iter().collect();
        let mut rng = Prng::new(5);
        assert_eq!(strict_intersection(&candidates, &mut rng), None);
    }

    #[test]
    fn inverse_size_weights_sum_over_viewpoints() {
        let (v1, v2, v3) = (set(&[3, 5]), set(&[5, 7]), set(&[5]));
        let candidates: Candidates = [
            ("v1", Some(&v1)),
            ("v2", Some(&v2)),
            ("v3", Some(&v3)),
            ("v4", None),
        ]
        .into_iter()
        .collect();
        let weights = inverse_size_weights(&candidates);
        assert_eq!(weights.len(), 3);
        assert!((weights[&3] - 0.5).abs() < 1e-12);
        assert!((weights[&5] - 2.0).abs() < 1e-12);
        assert!((weights[&7] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn exponential_remap_preserves_order_and_zero() {
        let weights = BTreeMap::from([(0, 0.0), (1, 0.25), (2, 0.5), (3, 2.0)]);
        for factor in [0.5, 1.0, 3.0] {
            let remapped = exponential_remap(weights.clone(), factor);
            assert_eq!(remapped[&0], 0.0);
            assert!(remapped[&1] > 0.0);
            assert!(remapped[&1] < remapped[&2]);
            assert!(remapped[&2] < remapped[&3]);
        }
        let sharp = exponential_remap(weights.clone(), 3.0);
        let flat = exponential_remap(weights, 0.5);
        assert!(sharp[&3] / sharp[&1] > flat[&3] / flat[&1]);
    }

    #[test]
    fn large_factor_keeps_the_heaviest_position() {
        // Weights 1.0, 0.5, 0.5 put exp(w * 1000) far past f64 range.
        let (v1, v2) = (set(&[0]), set(&[1, 2]));
        let candidates: Candidates = [("v1", Some(&v1)), ("v2", Some(&v2))].into_iter().collect();

        let remapped = exponential_remap(inverse_size_weights(&candidates), 1000.0);
        assert!(remapped.values().all(|w| w.is_finite()));
        assert!(remapped[&0] > remapped[&1]);
        assert!((remapped[&0] - 1.0).abs() < 1e-12);

        let mut rng = Prng::new(10);
        for _ in 0..2000 {
            assert_eq!(exponential_weighted(&candidates, 1000.0, &mut rng), Some(0));
        }
        let policy = Policy::ExponentialWeighted { factor: 1000.0 };
        assert_eq!(policy.select(&candidates, &mut rng), Some(0));
    }

    #[test]
    fn weighted_policies_prefer_selective_viewpoints() {
        // v1 is very selective (one proposal), v2 is not.
        let v1 = set(&[10]);
        let v2: ContinuationSet = (0..10).collect();
        let candidates: Candidates = [("v1", Some(&v1)), ("v2", Some(&v2))].into_iter().collect();
        let mut rng = Prng::new(6);
        let n = 5000;
        let mut hits = 0;
        for _ in 0..n {
            if inverse_size_weighted(&candidates, &mut rng) == Some(10) {
                hits += 1;
            }
        }
        // Weight 1.0 out of a total of 2.0.
        let pct = hits as f64 / n as f64;
        assert!((0.45..0.55).contains(&pct), "got {pct}");
    }

    #[test]
    fn non_positive_factor_is_no_decision() {
        let v1 = set(&[1, 2]);
        let candidates: Candidates = [("v1", Some(&v1))].into_iter().collect();
        let mut rng = Prng::new(7);
        assert_eq!(exponential_weighted(&candidates, 0.0, &mut rng), None);
        assert!(exponential_weighted(&candidates, 1.2, &mut rng).is_some());
    }

    fn lowest(candidates: &Candidates<'_>, _: &mut Prng) -> Option<Position> {
        candidates.get("v1").and_then(|s| s.first().copied())
    }

    #[test]
    fn functions_are_selectors() {
        let v1 = set(&[8, 9]);
        let candidates: Candidates = [("v1", Some(&v1))].into_iter().collect();
        let mut rng = Prng::new(8);
        assert_eq!(lowest.select(&candidates, &mut rng), Some(8));
    }

    #[test]
    fn policy_names_and_json() {
        assert_eq!("intersect".parse::<Policy>().unwrap(), Policy::StrictIntersection);
        assert_eq!("uniform_union".parse::<Policy>().unwrap(), Policy::UniformUnion);
        assert_eq!("weighted".parse::<Policy>().unwrap(), Policy::InverseSizeWeighted);
        assert!("hierarchical".parse::<Policy>().is_err());

        let json = r#"{"kind":"exponential_weighted","factor":1.2}"#;
        let policy: Policy = serde_json::from_str(json).unwrap();
        assert_eq!(policy, Policy::ExponentialWeighted { factor: 1.2 });
        let policy: Policy = serde_json::from_str(r#"{"kind":"exponential_weighted"}"#).unwrap();
        assert_eq!(policy, Policy::default());
    }
}
