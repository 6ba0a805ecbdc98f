// Deterministic, portable pseudo-random number generator.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seeding,
// hand-rolled so that output is identical across platforms and compiler
// versions.
//
// Every random decision in melodendron draws from a `Prng` passed in by the
// caller: selection-policy draws, the uniform fallback when no policy
// decides, and the seed prefix of a generated sequence. A fixed seed
// therefore reproduces a whole training + generation run exactly.
//
// On top of the raw generator sit the sampling helpers the model needs:
// uniform choice from a slice, k-of-n sampling without replacement, and
// weighted index draws. Weighted draws never divide by zero: an empty or
// all-zero weight vector yields `None`.

use serde::{Deserialize, Serialize};

/// Xoshiro256++ PRNG: the sole source of randomness for training-time and
/// generation-time decisions.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prng {
    s: [u64; 4],
}

impl Prng {
    /// Create a new PRNG seeded from a `u64`.
    ///
    /// Uses SplitMix64 to expand the seed into the 256-bit internal state.
    /// Two `Prng` instances created with the same seed produce identical
    /// output sequences.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Generate a uniform `f64` in [0, 1) from the upper 53 bits.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Generate a uniform random integer in `[low, high)`.
    ///
    /// Uses rejection sampling to avoid modulo bias.
    /// Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range; // = (2^64 - range) % range
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Generate a uniform random `usize` in `[low, high)`.
    ///
    /// Panics if `low >= high`.
    pub fn range_usize(&mut self, low: usize, high: usize) -> usize {
        self.range_u64(low as u64, high as u64) as usize
    }

    /// Pick one element uniformly. `None` for an empty slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        Some(&items[self.range_usize(0, items.len())])
    }

    /// Draw `k` distinct indices from `0..n`, in draw order.
    ///
    /// Partial Fisher–Yates over the index range. Panics if `k > n`; callers
    /// that can be short of data check first and report it.
    pub fn sample_indices(&mut self, n: usize, k: usize) -> Vec<usize> {
        assert!(
            k <= n,
            "sample_indices: cannot draw {k} of {n} without replacement"
        );
        let mut indices: Vec<usize> = (0..n).collect();
        for i in 0..k {
            let j = self.range_usize(i, n);
            indices.swap(i, j);
        }
        indices.truncate(k);
        indices
    }

    /// Draw an index with probability proportional to its weight.
    ///
    /// Non-positive and non-finite weights are never drawn. Returns `None`
    /// when no weight is positive. Weights are divided by the largest one
    /// before summing, so very large finite weights cannot overflow the
    /// total.
    pub fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        let usable = |w: f64| w.is_finite() && w > 0.0;
        let peak = weights
            .iter()
            .copied()
            .filter(|&w| usable(w))
            .fold(0.0, f64::max);
        if peak <= 0.0 {
            return None;
        }
        let total: f64 = weights
            .iter()
            .copied()
            .filter(|&w| usable(w))
            .map(|w| w / peak)
            .sum();

        let target = self.next_f64() * total;
        let mut cumulative = 0.0;
        let mut last_usable = None;
        for (i, &w) in weights.iter().enumerate() {
            if !usable(w) {
                continue;
            }
            cumulative += w / peak;
            last_usable = Some(i);
            if cumulative > target {
                return Some(i);
            }
        }
        // Rounding can leave `cumulative` a hair under `target`.
        last_usable
    }
}

/// SplitMix64, used only for seeding xoshiro256++ from a single `u64`.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
