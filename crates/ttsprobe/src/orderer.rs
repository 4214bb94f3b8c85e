//! Case ordering for order-independence testing.
//!
//! The orderer only permutes: the output always holds exactly the input
//! cases, ids untouched. A seeded shuffle is reproducible; an unseeded one
//! draws a fresh seed and reports it so the order can be replayed.

use crate::case::TestCase;
use serde::{Deserialize, Serialize};

/// Deterministic seed for reproducible ordering.
///
/// A seed selects one of at most 2^64 orderings. Beyond 20 cases there are
/// more permutations than seeds, so a shuffle reaches only a subset of the
/// possible orders. Every case still lands in each position with equal
/// probability, which is what order-independence testing relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Seed(u64);

impl Seed {
    /// Create a seed from a u64 value
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Draw a fresh seed from the OS random source
    #[must_use]
    pub fn random() -> Self {
        let (hi, lo) = uuid::Uuid::new_v4().as_u64_pair();
        Self(hi ^ lo.rotate_left(29))
    }

    /// Get the raw seed value
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

/// xorshift64 PRNG
#[derive(Debug, Clone)]
struct Xorshift64 {
    state: u64,
}

impl Xorshift64 {
    const fn new(seed: Seed) -> Self {
        // splitmix64 so neighbouring seeds start far apart
        let mut z = seed.0.wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        // Zero is a fixed point of xorshift
        let state = if z == 0 { 0x9E37_79B9_7F4A_7C15 } else { z };
        Self { state }
    }

    const fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform value in `0..bound` (rejection sampling, no modulo bias)
    fn below(&mut self, bound: u64) -> u64 {
        debug_assert!(bound > 0);
        let zone = u64::MAX - (u64::MAX % bound);
        loop {
            let x = self.next();
            if x < zone {
                return x % bound;
            }
        }
    }
}

/// Result of ordering: the cases to run plus the seed that produced them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedCases {
    /// Cases in execution order
    pub cases: Vec<TestCase>,
    /// Seed used, `None` when the generation order was kept
    pub seed: Option<Seed>,
}

/// Permutes generated cases
#[derive(Debug, Clone, Copy, Default)]
pub struct CaseOrderer {
    randomize: bool,
    seed: Option<Seed>,
}

impl CaseOrderer {
    /// Create an orderer
    #[must_use]
    pub const fn new(randomize: bool, seed: Option<Seed>) -> Self {
        Self { randomize, seed }
    }

    /// Produce the execution order
    #[must_use]
    pub fn order(&self, mut cases: Vec<TestCase>) -> OrderedCases {
        if !self.randomize {
            return OrderedCases { cases, seed: None };
        }

        let seed = self.seed.unwrap_or_else(Seed::random);
        shuffle(&mut cases, seed);
        tracing::info!(seed = seed.value(), cases = cases.len(), "shuffled case order");
        OrderedCases {
            cases,
            seed: Some(seed),
        }
    }
}

/// Fisher-Yates shuffle driven by the seed. See [`Seed`] for the reach of
/// one 64-bit state over long lists.
fn shuffle<T>(items: &mut [T], seed: Seed) {
    let mut rng = Xorshift64::new(seed);
    for i in (1..items.len()).rev() {
        let j = rng.below(i as u64 + 1) as usize;
        items.swap(i, j);
    }
}
