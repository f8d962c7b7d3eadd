//! Injectable random sources for hit and crit rolls.
//!
//! The core never reaches for system randomness. Encounters receive a
//! [`CombatRng`] from the host: a seeded [`PcgRng`] in play and replays, or
//! [`FixedRolls`] in tests that need to force a hit, miss or crit.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Source of percentile rolls.
pub trait CombatRng {
    /// Next raw 32-bit value.
    fn next_u32(&mut self) -> u32;

    /// Next roll in `0..100`.
    #[allow(clippy::cast_possible_wrap)]
    fn roll(&mut self) -> i32 {
        (self.next_u32() % 100) as i32
    }
}

/// Seeded PCG-XSH-RR generator with serializable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PcgRng {
    state: u64,
}

impl PcgRng {
    const MULTIPLIER: u64 = 6_364_136_223_846_793_005;
    const INCREMENT: u64 = 1_442_695_040_888_963_407;

    /// Create a generator from a seed.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self { state: seed.wrapping_mul(Self::MULTIPLIER).wrapping_add(Self::INCREMENT) }
    }

    /// Current internal state, for snapshots.
    #[must_use]
    pub const fn state(&self) -> u64 {
        self.state
    }

    #[inline]
    fn output(state: u64) -> u32 {
        // Truncation to the low 32 bits is the XSH-RR output step.
        #[allow(clippy::cast_possible_truncation)]
        let xorshifted = (((state >> 18) ^ state) >> 27) as u32;
        #[allow(clippy::cast_possible_truncation)]
        let rot = (state >> 59) as u32;
        xorshifted.rotate_right(rot)
    }
}

impl CombatRng for PcgRng {
    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(Self::MULTIPLIER).wrapping_add(Self::INCREMENT);
        Self::output(self.state)
    }
}

/// Scripted rolls, then a fallback forever.
///
/// A roll of `0` always hits and crits (when crit > 0); `99` always misses
/// anything below 100.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedRolls {
    rolls: VecDeque<i32>,
    fallback: i32,
}

impl FixedRolls {
    /// Return `rolls` in order, then `fallback`.
    pub fn new(rolls: impl IntoIterator<Item = i32>, fallback: i32) -> Self {
        Self { rolls: rolls.into_iter().collect(), fallback }
    }

    /// Every roll is `value`.
    #[must_use]
    pub fn always(value: i32) -> Self {
        Self { rolls: VecDeque::new(), fallback: value }
    }

    /// Rolls not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rolls.len()
    }
}

impl CombatRng for FixedRolls {
    fn next_u32(&mut self) -> u32 {
        self.roll().unsigned_abs()
    }

    fn roll(&mut self) -> i32 {
        self.rolls.pop_front().unwrap_or(self.fallback).clamp(0, 99)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcg_is_deterministic() {
        let mut a = PcgRng::new(42);
        let mut b = PcgRng::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn test_pcg_seeds_differ() {
        let a: Vec<u32> = {
            let mut rng = PcgRng::new(1);
            (0..8).map(|_| rng.next_u32()).collect()
        };
        let b: Vec<u32> = {
            let mut rng = PcgRng::new(2);
            (0..8).map(|_| rng.next_u32()).collect()
        };
        assert_ne!(a, b);
    }

    #[test]
    fn test_roll_range() {
        let mut rng = PcgRng::new(7);
        for _ in 0..1000 {
            let roll = rng.roll();
            assert!((0..100).contains(&roll));
        }
    }

    #[test]
    fn test_pcg_resumes_from_snapshot() {
        let mut rng = PcgRng::new(9);
        rng.next_u32();
        let mut copy = rng;
        assert_eq!(rng.next_u32(), copy.next_u32());
    }

    #[test]
    fn test_fixed_rolls() {
        let mut rng = FixedRolls::new([0, 150, -3], 99);
        assert_eq!(rng.roll(), 0);
        assert_eq!(rng.roll(), 99);
        assert_eq!(rng.roll(), 0);
        assert_eq!(rng.remaining(), 0);
        assert_eq!(rng.roll(), 99);
    }
}
