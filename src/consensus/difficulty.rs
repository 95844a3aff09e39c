//! Difficulty policies.
//!
//! A policy maps `(candidate time, parent header)` to the difficulty the
//! candidate must carry. Policies are pure: the same inputs always give the
//! same output, and a later timestamp never demands a higher difficulty.

use crate::blockchain::BlockHeader;
use std::fmt;

/// Genesis difficulty when the genesis spec leaves it unset.
pub const GENESIS_DIFFICULTY: u64 = 1000;
pub const MINIMUM_DIFFICULTY: u64 = 1000;
pub const DIFFICULTY_BOUND_DIVISOR: u64 = 2048;
/// Target seconds between blocks for [`ParentAdjusted`].
pub const TARGET_BLOCK_TIME: u64 = 10;

pub trait DifficultyPolicy: Send + Sync + fmt::Debug {
    fn calc_difficulty(&self, time: u64, parent: &BlockHeader) -> u64;
}

/// Every block carries the same difficulty regardless of its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDifficulty(pub u64);

impl DifficultyPolicy for FixedDifficulty {
    fn calc_difficulty(&self, _time: u64, _parent: &BlockHeader) -> u64 {
        self.0
    }
}

/// Nudges the parent's difficulty towards a target block interval.
///
/// Blocks arriving faster than the target raise difficulty by
/// `parent / bound_divisor`; each further multiple of the target lowers it by
/// the same step, at most 99 steps, never below `min_difficulty`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentAdjusted {
    pub target_block_time: u64,
    pub bound_divisor: u64,
    pub min_difficulty: u64,
}

impl Default for ParentAdjusted {
    fn default() -> Self {
        Self {
            target_block_time: TARGET_BLOCK_TIME,
            bound_divisor: DIFFICULTY_BOUND_DIVISOR,
            min_difficulty: MINIMUM_DIFFICULTY,
        }
    }
}

impl DifficultyPolicy for ParentAdjusted {
    fn calc_difficulty(&self, time: u64, parent: &BlockHeader) -> u64 {
        let target = self.target_block_time.max(1) as i128;
        let elapsed = time.saturating_sub(parent.timestamp) as i128;
        let factor = (1 - elapsed / target).max(-99);
        let step = (parent.difficulty / self.bound_divisor.max(1)).max(1) as i128;

        let adjusted = parent.difficulty as i128 + step * factor;
        adjusted.clamp(self.min_difficulty as i128, u64::MAX as i128) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent(timestamp: u64, difficulty: u64) -> BlockHeader {
        BlockHeader {
            parent_hash: [0; 32],
            number: 10,
            timestamp,
            difficulty,
            nonce: 0,
            coinbase: [0; 32],
            extra: vec![],
            tx_root: [0; 32],
        }
    }

    #[test]
    fn test_fixed_ignores_inputs() {
        let policy = FixedDifficulty(42);
        assert_eq!(policy.calc_difficulty(0, &parent(100, 7)), 42);
        assert_eq!(policy.calc_difficulty(u64::MAX, &parent(0, 1 << 40)), 42);
    }

    #[test]
    fn test_adjusted_direction() {
        let policy = ParentAdjusted::default();
        let p = parent(1_000, 1_000_000);
        let fast = policy.calc_difficulty(1_005, &p);
        let on_target = policy.calc_difficulty(1_015, &p);
        let slow = policy.calc_difficulty(1_100, &p);
        assert!(fast > p.difficulty);
        assert_eq!(on_target, p.difficulty);
        assert!(slow < p.difficulty);
    }

    #[test]
    fn test_adjusted_is_deterministic_and_monotone() {
        let policy = ParentAdjusted::default();
        let p = parent(5_000, 3_000_000);
        let mut previous = u64::MAX;
        for t in 5_000..7_000 {
            let d = policy.calc_difficulty(t, &p);
            assert_eq!(d, policy.calc_difficulty(t, &p));
            assert!(d <= previous, "difficulty rose at t={}", t);
            previous = d;
        }
    }

    #[test]
    fn test_adjusted_respects_minimum() {
        let policy = ParentAdjusted::default();
        let p = parent(0, MINIMUM_DIFFICULTY);
        assert_eq!(policy.calc_difficulty(10_000, &p), MINIMUM_DIFFICULTY);
        // Small parents still move by at least one.
        assert_eq!(policy.calc_difficulty(1, &p), MINIMUM_DIFFICULTY + 1);
    }
}
