//! Three-band d20 resolution driving combat action variety.
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const DIE_SIDES: i32 = 20;
/// Highest total that still fails.
pub const FAIL_CEILING: i32 = 5;
/// Highest total that lands a plain hit.
pub const NORMAL_CEILING: i32 = 13;
/// Lowest continue-roll total that extends a combo.
pub const CONTINUE_FLOOR: i32 = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComboOutcome {
    Fail,
    Normal,
    Combo,
}

impl ComboOutcome {
    /// Classify a modified roll total. Every integer maps to exactly one band.
    #[must_use]
    pub const fn classify(total: i32) -> Self {
        if total <= FAIL_CEILING {
            Self::Fail
        } else if total <= NORMAL_CEILING {
            Self::Normal
        } else {
            Self::Combo
        }
    }

    #[must_use]
    pub const fn succeeded(self) -> bool {
        !matches!(self, Self::Fail)
    }

    #[must_use]
    pub const fn combo_triggered(self) -> bool {
        matches!(self, Self::Combo)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComboRoll {
    pub natural: i32,
    pub total: i32,
    pub outcome: ComboOutcome,
}

impl ComboRoll {
    #[must_use]
    pub const fn from_natural(natural: i32, bonus: i32) -> Self {
        let total = natural.saturating_add(bonus);
        Self {
            natural,
            total,
            outcome: ComboOutcome::classify(total),
        }
    }
}

pub fn roll_combo<R: Rng + ?Sized>(rng: &mut R, bonus: i32) -> ComboRoll {
    let natural = rng.gen_range(1..=DIE_SIDES);
    ComboRoll::from_natural(natural, bonus)
}

#[must_use]
pub const fn continues_combo(total: i32) -> bool {
    total >= CONTINUE_FLOOR
}

pub fn roll_combo_continue<R: Rng + ?Sized>(rng: &mut R, bonus: i32) -> bool {
    let natural = rng.gen_range(1..=DIE_SIDES);
    continues_combo(natural.saturating_add(bonus))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn bands_partition_every_total() {
        for bonus in -25..=25 {
            for natural in 1..=DIE_SIDES {
                let roll = ComboRoll::from_natural(natural, bonus);
                let hits = [
                    roll.total <= FAIL_CEILING,
                    (FAIL_CEILING + 1..=NORMAL_CEILING).contains(&roll.total),
                    roll.total > NORMAL_CEILING,
                ];
                assert_eq!(hits.iter().filter(|hit| **hit).count(), 1);
                match roll.outcome {
                    ComboOutcome::Fail => assert!(hits[0]),
                    ComboOutcome::Normal => assert!(hits[1]),
                    ComboOutcome::Combo => assert!(hits[2]),
                }
            }
        }
    }

    #[test]
    fn band_edges_match_table() {
        assert_eq!(ComboOutcome::classify(5), ComboOutcome::Fail);
        assert_eq!(ComboOutcome::classify(6), ComboOutcome::Normal);
        assert_eq!(ComboOutcome::classify(13), ComboOutcome::Normal);
        assert_eq!(ComboOutcome::classify(14), ComboOutcome::Combo);
        assert!(!continues_combo(10));
        assert!(continues_combo(11));
    }

    #[test]
    fn rolled_naturals_stay_on_the_die() {
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..500 {
            let roll = roll_combo(&mut rng, 3);
            assert!((1..=DIE_SIDES).contains(&roll.natural));
            assert_eq!(roll.total, roll.natural + 3);
        }
    }

    #[test]
    fn large_bonus_always_continues() {
        let mut rng = SmallRng::seed_from_u64(11);
        assert!((0..100).all(|_| roll_combo_continue(&mut rng, 10)));
    }
}
