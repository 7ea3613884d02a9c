//! Battle outcomes and their mergeable aggregation.
use serde::{Deserialize, Serialize};

use crate::constants::ACTION_KIND_COUNT;
use crate::numbers::{mean, percentage, u64_to_f64};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Player,
    Enemy,
}

/// Distinct action kinds observed in a battle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionKinds(u8);

impl ActionKinds {
    pub const MISS: u8 = 1;
    pub const HIT: u8 = 1 << 1;
    pub const COMBO_OPENER: u8 = 1 << 2;
    pub const COMBO_CHAIN: u8 = 1 << 3;

    pub const fn insert(&mut self, kind: u8) {
        self.0 |= kind;
    }

    #[must_use]
    pub const fn count(self) -> u32 {
        self.0.count_ones()
    }
}

/// Result of one simulated battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleOutcome {
    pub winner: Side,
    pub turns: u32,
    pub player_damage: f64,
    pub enemy_damage: f64,
    pub actions: ActionKinds,
    pub lead_changes: u32,
    pub comeback: bool,
    pub close_call: bool,
    pub timed_out: bool,
}

impl BattleOutcome {
    #[must_use]
    pub const fn player_won(&self) -> bool {
        matches!(self.winner, Side::Player)
    }
}

/// Raw sums over a batch of battles.
///
/// `merge` is associative and commutative on every counter, so tallies from
/// any partition of the trials combine into the same totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleTally {
    pub battles: u64,
    pub player_wins: u64,
    pub timeouts: u64,
    pub turn_sum: u64,
    pub turn_square_sum: u64,
    pub min_turns: u32,
    pub max_turns: u32,
    pub player_damage: f64,
    pub enemy_damage: f64,
    pub action_kind_sum: u64,
    pub lead_changes: u64,
    pub comebacks: u64,
    pub close_calls: u64,
}

impl Default for BattleTally {
    fn default() -> Self {
        Self {
            battles: 0,
            player_wins: 0,
            timeouts: 0,
            turn_sum: 0,
            turn_square_sum: 0,
            min_turns: u32::MAX,
            max_turns: 0,
            player_damage: 0.0,
            enemy_damage: 0.0,
            action_kind_sum: 0,
            lead_changes: 0,
            comebacks: 0,
            close_calls: 0,
        }
    }
}

impl BattleTally {
    pub fn record(&mut self, outcome: &BattleOutcome) {
        let turns = u64::from(outcome.turns);
        self.battles += 1;
        self.player_wins += u64::from(outcome.player_won());
        self.timeouts += u64::from(outcome.timed_out);
        self.turn_sum += turns;
        self.turn_square_sum += turns * turns;
        self.min_turns = self.min_turns.min(outcome.turns);
        self.max_turns = self.max_turns.max(outcome.turns);
        self.player_damage += outcome.player_damage;
        self.enemy_damage += outcome.enemy_damage;
        self.action_kind_sum += u64::from(outcome.actions.count());
        self.lead_changes += u64::from(outcome.lead_changes);
        self.comebacks += u64::from(outcome.comeback);
        self.close_calls += u64::from(outcome.close_call);
    }

    #[must_use]
    pub fn merge(mut self, other: &Self) -> Self {
        self.battles += other.battles;
        self.player_wins += other.player_wins;
        self.timeouts += other.timeouts;
        self.turn_sum += other.turn_sum;
        self.turn_square_sum += other.turn_square_sum;
        self.min_turns = self.min_turns.min(other.min_turns);
        self.max_turns = self.max_turns.max(other.max_turns);
        self.player_damage += other.player_damage;
        self.enemy_damage += other.enemy_damage;
        self.action_kind_sum += other.action_kind_sum;
        self.lead_changes += other.lead_changes;
        self.comebacks += other.comebacks;
        self.close_calls += other.close_calls;
        self
    }

    #[must_use]
    pub fn statistics(&self) -> AggregateStatistics {
        let average_turns = mean(u64_to_f64(self.turn_sum), self.battles);
        let mean_square = mean(u64_to_f64(self.turn_square_sum), self.battles);
        let turn_variance = (mean_square - average_turns * average_turns).max(0.0);
        let possible_kinds = self.battles * u64::from(ACTION_KIND_COUNT);
        AggregateStatistics {
            total_battles: self.battles,
            player_wins: self.player_wins,
            enemy_wins: self.battles - self.player_wins,
            timeouts: self.timeouts,
            win_rate: percentage(self.player_wins, self.battles),
            average_turns,
            min_turns: if self.battles == 0 { 0 } else { self.min_turns },
            max_turns: self.max_turns,
            turn_variance,
            average_player_damage: mean(self.player_damage, self.battles),
            average_enemy_damage: mean(self.enemy_damage, self.battles),
            action_variety: percentage(self.action_kind_sum, possible_kinds),
            lead_changes: self.lead_changes,
            comebacks: self.comebacks,
            close_calls: self.close_calls,
        }
    }
}

/// Derived view of a [`BattleTally`]. Rates are percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStatistics {
    pub total_battles: u64,
    pub player_wins: u64,
    pub enemy_wins: u64,
    pub timeouts: u64,
    pub win_rate: f64,
    pub average_turns: f64,
    pub min_turns: u32,
    pub max_turns: u32,
    pub turn_variance: f64,
    pub average_player_damage: f64,
    pub average_enemy_damage: f64,
    pub action_variety: f64,
    pub lead_changes: u64,
    pub comebacks: u64,
    pub close_calls: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(winner: Side, turns: u32) -> BattleOutcome {
        let mut actions = ActionKinds::default();
        actions.insert(ActionKinds::HIT);
        BattleOutcome {
            winner,
            turns,
            player_damage: 10.0,
            enemy_damage: 4.0,
            actions,
            lead_changes: 1,
            comeback: false,
            close_call: turns > 10,
            timed_out: false,
        }
    }

    #[test]
    fn merge_matches_single_pass() {
        let outcomes = [
            outcome(Side::Player, 8),
            outcome(Side::Enemy, 12),
            outcome(Side::Player, 10),
            outcome(Side::Player, 6),
        ];
        let mut whole = BattleTally::default();
        outcomes.iter().for_each(|o| whole.record(o));

        let mut left = BattleTally::default();
        let mut right = BattleTally::default();
        outcomes[..1].iter().for_each(|o| left.record(o));
        outcomes[1..].iter().for_each(|o| right.record(o));

        assert_eq!(left.clone().merge(&right), whole);
        assert_eq!(right.merge(&left), whole);
    }

    #[test]
    fn statistics_weight_by_battle_count() {
        let mut small = BattleTally::default();
        small.record(&outcome(Side::Enemy, 10));
        let mut large = BattleTally::default();
        for _ in 0..9 {
            large.record(&outcome(Side::Player, 10));
        }
        let stats = small.merge(&large).statistics();
        assert_eq!(stats.total_battles, 10);
        assert!((stats.win_rate - 90.0).abs() < 1e-9);
        assert!((stats.turn_variance).abs() < 1e-9);
        assert!((stats.action_variety - 25.0).abs() < 1e-9);
    }

    #[test]
    fn empty_tally_reports_zeroes() {
        let stats = BattleTally::default().statistics();
        assert_eq!(stats.total_battles, 0);
        assert_eq!(stats.min_turns, 0);
        assert!(stats.win_rate.abs() < f64::EPSILON);
    }

    #[test]
    fn variance_tracks_turn_spread() {
        let mut tally = BattleTally::default();
        tally.record(&outcome(Side::Player, 4));
        tally.record(&outcome(Side::Player, 8));
        let stats = tally.statistics();
        assert!((stats.average_turns - 6.0).abs() < 1e-9);
        assert!((stats.turn_variance - 4.0).abs() < 1e-9);
        assert_eq!((stats.min_turns, stats.max_turns), (4, 8));
    }
}
