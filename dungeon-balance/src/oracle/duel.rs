//! Default turn resolver: a one-on-one duel driven by combo dice.
//!
//! Each turn both sides add their attack speed to an action meter and act
//! once per full point, player first. Damage is reduced by armor down to a
//! floor fraction of the raw hit. A battle that reaches the turn cap is
//! scored as a player loss.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::BattleResolver;
use super::stats::{ActionKinds, BattleOutcome, Side};
use crate::config::{TuningConfig, WeaponType};
use crate::constants::{
    BASE_AGILITY, CLOSE_CALL_HEALTH, COMBO_CHAIN_STEP, COMBO_DAMAGE_MULTIPLIER,
    COMEBACK_LOW_HEALTH, COMEBACK_OPPONENT_HEALTH, MAX_COMBO_CHAIN, MIN_DAMAGE_FRACTION,
    TURN_CAP,
};
use crate::error::{EngineError, EngineResult};
use crate::numbers::round_f64_to_i32;
use crate::rolls::{ComboOutcome, roll_combo, roll_combo_continue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatantProfile {
    pub damage: f64,
    pub attack_speed: f64,
    pub armor: f64,
    pub health: f64,
    #[serde(default)]
    pub combo_bonus: i32,
}

impl CombatantProfile {
    /// Player wielding `weapon` at `level`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the weapon has no scaling entry.
    pub fn player(config: &TuningConfig, weapon: WeaponType, level: u32) -> EngineResult<Self> {
        let scaling = config
            .weapons
            .types
            .get(&weapon)
            .ok_or_else(|| EngineError::not_found("weapon", weapon.key()))?;
        let levels = f64::from(level.saturating_sub(1));
        let player = &config.player;
        Ok(Self {
            damage: (player.base_damage + player.damage_per_level * levels)
                * scaling.damage
                * config.weapons.global_damage_multiplier,
            attack_speed: scaling.attack_speed,
            armor: player.base_armor,
            health: player.base_health + player.health_per_level * levels,
            combo_bonus: 0,
        })
    }

    /// Enemy of `archetype` at `level`, after archetype and global multipliers.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the archetype is unknown.
    pub fn enemy(config: &TuningConfig, archetype: &str, level: u32) -> EngineResult<Self> {
        let enemy = &config.enemy;
        let stats = enemy
            .archetype_key(archetype)
            .and_then(|key| enemy.archetypes.get(key))
            .ok_or_else(|| EngineError::not_found("archetype", archetype))?;
        let levels = f64::from(level.saturating_sub(1));
        let base = &enemy.baseline_stats;
        let scale = &enemy.scaling_per_level;
        let global = &enemy.global_multipliers;
        let technique_edge = (stats.technique - 1.0) * 4.0 + (stats.intelligence - 1.0) * 2.0;
        Ok(Self {
            damage: (base.strength + scale.attributes * levels) * stats.strength * global.damage,
            attack_speed: (base.agility + scale.attributes * levels) / BASE_AGILITY
                * stats.agility
                * global.speed,
            armor: (base.armor + scale.armor * levels) * stats.armor * global.armor,
            health: (base.health + scale.health * levels) * stats.health * global.health,
            combo_bonus: round_f64_to_i32(technique_edge),
        })
    }

    fn check(&self, who: &str) -> EngineResult<()> {
        let sane = [self.damage, self.attack_speed, self.armor, self.health]
            .iter()
            .all(|value| value.is_finite())
            && self.damage >= 0.0
            && self.attack_speed > 0.0
            && self.armor >= 0.0
            && self.health > 0.0;
        if sane {
            Ok(())
        } else {
            Err(EngineError::computation(format!(
                "{who} profile cannot fight: {self:?}"
            )))
        }
    }
}

/// Both sides of one matchup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchupProfiles {
    pub player: CombatantProfile,
    pub enemy: CombatantProfile,
}

impl MatchupProfiles {
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown weapon or archetype.
    pub fn from_config(
        config: &TuningConfig,
        weapon: WeaponType,
        archetype: &str,
        player_level: u32,
        enemy_level: u32,
    ) -> EngineResult<Self> {
        Ok(Self {
            player: CombatantProfile::player(config, weapon, player_level)?,
            enemy: CombatantProfile::enemy(config, archetype, enemy_level)?,
        })
    }
}

fn mitigated(damage: f64, armor: f64) -> f64 {
    (damage - armor).max(damage * MIN_DAMAGE_FRACTION)
}

#[derive(Debug, Clone)]
struct Fighter<'a> {
    profile: &'a CombatantProfile,
    health: f64,
    meter: f64,
    damage_dealt: f64,
    was_cornered: bool,
}

impl<'a> Fighter<'a> {
    const fn new(profile: &'a CombatantProfile) -> Self {
        Self {
            profile,
            health: profile.health,
            meter: 0.0,
            damage_dealt: 0.0,
            was_cornered: false,
        }
    }

    fn fraction(&self) -> f64 {
        (self.health / self.profile.health).max(0.0)
    }

    fn alive(&self) -> bool {
        self.health > 0.0
    }
}

/// A battle in progress, advanced one turn at a time.
#[derive(Debug, Clone)]
pub struct Duel<'a> {
    player: Fighter<'a>,
    enemy: Fighter<'a>,
    turn: u32,
    turn_cap: u32,
    actions: ActionKinds,
    leader: Option<Side>,
    lead_changes: u32,
}

impl<'a> Duel<'a> {
    /// # Errors
    ///
    /// Returns `ComputationFailure` if either profile is degenerate.
    pub fn new(matchup: &'a MatchupProfiles, turn_cap: u32) -> EngineResult<Self> {
        matchup.player.check("player")?;
        matchup.enemy.check("enemy")?;
        Ok(Self {
            player: Fighter::new(&matchup.player),
            enemy: Fighter::new(&matchup.enemy),
            turn: 0,
            turn_cap: turn_cap.max(1),
            actions: ActionKinds::default(),
            leader: None,
            lead_changes: 0,
        })
    }

    #[must_use]
    pub const fn turn(&self) -> u32 {
        self.turn
    }

    #[must_use]
    pub fn health_fractions(&self) -> (f64, f64) {
        (self.player.fraction(), self.enemy.fraction())
    }

    /// Resolve one turn; returns the outcome once the battle has ended.
    pub fn step(&mut self, rng: &mut dyn RngCore) -> Option<BattleOutcome> {
        self.turn += 1;
        let actions = &mut self.actions;
        exchange(&mut self.player, &mut self.enemy, actions, rng);
        if self.enemy.alive() {
            exchange(&mut self.enemy, &mut self.player, actions, rng);
        }
        self.track_momentum();
        self.finished()
    }

    fn track_momentum(&mut self) {
        let (player, enemy) = self.health_fractions();
        if player <= COMEBACK_LOW_HEALTH && enemy >= COMEBACK_OPPONENT_HEALTH {
            self.player.was_cornered = true;
        }
        if enemy <= COMEBACK_LOW_HEALTH && player >= COMEBACK_OPPONENT_HEALTH {
            self.enemy.was_cornered = true;
        }
        let leader = if player > enemy {
            Some(Side::Player)
        } else if enemy > player {
            Some(Side::Enemy)
        } else {
            None
        };
        if let (Some(previous), Some(current)) = (self.leader, leader) {
            if previous != current {
                self.lead_changes += 1;
            }
        }
        if leader.is_some() {
            self.leader = leader;
        }
    }

    fn finished(&self) -> Option<BattleOutcome> {
        let (winner, timed_out) = if !self.enemy.alive() {
            (Side::Player, false)
        } else if !self.player.alive() {
            (Side::Enemy, false)
        } else if self.turn >= self.turn_cap {
            (Side::Enemy, true)
        } else {
            return None;
        };
        let victor = match winner {
            Side::Player => &self.player,
            Side::Enemy => &self.enemy,
        };
        Some(BattleOutcome {
            winner,
            turns: self.turn,
            player_damage: self.player.damage_dealt,
            enemy_damage: self.enemy.damage_dealt,
            actions: self.actions,
            lead_changes: self.lead_changes,
            comeback: !timed_out && victor.was_cornered,
            close_call: !timed_out && victor.fraction() <= CLOSE_CALL_HEALTH,
            timed_out,
        })
    }
}

fn exchange(
    attacker: &mut Fighter<'_>,
    defender: &mut Fighter<'_>,
    actions: &mut ActionKinds,
    rng: &mut dyn RngCore,
) {
    attacker.meter += attacker.profile.attack_speed;
    while attacker.meter >= 1.0 && defender.alive() {
        attacker.meter -= 1.0;
        strike(attacker, defender, actions, rng);
    }
}

fn strike(
    attacker: &mut Fighter<'_>,
    defender: &mut Fighter<'_>,
    actions: &mut ActionKinds,
    rng: &mut dyn RngCore,
) {
    let bonus = attacker.profile.combo_bonus;
    let base_hit = mitigated(attacker.profile.damage, defender.profile.armor);
    let mut land = |multiplier: f64, attacker: &mut Fighter<'_>| {
        let dealt = (base_hit * multiplier).min(defender.health.max(0.0));
        defender.health -= dealt;
        attacker.damage_dealt += dealt;
    };
    match roll_combo(rng, bonus).outcome {
        ComboOutcome::Fail => actions.insert(ActionKinds::MISS),
        ComboOutcome::Normal => {
            actions.insert(ActionKinds::HIT);
            land(1.0, attacker);
        }
        ComboOutcome::Combo => {
            actions.insert(ActionKinds::COMBO_OPENER);
            land(COMBO_DAMAGE_MULTIPLIER, attacker);
            for step in 1..=MAX_COMBO_CHAIN {
                if !roll_combo_continue(rng, bonus) {
                    break;
                }
                actions.insert(ActionKinds::COMBO_CHAIN);
                land(
                    COMBO_DAMAGE_MULTIPLIER + COMBO_CHAIN_STEP * f64::from(step),
                    attacker,
                );
            }
        }
    }
}

/// Dice-driven duel resolver used by default.
#[derive(Debug, Clone, Copy)]
pub struct DuelResolver {
    pub turn_cap: u32,
}

impl Default for DuelResolver {
    fn default() -> Self {
        Self { turn_cap: TURN_CAP }
    }
}

impl BattleResolver for DuelResolver {
    fn resolve(
        &self,
        matchup: &MatchupProfiles,
        rng: &mut dyn RngCore,
    ) -> EngineResult<BattleOutcome> {
        let mut duel = Duel::new(matchup, self.turn_cap)?;
        loop {
            if let Some(outcome) = duel.step(rng) {
                return Ok(outcome);
            }
        }
    }
}
