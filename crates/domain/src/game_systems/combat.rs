//! Combat mechanics - Initiative, attacks, damage, healing
//!
//! Attack resolution follows the usual d20 rules: a natural 20 always hits
//! and doubles the damage dice (not the bonus), a natural 1 always misses.
//! Damage clamps hit points at zero; dropping a character whose overkill
//! meets or exceeds their maximum is instant death rather than
//! unconsciousness.

use std::cmp::Reverse;
use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::dice::{d20, DiceFormula, DiceParseError};
use super::sheet::CharacterSheet;

/// A participant entering initiative
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub name: String,
    #[serde(default)]
    pub dex_mod: i32,
    #[serde(default)]
    pub is_player: bool,
}

/// A combatant with their rolled initiative
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiativeEntry {
    pub name: String,
    #[serde(default)]
    pub dex_mod: i32,
    #[serde(default)]
    pub is_player: bool,
    pub initiative: i32,
}

/// Roll initiative for everyone and sort highest first, ties broken by
/// dexterity modifier.
pub fn roll_initiative(combatants: Vec<Combatant>, rng: &mut impl Rng) -> Vec<InitiativeEntry> {
    let mut entries: Vec<InitiativeEntry> = combatants
        .into_iter()
        .map(|c| {
            let initiative = rng.gen_range(1..=20) + c.dex_mod;
            InitiativeEntry {
                name: c.name,
                dex_mod: c.dex_mod,
                is_player: c.is_player,
                initiative,
            }
        })
        .collect();
    entries.sort_by_key(|e| Reverse((e.initiative, e.dex_mod)));
    entries
}

/// Turn order state for an active combat
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InitiativeTracker {
    pub order: Vec<InitiativeEntry>,
    pub current_turn: usize,
    pub round_number: u32,
}

impl InitiativeTracker {
    pub fn new(order: Vec<InitiativeEntry>) -> Self {
        Self {
            order,
            current_turn: 0,
            round_number: 1,
        }
    }

    pub fn current(&self) -> Option<&InitiativeEntry> {
        self.order.get(self.current_turn)
    }

    /// Advance to the next combatant, wrapping into a new round.
    pub fn next_turn(&mut self) -> Option<&InitiativeEntry> {
        if self.order.is_empty() {
            return None;
        }
        self.current_turn += 1;
        if self.current_turn >= self.order.len() {
            self.current_turn = 0;
            self.round_number += 1;
        }
        self.order.get(self.current_turn)
    }

    pub fn turn_order(&self) -> Vec<&str> {
        self.order.iter().map(|e| e.name.as_str()).collect()
    }
}

/// Result of an attack roll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackOutcome {
    pub d20_roll: i32,
    pub attack_total: i32,
    pub target_ac: i32,
    pub hit: bool,
    pub critical: bool,
    pub critical_miss: bool,
    /// Damage dealt; zero on a miss
    pub damage: i32,
}

/// Make an attack roll and, on a hit, roll damage.
pub fn attack_roll(
    attacker: &CharacterSheet,
    target: &CharacterSheet,
    advantage: bool,
    disadvantage: bool,
    rng: &mut impl Rng,
) -> Result<AttackOutcome, DiceParseError> {
    let roll = d20(advantage, disadvantage, rng);
    resolve_attack(attacker, target, roll, rng)
}

/// Score an attack from a known d20 roll; damage dice still roll from `rng`.
pub fn resolve_attack(
    attacker: &CharacterSheet,
    target: &CharacterSheet,
    d20_roll: i32,
    rng: &mut impl Rng,
) -> Result<AttackOutcome, DiceParseError> {
    let attack_total = d20_roll + attacker.attack_bonus;
    let target_ac = target.ac;

    let critical = d20_roll == 20;
    let critical_miss = d20_roll == 1;
    let hit = if critical {
        true
    } else if critical_miss {
        false
    } else {
        attack_total >= target_ac
    };

    let mut damage = 0;
    if hit {
        let formula = DiceFormula::parse(&attacker.damage_dice)?;
        damage = if critical {
            // Double the dice, not the bonus
            formula.roll_with(rng).total + formula.roll_with(rng).total + attacker.damage_bonus
        } else {
            formula.roll_with(rng).total + attacker.damage_bonus
        };
    }

    Ok(AttackOutcome {
        d20_roll,
        attack_total,
        target_ac,
        hit,
        critical,
        critical_miss,
        damage,
    })
}

/// Condition of a character after taking damage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageStatus {
    Alive,
    Unconscious,
    /// Dropped with overkill at or beyond max HP (massive damage rule)
    InstantDeath,
}

impl DamageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alive => "alive",
            Self::Unconscious => "unconscious",
            Self::InstantDeath => "instant_death",
        }
    }
}

impl fmt::Display for DamageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of applying damage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageOutcome {
    pub damage_taken: i32,
    pub current_hp: i32,
    pub max_hp: i32,
    pub status: DamageStatus,
}

/// Apply damage to a sheet, clamping at zero hit points.
pub fn apply_damage(sheet: &mut CharacterSheet, damage: i32) -> DamageOutcome {
    let current_hp = sheet.hit_points();
    let new_hp = (current_hp - damage).max(0);
    sheet.set_hit_points(new_hp);

    let status = if new_hp > 0 {
        DamageStatus::Alive
    } else {
        // Overkill measured before the clamp
        let overflow = damage - current_hp;
        if overflow >= sheet.max_hp {
            DamageStatus::InstantDeath
        } else {
            DamageStatus::Unconscious
        }
    };

    DamageOutcome {
        damage_taken: damage,
        current_hp: new_hp,
        max_hp: sheet.max_hp,
        status,
    }
}

/// Result of healing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealOutcome {
    pub amount_healed: i32,
    pub current_hp: i32,
    pub max_hp: i32,
}

/// Restore hit points, capped at the maximum.
pub fn heal(sheet: &mut CharacterSheet, amount: i32) -> HealOutcome {
    let current_hp = sheet.hit_points();
    let new_hp = (current_hp + amount).min(sheet.max_hp);
    sheet.set_hit_points(new_hp);

    HealOutcome {
        amount_healed: new_hp - current_hp,
        current_hp: new_hp,
        max_hp: sheet.max_hp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fighter() -> CharacterSheet {
        serde_json::from_value(serde_json::json!({
            "name": "Brunhilde",
            "abilities": {"str": 16, "dex": 12},
            "hp": 12,
            "max_hp": 12,
            "ac": 16,
            "attack_bonus": 5,
            "damage_dice": "1d8",
            "damage_bonus": 3
        }))
        .unwrap()
    }

    fn goblin() -> CharacterSheet {
        serde_json::from_value(serde_json::json!({
            "name": "Goblin",
            "hp": 7,
            "max_hp": 7,
            "ac": 15,
            "attack_bonus": 4,
            "damage_dice": "1d6",
            "damage_bonus": 2
        }))
        .unwrap()
    }

    #[test]
    fn test_initiative_sorted_with_dex_tiebreak() {
        let combatants = vec![
            Combatant {
                name: "Brunhilde".into(),
                dex_mod: 1,
                is_player: true,
            },
            Combatant {
                name: "Goblin".into(),
                dex_mod: 2,
                is_player: false,
            },
            Combatant {
                name: "Wolf".into(),
                dex_mod: 2,
                is_player: false,
            },
        ];
        let mut rng = StdRng::seed_from_u64(3);
        let order = roll_initiative(combatants, &mut rng);

        assert_eq!(order.len(), 3);
        for pair in order.windows(2) {
            let higher = (pair[0].initiative, pair[0].dex_mod);
            let lower = (pair[1].initiative, pair[1].dex_mod);
            assert!(higher >= lower);
        }
    }

    #[test]
    fn test_tracker_wraps_into_new_round() {
        let order = vec![
            InitiativeEntry {
                name: "A".into(),
                dex_mod: 0,
                is_player: true,
                initiative: 15,
            },
            InitiativeEntry {
                name: "B".into(),
                dex_mod: 0,
                is_player: false,
                initiative: 10,
            },
        ];
        let mut tracker = InitiativeTracker::new(order);
        assert_eq!(tracker.round_number, 1);
        assert_eq!(tracker.current().unwrap().name, "A");

        assert_eq!(tracker.next_turn().unwrap().name, "B");
        assert_eq!(tracker.round_number, 1);

        assert_eq!(tracker.next_turn().unwrap().name, "A");
        assert_eq!(tracker.round_number, 2);
    }

    #[test]
    fn test_tracker_empty_order() {
        let mut tracker = InitiativeTracker::default();
        assert!(tracker.current().is_none());
        assert!(tracker.next_turn().is_none());
    }

    #[test]
    fn test_attack_hits_when_total_meets_ac() {
        let attacker = fighter();
        let target = goblin();
        let mut rng = StdRng::seed_from_u64(0);

        // 10 + 5 = 15 meets AC 15
        let outcome = resolve_attack(&attacker, &target, 10, &mut rng).unwrap();
        assert!(outcome.hit);
        assert_eq!(outcome.attack_total, 15);
        assert!(outcome.damage >= 4 && outcome.damage <= 11);

        // 9 + 5 = 14 misses
        let outcome = resolve_attack(&attacker, &target, 9, &mut rng).unwrap();
        assert!(!outcome.hit);
        assert_eq!(outcome.damage, 0);
    }

    #[test]
    fn test_natural_20_always_hits_and_doubles_dice() {
        let mut attacker = fighter();
        attacker.attack_bonus = -10;
        let mut target = goblin();
        target.ac = 30;
        let mut rng = StdRng::seed_from_u64(0);

        let outcome = resolve_attack(&attacker, &target, 20, &mut rng).unwrap();
        assert!(outcome.critical);
        assert!(outcome.hit);
        // Two d8 rolls plus the flat bonus
        assert!(outcome.damage >= 2 + 3 && outcome.damage <= 16 + 3);
    }

    #[test]
    fn test_natural_1_always_misses() {
        let mut attacker = fighter();
        attacker.attack_bonus = 50;
        let target = goblin();
        let mut rng = StdRng::seed_from_u64(0);

        let outcome = resolve_attack(&attacker, &target, 1, &mut rng).unwrap();
        assert!(outcome.critical_miss);
        assert!(!outcome.hit);
        assert_eq!(outcome.damage, 0);
    }

    #[test]
    fn test_bad_damage_dice_is_an_error() {
        let mut attacker = fighter();
        attacker.damage_dice = "banana".into();
        let target = goblin();
        let mut rng = StdRng::seed_from_u64(0);

        assert!(resolve_attack(&attacker, &target, 15, &mut rng).is_err());
    }

    #[test]
    fn test_damage_clamps_at_zero() {
        let mut sheet = goblin();
        let outcome = apply_damage(&mut sheet, 5);
        assert_eq!(outcome.current_hp, 2);
        assert_eq!(outcome.status, DamageStatus::Alive);

        let outcome = apply_damage(&mut sheet, 2);
        assert_eq!(outcome.current_hp, 0);
        assert_eq!(outcome.status, DamageStatus::Unconscious);
        assert_eq!(sheet.hit_points(), 0);
    }

    #[test]
    fn test_massive_damage_is_instant_death() {
        let mut sheet = goblin();
        // 7 current + 7 max: 14 damage leaves exactly max_hp of overkill
        let outcome = apply_damage(&mut sheet, 14);
        assert_eq!(outcome.current_hp, 0);
        assert_eq!(outcome.status, DamageStatus::InstantDeath);

        let mut sheet = goblin();
        let outcome = apply_damage(&mut sheet, 13);
        assert_eq!(outcome.status, DamageStatus::Unconscious);
    }

    #[test]
    fn test_heal_caps_at_max_hp() {
        let mut sheet = goblin();
        apply_damage(&mut sheet, 5);

        let outcome = heal(&mut sheet, 3);
        assert_eq!(outcome.amount_healed, 3);
        assert_eq!(outcome.current_hp, 5);

        let outcome = heal(&mut sheet, 100);
        assert_eq!(outcome.amount_healed, 2);
        assert_eq!(outcome.current_hp, 7);
        assert_eq!(outcome.max_hp, 7);
    }

    #[test]
    fn test_damage_status_serializes_snake_case() {
        let json = serde_json::to_string(&DamageStatus::InstantDeath).unwrap();
        assert_eq!(json, "\"instant_death\"");
    }
}
