//! Tabletop game mechanics.
//!
//! This module implements the d20 rules the narrator leans on: dice
//! formulas, character sheets, skill checks, saving throws, and combat
//! resolution. Everything here is deterministic given a roll (or an RNG),
//! so the narration layer can report exact numbers back to the table.

mod combat;
mod dice;
mod sheet;
mod skills;

pub use combat::{
    apply_damage, attack_roll, heal, resolve_attack, roll_initiative, AttackOutcome, Combatant,
    DamageOutcome, DamageStatus, HealOutcome, InitiativeEntry, InitiativeTracker,
};
pub use dice::{
    d20, death_save, resolve_death_save, roll_advantage, roll_disadvantage, roll_stats,
    DeathSaveOutcome, DiceFormula, DiceParseError, DiceRollResult,
};
pub use sheet::{Ability, AbilityScores, CharacterSheet, InventoryEntry};
pub use skills::{
    ability_modifier, ability_save, resolve_ability_save, resolve_skill_check, skill_ability,
    skill_check, SaveOutcome, SkillCheckOutcome, DC_EASY, DC_HARD, DC_MEDIUM,
    DC_NEARLY_IMPOSSIBLE, DC_VERY_HARD,
};
