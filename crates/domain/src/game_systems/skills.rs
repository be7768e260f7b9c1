//! Skill checks and saving throws
//!
//! Each check rolls a d20 (honoring advantage/disadvantage), adds the
//! relevant ability modifier and proficiency bonus, and compares against a
//! DC. The roll itself is split out so callers with a known d20 value can
//! use the `resolve_*` functions directly.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::dice::d20;
use super::sheet::{Ability, CharacterSheet};

/// Standard difficulty classes
pub const DC_EASY: i32 = 5;
pub const DC_MEDIUM: i32 = 10;
pub const DC_HARD: i32 = 15;
pub const DC_VERY_HARD: i32 = 20;
pub const DC_NEARLY_IMPOSSIBLE: i32 = 25;

/// Skill name to governing ability, using the standard eighteen skills
const SKILL_ABILITIES: [(&str, Ability); 18] = [
    ("Acrobatics", Ability::Dex),
    ("Animal Handling", Ability::Wis),
    ("Arcana", Ability::Int),
    ("Athletics", Ability::Str),
    ("Deception", Ability::Cha),
    ("History", Ability::Int),
    ("Insight", Ability::Wis),
    ("Intimidation", Ability::Cha),
    ("Investigation", Ability::Int),
    ("Medicine", Ability::Wis),
    ("Nature", Ability::Int),
    ("Perception", Ability::Wis),
    ("Performance", Ability::Cha),
    ("Persuasion", Ability::Cha),
    ("Religion", Ability::Int),
    ("Sleight of Hand", Ability::Dex),
    ("Stealth", Ability::Dex),
    ("Survival", Ability::Wis),
];

/// Governing ability for a skill. Unknown skills default to Strength.
pub fn skill_ability(skill: &str) -> Ability {
    SKILL_ABILITIES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(skill))
        .map(|(_, ability)| *ability)
        .unwrap_or(Ability::Str)
}

/// Convert an ability score to its modifier, with floor division so that
/// a score of 9 gives -1 rather than 0.
pub fn ability_modifier(score: i32) -> i32 {
    let diff = score - 10;
    if diff >= 0 {
        diff / 2
    } else {
        (diff - 1) / 2
    }
}

/// Result of a skill check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillCheckOutcome {
    pub roll: i32,
    pub ability_modifier: i32,
    pub proficiency_bonus: i32,
    pub total: i32,
    pub dc: i32,
    pub success: bool,
    pub natural_20: bool,
    pub natural_1: bool,
    pub advantage: bool,
    pub disadvantage: bool,
}

/// Result of a saving throw
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOutcome {
    pub roll: i32,
    /// Combined ability modifier and proficiency bonus
    pub modifier: i32,
    pub total: i32,
    pub dc: i32,
    pub success: bool,
    pub natural_20: bool,
    pub natural_1: bool,
}

/// Perform a skill check, rolling the d20 internally.
pub fn skill_check(
    sheet: &CharacterSheet,
    skill: &str,
    dc: i32,
    advantage: bool,
    disadvantage: bool,
    rng: &mut impl Rng,
) -> SkillCheckOutcome {
    let roll = d20(advantage, disadvantage, rng);
    resolve_skill_check(sheet, skill, dc, roll, advantage, disadvantage)
}

/// Score a skill check from a known d20 roll.
///
/// A natural 20 always succeeds on skill checks (house rule, not RAW).
pub fn resolve_skill_check(
    sheet: &CharacterSheet,
    skill: &str,
    dc: i32,
    roll: i32,
    advantage: bool,
    disadvantage: bool,
) -> SkillCheckOutcome {
    let ability = skill_ability(skill);
    let ability_mod = ability_modifier(sheet.abilities.get(ability));
    let proficiency_bonus = if sheet.is_proficient_in_skill(skill) {
        sheet.proficiency_bonus
    } else {
        0
    };

    let total = roll + ability_mod + proficiency_bonus;
    let natural_20 = roll == 20;
    let natural_1 = roll == 1;
    let success = total >= dc || natural_20;

    SkillCheckOutcome {
        roll,
        ability_modifier: ability_mod,
        proficiency_bonus,
        total,
        dc,
        success,
        natural_20,
        natural_1,
        advantage,
        disadvantage,
    }
}

/// Perform a saving throw, rolling the d20 internally.
pub fn ability_save(
    sheet: &CharacterSheet,
    ability: Ability,
    dc: i32,
    advantage: bool,
    disadvantage: bool,
    rng: &mut impl Rng,
) -> SaveOutcome {
    let roll = d20(advantage, disadvantage, rng);
    resolve_ability_save(sheet, ability, dc, roll)
}

/// Score a saving throw from a known d20 roll.
///
/// Unlike skill checks, a natural 20 does not force success on saves.
pub fn resolve_ability_save(
    sheet: &CharacterSheet,
    ability: Ability,
    dc: i32,
    roll: i32,
) -> SaveOutcome {
    let ability_mod = ability_modifier(sheet.abilities.get(ability));
    let proficiency_bonus = if sheet.is_proficient_in_save(ability) {
        sheet.proficiency_bonus
    } else {
        0
    };
    let modifier = ability_mod + proficiency_bonus;
    let total = roll + modifier;

    SaveOutcome {
        roll,
        modifier,
        total,
        dc,
        success: total >= dc,
        natural_20: roll == 20,
        natural_1: roll == 1,
    }
}
