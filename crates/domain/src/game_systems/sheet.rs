//! Character sheets - Abilities, hit points, proficiencies, inventory
//!
//! Sheets are loaded from the adventure's character and NPC data files.
//! Authored files are sparse, so nearly every field has a default; hit
//! points live in two fields (`hp` and `current_hp`) for compatibility
//! with older sheet files, kept in sync by
//! [`CharacterSheet::set_hit_points`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DomainError;

/// The six ability scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ability {
    Str,
    Dex,
    Con,
    Int,
    Wis,
    Cha,
}

impl Ability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Dex => "dex",
            Self::Con => "con",
            Self::Int => "int",
            Self::Wis => "wis",
            Self::Cha => "cha",
        }
    }

    pub const ALL: [Ability; 6] = [
        Ability::Str,
        Ability::Dex,
        Ability::Con,
        Ability::Int,
        Ability::Wis,
        Ability::Cha,
    ];
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ability {
    type Err = DomainError;

    /// Accepts both abbreviations ("dex") and full names ("dexterity"),
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "str" | "strength" => Ok(Self::Str),
            "dex" | "dexterity" => Ok(Self::Dex),
            "con" | "constitution" => Ok(Self::Con),
            "int" | "intelligence" => Ok(Self::Int),
            "wis" | "wisdom" => Ok(Self::Wis),
            "cha" | "charisma" => Ok(Self::Cha),
            other => Err(DomainError::parse(format!("Unknown ability: {other}"))),
        }
    }
}

/// Ability score block, stored under the abbreviated keys used in sheet files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    #[serde(rename = "str", default = "default_score")]
    pub strength: i32,
    #[serde(rename = "dex", default = "default_score")]
    pub dexterity: i32,
    #[serde(rename = "con", default = "default_score")]
    pub constitution: i32,
    #[serde(rename = "int", default = "default_score")]
    pub intelligence: i32,
    #[serde(rename = "wis", default = "default_score")]
    pub wisdom: i32,
    #[serde(rename = "cha", default = "default_score")]
    pub charisma: i32,
}

fn default_score() -> i32 {
    10
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self {
            strength: 10,
            dexterity: 10,
            constitution: 10,
            intelligence: 10,
            wisdom: 10,
            charisma: 10,
        }
    }
}

impl AbilityScores {
    pub fn get(&self, ability: Ability) -> i32 {
        match ability {
            Ability::Str => self.strength,
            Ability::Dex => self.dexterity,
            Ability::Con => self.constitution,
            Ability::Int => self.intelligence,
            Ability::Wis => self.wisdom,
            Ability::Cha => self.charisma,
        }
    }

    pub fn modifier(&self, ability: Ability) -> i32 {
        super::skills::ability_modifier(self.get(ability))
    }
}

/// One line of a character's inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub item: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

/// A player character or NPC combat sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSheet {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race: Option<String>,
    #[serde(default, rename = "class", skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default = "default_level")]
    pub level: u32,
    #[serde(default)]
    pub abilities: AbilityScores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_hp: Option<i32>,
    #[serde(default = "default_max_hp")]
    pub max_hp: i32,
    #[serde(default = "default_ac")]
    pub ac: i32,
    #[serde(default)]
    pub attack_bonus: i32,
    #[serde(default = "default_damage_dice")]
    pub damage_dice: String,
    #[serde(default)]
    pub damage_bonus: i32,
    /// Skill proficiencies, matched case-insensitively
    #[serde(default)]
    pub proficiencies: Vec<String>,
    /// Saving throw proficiencies as ability abbreviations ("dex", "wis")
    #[serde(default)]
    pub save_proficiencies: Vec<String>,
    #[serde(default = "default_proficiency_bonus")]
    pub proficiency_bonus: i32,
    #[serde(default)]
    pub inventory: Vec<InventoryEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_level() -> u32 {
    1
}

fn default_max_hp() -> i32 {
    1
}

fn default_ac() -> i32 {
    10
}

fn default_damage_dice() -> String {
    "1d6".to_string()
}

fn default_proficiency_bonus() -> i32 {
    2
}

impl CharacterSheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            race: None,
            class_name: None,
            level: default_level(),
            abilities: AbilityScores::default(),
            hp: None,
            current_hp: None,
            max_hp: default_max_hp(),
            ac: default_ac(),
            attack_bonus: 0,
            damage_dice: default_damage_dice(),
            damage_bonus: 0,
            proficiencies: Vec::new(),
            save_proficiencies: Vec::new(),
            proficiency_bonus: default_proficiency_bonus(),
            inventory: Vec::new(),
            extra: Map::new(),
        }
    }

    /// Current hit points: `hp` if set, then `current_hp`, then full health.
    pub fn hit_points(&self) -> i32 {
        self.hp.or(self.current_hp).unwrap_or(self.max_hp)
    }

    /// Set hit points, keeping both compatibility fields in sync.
    pub fn set_hit_points(&mut self, value: i32) {
        self.hp = Some(value);
        self.current_hp = Some(value);
    }

    pub fn is_proficient_in_skill(&self, skill: &str) -> bool {
        let skill = skill.to_lowercase();
        self.proficiencies.iter().any(|p| p.to_lowercase() == skill)
    }

    pub fn is_proficient_in_save(&self, ability: Ability) -> bool {
        self.save_proficiencies
            .iter()
            .any(|p| p == ability.as_str())
    }

    pub fn add_to_inventory(&mut self, item: impl Into<String>, quantity: u32) {
        self.inventory.push(InventoryEntry {
            item: item.into(),
            quantity,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rogue() -> CharacterSheet {
        serde_json::from_value(serde_json::json!({
            "name": "Shadowstep",
            "race": "Elf",
            "class": "Rogue",
            "level": 3,
            "abilities": {"str": 8, "dex": 16, "con": 12, "int": 13, "wis": 14, "cha": 10},
            "max_hp": 21,
            "current_hp": 18,
            "ac": 14,
            "attack_bonus": 5,
            "damage_dice": "1d8",
            "damage_bonus": 3,
            "proficiencies": ["Stealth", "Perception", "sleight of hand"],
            "save_proficiencies": ["dex", "int"]
        }))
        .unwrap()
    }

    #[test]
    fn test_hit_points_prefers_hp_then_current_hp() {
        let mut sheet = rogue();
        assert_eq!(sheet.hit_points(), 18);

        sheet.hp = Some(10);
        assert_eq!(sheet.hit_points(), 10);

        sheet.hp = None;
        sheet.current_hp = None;
        assert_eq!(sheet.hit_points(), 21);
    }

    #[test]
    fn test_set_hit_points_syncs_both_fields() {
        let mut sheet = rogue();
        sheet.set_hit_points(7);
        assert_eq!(sheet.hp, Some(7));
        assert_eq!(sheet.current_hp, Some(7));
    }

    #[test]
    fn test_skill_proficiency_is_case_insensitive() {
        let sheet = rogue();
        assert!(sheet.is_proficient_in_skill("stealth"));
        assert!(sheet.is_proficient_in_skill("Sleight of Hand"));
        assert!(!sheet.is_proficient_in_skill("Athletics"));
    }

    #[test]
    fn test_save_proficiency_uses_abbreviations() {
        let sheet = rogue();
        assert!(sheet.is_proficient_in_save(Ability::Dex));
        assert!(!sheet.is_proficient_in_save(Ability::Wis));
    }

    #[test]
    fn test_sparse_sheet_defaults() {
        let sheet: CharacterSheet =
            serde_json::from_value(serde_json::json!({"name": "Goblin"})).unwrap();
        assert_eq!(sheet.level, 1);
        assert_eq!(sheet.max_hp, 1);
        assert_eq!(sheet.ac, 10);
        assert_eq!(sheet.damage_dice, "1d6");
        assert_eq!(sheet.proficiency_bonus, 2);
        assert_eq!(sheet.abilities.dexterity, 10);
    }

    #[test]
    fn test_ability_from_str_accepts_both_forms() {
        assert_eq!("dex".parse::<Ability>().unwrap(), Ability::Dex);
        assert_eq!("Wisdom".parse::<Ability>().unwrap(), Ability::Wis);
        assert!("luck".parse::<Ability>().is_err());
    }

    #[test]
    fn test_ability_scores_serde_short_keys() {
        let scores = AbilityScores {
            strength: 18,
            ..AbilityScores::default()
        };
        let json = serde_json::to_value(scores).unwrap();
        assert_eq!(json["str"], 18);
        assert_eq!(json["dex"], 10);
    }

    #[test]
    fn test_inventory_quantity_defaults_to_one() {
        let entry: InventoryEntry =
            serde_json::from_value(serde_json::json!({"item": "rope"})).unwrap();
        assert_eq!(entry.quantity, 1);
    }
}
