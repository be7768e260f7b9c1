extern crate self as loremaster_domain;

pub mod entities;
pub mod error;
pub mod game_systems;
pub mod ids;
pub mod milestones;
pub mod value_objects;

// Re-export all entities (explicit list in entities/mod.rs)
pub use entities::{
    Adventure, Area, AreaEncounter, Chapter, ChapterObjective, CombatEncounter, CurrentState,
    ExplorationMilestone, LastLevelUp, LocationSheet, NpcSheet, NpcSituation, Personality,
    ProgressionLog, Quest, QuestStatus, SocialInteraction, EVENT_LOG_CAP,
};

pub use error::DomainError;

// Re-export game mechanics
pub use game_systems::{
    ability_modifier, ability_save, apply_damage, attack_roll, d20, death_save, heal,
    resolve_ability_save, resolve_attack, resolve_death_save, resolve_skill_check, roll_advantage,
    roll_disadvantage, roll_initiative, roll_stats, skill_ability, skill_check, Ability,
    AbilityScores, AttackOutcome, CharacterSheet, Combatant, DamageOutcome, DamageStatus,
    DeathSaveOutcome, DiceFormula, DiceParseError, DiceRollResult, HealOutcome, InitiativeEntry,
    InitiativeTracker, InventoryEntry, SaveOutcome, SkillCheckOutcome, DC_EASY, DC_HARD,
    DC_MEDIUM, DC_NEARLY_IMPOSSIBLE, DC_VERY_HARD,
};

pub use ids::SessionId;

// Re-export milestone progression
pub use milestones::{
    adventure_level_cap, check_level_up_eligibility, milestone_for_level, process_long_rest,
    progression_overview, EligibilityCheck, LevelMilestone, LongRestOutcome, ProgressSummary,
    ProgressionOverview, DEFAULT_LEVEL_CAP, LEVEL_MILESTONES,
};

// Re-export value objects (explicit list in value_objects/mod.rs)
pub use value_objects::{
    chapter_ordinal, classify_tier, classify_turn, estimate_tokens, is_examining,
    mentions_entity, ContextTier, TurnKind,
};
