//! Domain entities - Core business objects with identity

mod adventure;
mod chapter;
mod location;
mod npc;
mod progression;
mod quest;

pub use adventure::{Adventure, CurrentState, EVENT_LOG_CAP};
pub use chapter::{Chapter, ChapterObjective};
pub use location::{Area, AreaEncounter, LocationSheet};
pub use npc::{NpcSheet, NpcSituation, Personality};
pub use progression::{
    CombatEncounter, ExplorationMilestone, LastLevelUp, ProgressionLog, SocialInteraction,
};
pub use quest::{Quest, QuestStatus};
