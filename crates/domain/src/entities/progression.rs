//! Progression entity - Milestone activity records for level advancement
//!
//! Three pillars of play are tracked: combat encounters, exploration
//! milestones, and social interactions. Records are append-only and
//! deduplicated on content (timestamps excluded), so replaying the same
//! event never inflates the log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Activity records accumulated since the adventure started
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressionLog {
    #[serde(default)]
    pub combat_encounters: Vec<CombatEncounter>,
    #[serde(default)]
    pub exploration_milestones: Vec<ExplorationMilestone>,
    #[serde(default)]
    pub social_interactions: Vec<SocialInteraction>,
}

/// A finished combat encounter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatEncounter {
    pub id: String,
    #[serde(default)]
    pub xp: u32,
    pub completed_at: DateTime<Utc>,
}

/// A notable discovery (first visit to a location, a found landmark)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationMilestone {
    pub milestone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// A social beat: meeting an NPC, completing a quest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialInteraction {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quest: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl ProgressionLog {
    /// Record a combat encounter. Returns `false` if the id was already seen.
    pub fn track_combat(&mut self, id: impl Into<String>, xp: u32, now: DateTime<Utc>) -> bool {
        let id = id.into();
        if self.combat_encounters.iter().any(|e| e.id == id) {
            return false;
        }
        self.combat_encounters.push(CombatEncounter {
            id,
            xp,
            completed_at: now,
        });
        true
    }

    /// Record an exploration milestone, deduplicated on milestone + location.
    pub fn track_exploration(
        &mut self,
        milestone: impl Into<String>,
        location: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        let milestone = milestone.into();
        if self
            .exploration_milestones
            .iter()
            .any(|m| m.milestone == milestone && m.location == location)
        {
            return false;
        }
        self.exploration_milestones.push(ExplorationMilestone {
            milestone,
            location,
            completed_at: now,
        });
        true
    }

    /// Record a social interaction, deduplicated on kind + npc + quest.
    pub fn track_social(
        &mut self,
        kind: impl Into<String>,
        npc: Option<String>,
        quest: Option<String>,
        now: DateTime<Utc>,
    ) -> bool {
        let kind = kind.into();
        if self
            .social_interactions
            .iter()
            .any(|s| s.kind == kind && s.npc == npc && s.quest == quest)
        {
            return false;
        }
        self.social_interactions.push(SocialInteraction {
            kind,
            npc,
            quest,
            completed_at: now,
        });
        true
    }

    /// Whether anything happened after `since`. With no cutoff, any record
    /// at all counts as recent.
    pub fn has_activity_since(&self, since: Option<DateTime<Utc>>) -> bool {
        match since {
            Some(cutoff) => {
                self.combat_encounters
                    .iter()
                    .any(|e| e.completed_at > cutoff)
                    || self
                        .exploration_milestones
                        .iter()
                        .any(|m| m.completed_at > cutoff)
                    || self
                        .social_interactions
                        .iter()
                        .any(|s| s.completed_at > cutoff)
            }
            None => {
                !self.combat_encounters.is_empty()
                    || !self.exploration_milestones.is_empty()
                    || !self.social_interactions.is_empty()
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.has_activity_since(None)
    }
}

/// Bookkeeping stamped by the long-rest level check
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LastLevelUp {
    /// When eligibility was last evaluated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
    /// Party level at the time of that check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leveled_up: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leveled_at: Option<DateTime<Utc>>,
}

impl LastLevelUp {
    pub fn is_empty(&self) -> bool {
        self.checked_at.is_none()
            && self.level.is_none()
            && self.leveled_up.is_none()
            && self.new_level.is_none()
            && self.leveled_at.is_none()
    }

    /// Stamp an eligibility check without a level-up.
    pub fn record_check(&mut self, level: u32, now: DateTime<Utc>) {
        self.checked_at = Some(now);
        self.level = Some(level);
    }

    /// Stamp a successful level-up.
    pub fn record_level_up(&mut self, new_level: u32, now: DateTime<Utc>) {
        self.leveled_up = Some(true);
        self.new_level = Some(new_level);
        self.leveled_at = Some(now);
    }
}
