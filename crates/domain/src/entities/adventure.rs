//! Adventure entity - The mutable campaign state document
//!
//! An `Adventure` mirrors the on-disk `adventure.json` for a campaign module:
//! immutable header fields (name, description, level range) plus the mutable
//! play state (current chapter/location, discovered locations, quest log,
//! event history, party knowledge, progression records).
//!
//! Every mutation here is pure; persistence is the caller's job and happens
//! after each mutating call (write-through, no batching).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::progression::{LastLevelUp, ProgressionLog};
use super::quest::{Quest, QuestStatus};

/// Maximum number of entries retained in the important-events ring buffer.
pub const EVENT_LOG_CAP: usize = 20;

/// The per-adventure state document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adventure {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting: Option<String>,
    /// Recommended party level span, e.g. `[1, 5]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_range: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_sessions: Option<u32>,

    #[serde(default)]
    pub current_state: CurrentState,
    #[serde(default)]
    pub discovered_locations: Vec<String>,
    #[serde(default)]
    pub active_quests: Vec<Quest>,
    #[serde(default)]
    pub met_npcs: Vec<String>,
    /// Ring buffer of the most recent [`EVENT_LOG_CAP`] story beats
    #[serde(default)]
    pub important_events: Vec<String>,
    #[serde(default)]
    pub party_knowledge: BTreeMap<String, bool>,
    #[serde(default)]
    pub progression: ProgressionLog,
    #[serde(default, skip_serializing_if = "LastLevelUp::is_empty")]
    pub last_level_up: LastLevelUp,

    /// Adventure-specific blocks (plot trackers, faction standings) that the
    /// context renderer knows how to surface but the state machine never
    /// touches. Preserved verbatim on save.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Where the party currently is in the adventure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default = "default_session_number")]
    pub session_number: u32,
    #[serde(default = "default_party_level")]
    pub party_level: u32,
}

fn default_session_number() -> u32 {
    1
}

fn default_party_level() -> u32 {
    1
}

impl Default for CurrentState {
    fn default() -> Self {
        Self {
            chapter: None,
            location: None,
            session_number: default_session_number(),
            party_level: default_party_level(),
        }
    }
}

impl Adventure {
    /// Move the party to a location, tracking first-time discovery.
    ///
    /// Returns `true` if the location was newly discovered; in that case an
    /// exploration milestone is recorded in the progression log.
    pub fn set_location(&mut self, location_id: impl Into<String>, now: DateTime<Utc>) -> bool {
        let location_id = location_id.into();
        let newly_discovered = !self.discovered_locations.contains(&location_id);
        if newly_discovered {
            self.discovered_locations.push(location_id.clone());
            self.progression.track_exploration(
                format!("discovered_{location_id}"),
                Some(location_id.clone()),
                now,
            );
        }
        self.current_state.location = Some(location_id);
        newly_discovered
    }

    /// Set the current chapter. Ordinal validation is the state machine's
    /// concern; the document itself accepts any identifier.
    pub fn set_chapter(&mut self, chapter_id: impl Into<String>) {
        self.current_state.chapter = Some(chapter_id.into());
    }

    /// Append a story beat, keeping only the newest [`EVENT_LOG_CAP`] entries.
    pub fn add_event(&mut self, event: impl Into<String>) {
        self.important_events.push(event.into());
        if self.important_events.len() > EVENT_LOG_CAP {
            let drop = self.important_events.len() - EVENT_LOG_CAP;
            self.important_events.drain(..drop);
        }
    }

    /// Record that the party met an NPC.
    ///
    /// Returns `true` on first meeting; a social interaction is recorded then.
    pub fn meet_npc(&mut self, npc_id: impl Into<String>, now: DateTime<Utc>) -> bool {
        let npc_id = npc_id.into();
        if self.met_npcs.contains(&npc_id) {
            return false;
        }
        self.progression
            .track_social("met_npc", Some(npc_id.clone()), None, now);
        self.met_npcs.push(npc_id);
        true
    }

    pub fn add_quest(&mut self, quest: Quest) {
        self.active_quests.push(quest);
    }

    /// Update a quest's status by id.
    ///
    /// Returns `true` if the quest exists. Completing a quest that was not
    /// already completed records a social-pillar progression entry.
    pub fn set_quest_status(
        &mut self,
        quest_id: &str,
        status: QuestStatus,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(quest) = self.active_quests.iter_mut().find(|q| q.id == quest_id) else {
            return false;
        };
        let was_completed = quest.status == QuestStatus::Completed;
        quest.status = status;
        if status == QuestStatus::Completed && !was_completed {
            self.progression
                .track_social("quest_completed", None, Some(quest_id.to_string()), now);
        }
        true
    }

    pub fn set_party_knowledge(&mut self, key: impl Into<String>, value: bool) {
        self.party_knowledge.insert(key.into(), value);
    }

    pub fn set_session_number(&mut self, session_number: u32) {
        self.current_state.session_number = session_number;
    }

    pub fn set_party_level(&mut self, level: u32) {
        self.current_state.party_level = level;
    }

    pub fn has_discovered(&self, location_id: &str) -> bool {
        self.discovered_locations.iter().any(|l| l == location_id)
    }

    pub fn has_met(&self, npc_id: &str) -> bool {
        self.met_npcs.iter().any(|n| n == npc_id)
    }

    /// Any true party-knowledge flag whose key contains one of the markers.
    pub fn has_knowledge_hint(&self, markers: &[&str]) -> bool {
        self.party_knowledge
            .iter()
            .any(|(key, &value)| value && markers.iter().any(|m| key.contains(m)))
    }

    /// The primary active quest, shown in the minimal context tier.
    pub fn primary_quest(&self) -> Option<&Quest> {
        self.active_quests.first()
    }

    pub fn completed_quest_count(&self) -> usize {
        self.active_quests
            .iter()
            .filter(|q| q.status == QuestStatus::Completed)
            .count()
    }
}
