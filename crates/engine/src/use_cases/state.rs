//! Mutable adventure state with write-through persistence.
//!
//! Every mutation lands in `adventure.json` immediately, so a crashed
//! process resumes exactly where the party left off. Chapter changes run
//! through a skip check: jumping more than one part ahead is only clean
//! when the party has discovered one of the target chapter's key locations
//! or picked up knowledge pointing there.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use loremaster_domain::{chapter_ordinal, Adventure, Quest, QuestStatus};

use crate::infrastructure::ports::StoreError;
use crate::infrastructure::store::AdventureStore;

// Knowledge keys containing any of these count as route evidence.
const KNOWLEDGE_MARKERS: &[&str] = &["wave_echo", "cragmaw_castle", "location", "knows_about"];

const ADJACENT_NOTE: &str = "Adjacent chapter - may require travel";

/// What to do when the party tries to jump chapters without evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SkipPolicy {
    /// Permit the jump but surface a warning.
    #[default]
    Advisory,
    /// Reject the jump outright.
    Strict,
}

impl SkipPolicy {
    pub fn from_env() -> Self {
        match std::env::var("CHAPTER_SKIP_POLICY").ok().as_deref() {
            Some(v) if v.eq_ignore_ascii_case("strict") => Self::Strict,
            _ => Self::Advisory,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    InvalidTransition(String),
}

/// Result of a chapter change that went through.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterTransition {
    pub warning: Option<String>,
}

/// A loaded adventure plus the store it persists to.
pub struct AdventureState {
    store: Arc<AdventureStore>,
    adventure: Adventure,
    skip_policy: SkipPolicy,
}

impl AdventureState {
    pub async fn load(
        store: Arc<AdventureStore>,
        adventure_id: &str,
        skip_policy: SkipPolicy,
    ) -> Result<Self, StateError> {
        let adventure = store.load_adventure(adventure_id).await?;
        Ok(Self {
            store,
            adventure,
            skip_policy,
        })
    }

    pub fn adventure(&self) -> &Adventure {
        &self.adventure
    }

    pub(crate) fn adventure_mut(&mut self) -> &mut Adventure {
        &mut self.adventure
    }

    pub fn adventure_id(&self) -> &str {
        &self.adventure.id
    }

    pub fn store(&self) -> Arc<AdventureStore> {
        Arc::clone(&self.store)
    }

    /// Full play state as JSON, the shape persisted in `adventure.json`.
    pub fn metadata(&self) -> Value {
        serde_json::to_value(&self.adventure).unwrap_or(Value::Null)
    }

    /// Header plus available content listings, for load/current responses.
    pub async fn adventure_info(&self) -> Value {
        json!({
            "id": self.adventure.id,
            "name": self.adventure.name,
            "description": self.adventure.description,
            "level_range": self.adventure.level_range,
            "estimated_sessions": self.adventure.estimated_sessions,
            "current_state": self.adventure.current_state,
            "available_chapters": self.store.list_chapters(&self.adventure.id).await,
            "available_locations": self.store.list_locations(&self.adventure.id).await,
            "available_npcs": self.store.list_npcs(&self.adventure.id).await,
        })
    }

    pub async fn save(&self) -> Result<(), StateError> {
        self.store.save_adventure(&self.adventure).await?;
        Ok(())
    }

    /// Move the party. Returns `true` on a first visit.
    pub async fn set_location(
        &mut self,
        location_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StateError> {
        let first_visit = self.adventure.set_location(location_id, now);
        self.save().await?;
        Ok(first_visit)
    }

    /// Change chapters, applying the skip policy unless `force` is set.
    pub async fn set_chapter(
        &mut self,
        chapter_id: &str,
        force: bool,
    ) -> Result<ChapterTransition, StateError> {
        let warning = if force {
            None
        } else {
            self.check_chapter_skip(chapter_id).await?
        };
        self.adventure.set_chapter(chapter_id);
        self.save().await?;
        Ok(ChapterTransition { warning })
    }

    pub async fn add_event(&mut self, event: &str) -> Result<(), StateError> {
        self.adventure.add_event(event);
        self.save().await?;
        Ok(())
    }

    /// Record a first meeting. Returns `true` when the NPC was new.
    pub async fn meet_npc(&mut self, npc_id: &str, now: DateTime<Utc>) -> Result<bool, StateError> {
        let first_meeting = self.adventure.meet_npc(npc_id, now);
        self.save().await?;
        Ok(first_meeting)
    }

    pub async fn add_quest(&mut self, quest: Quest) -> Result<(), StateError> {
        self.adventure.add_quest(quest);
        self.save().await?;
        Ok(())
    }

    pub async fn set_quest_status(
        &mut self,
        quest_id: &str,
        status: QuestStatus,
        now: DateTime<Utc>,
    ) -> Result<bool, StateError> {
        let changed = self.adventure.set_quest_status(quest_id, status, now);
        self.save().await?;
        Ok(changed)
    }

    pub async fn set_party_knowledge(&mut self, key: &str, value: bool) -> Result<(), StateError> {
        self.adventure.set_party_knowledge(key, value);
        self.save().await?;
        Ok(())
    }

    pub async fn set_session_number(&mut self, session_number: u32) -> Result<(), StateError> {
        self.adventure.set_session_number(session_number);
        self.save().await?;
        Ok(())
    }

    pub async fn set_party_level(&mut self, level: u32) -> Result<(), StateError> {
        self.adventure.set_party_level(level);
        self.save().await?;
        Ok(())
    }

    /// Partition every location by how the party can reach it: already
    /// discovered, in the current chapter, behind them, or one chapter away.
    pub async fn accessible_locations(&self) -> Value {
        let mut discovered = Vec::new();
        let mut current_chapter = Vec::new();
        let mut previous_chapters = Vec::new();
        let mut nearby = Vec::new();

        let current_part = self
            .adventure
            .current_state
            .chapter
            .as_deref()
            .and_then(chapter_ordinal);
        let current_location = self.adventure.current_state.location.as_deref();
        let mut seen_in_chapter = HashSet::new();

        for location in self.store.all_locations(&self.adventure.id).await {
            let kind = location.kind.as_deref().unwrap_or("unknown");
            let is_discovered = self.adventure.has_discovered(&location.id);

            if is_discovered {
                discovered.push(json!({
                    "id": location.id,
                    "name": location.name,
                    "type": kind,
                    "part": location.part,
                }));
            }

            let (Some(part), Some(current)) = (location.part, current_part) else {
                continue;
            };

            if part == current {
                if seen_in_chapter.insert(location.id.clone()) {
                    current_chapter.push(json!({
                        "id": location.id,
                        "name": location.name,
                        "type": kind,
                    }));
                }
            } else if part < current && is_discovered {
                previous_chapters.push(json!({
                    "id": location.id,
                    "name": location.name,
                    "type": kind,
                    "part": part,
                }));
            }

            if Some(location.id.as_str()) == current_location {
                continue;
            }
            if part == current {
                nearby.push(json!({
                    "id": location.id,
                    "name": location.name,
                    "type": kind,
                }));
            } else if part.abs_diff(current) == 1 {
                nearby.push(json!({
                    "id": location.id,
                    "name": location.name,
                    "type": kind,
                    "part": part,
                    "note": ADJACENT_NOTE,
                }));
            }
        }

        json!({
            "discovered": discovered,
            "current_chapter": current_chapter,
            "previous_chapters": previous_chapters,
            "nearby": nearby,
        })
    }

    async fn check_chapter_skip(&self, chapter_id: &str) -> Result<Option<String>, StateError> {
        let (Some(new_part), Some(current_part)) = (
            chapter_ordinal(chapter_id),
            self.adventure
                .current_state
                .chapter
                .as_deref()
                .and_then(chapter_ordinal),
        ) else {
            return Ok(None);
        };

        if new_part <= current_part + 1 {
            return Ok(None);
        }
        if self.party_knows_route(chapter_id).await {
            return Ok(None);
        }

        let message = format!(
            "Jumping from part {current_part} to part {new_part} without evidence the party knows the way"
        );
        match self.skip_policy {
            SkipPolicy::Advisory => {
                tracing::warn!(chapter = chapter_id, "{message}");
                Ok(Some(message))
            }
            SkipPolicy::Strict => Err(StateError::InvalidTransition(message)),
        }
    }

    async fn party_knows_route(&self, chapter_id: &str) -> bool {
        if let Some(chapter) = self.store.load_chapter(&self.adventure.id, chapter_id).await {
            if chapter
                .key_locations
                .iter()
                .any(|loc| self.adventure.has_discovered(loc))
            {
                return true;
            }
        }
        self.adventure.has_knowledge_hint(KNOWLEDGE_MARKERS)
    }
}
