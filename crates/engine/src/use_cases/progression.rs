//! Progression tracking and milestone leveling over persisted state.
//!
//! Thin wrappers around the domain progression log: each tracker records
//! one pillar of play and writes the adventure straight back to disk, so
//! the eligibility math always runs against what is stored.

use chrono::{DateTime, Utc};

use loremaster_domain::{
    adventure_level_cap, check_level_up_eligibility, process_long_rest, progression_overview,
    EligibilityCheck, LongRestOutcome, ProgressionOverview,
};

use super::state::{AdventureState, StateError};

/// Record a combat encounter. Returns `false` for repeats.
pub async fn track_combat(
    state: &mut AdventureState,
    encounter_id: &str,
    xp: u32,
    now: DateTime<Utc>,
) -> Result<bool, StateError> {
    let tracked = state
        .adventure_mut()
        .progression
        .track_combat(encounter_id, xp, now);
    state.save().await?;
    Ok(tracked)
}

pub async fn track_exploration(
    state: &mut AdventureState,
    milestone: &str,
    location_id: Option<String>,
    now: DateTime<Utc>,
) -> Result<bool, StateError> {
    let tracked = state
        .adventure_mut()
        .progression
        .track_exploration(milestone, location_id, now);
    state.save().await?;
    Ok(tracked)
}

pub async fn track_social(
    state: &mut AdventureState,
    interaction_type: &str,
    npc_id: Option<String>,
    quest_id: Option<String>,
    now: DateTime<Utc>,
) -> Result<bool, StateError> {
    let tracked = state
        .adventure_mut()
        .progression
        .track_social(interaction_type, npc_id, quest_id, now);
    state.save().await?;
    Ok(tracked)
}

/// Pure eligibility check. Does not stamp the adventure.
///
/// The level cap comes from the adventure's own `level_range`, so an
/// adventure written for levels 1-3 stops advancement at 3.
pub fn check_level_up(state: &AdventureState) -> EligibilityCheck {
    let adventure = state.adventure();
    let level = adventure.current_state.party_level;
    check_level_up_eligibility(adventure, level, adventure_level_cap(adventure))
}

/// Take a long rest, leveling the party when the milestone is met.
pub async fn long_rest(
    state: &mut AdventureState,
    now: DateTime<Utc>,
) -> Result<LongRestOutcome, StateError> {
    let level = state.adventure().current_state.party_level;
    let cap = adventure_level_cap(state.adventure());
    let outcome = process_long_rest(state.adventure_mut(), level, cap, now);
    state.save().await?;
    Ok(outcome)
}

pub fn overview(state: &AdventureState) -> ProgressionOverview {
    progression_overview(state.adventure())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::store::AdventureStore;
    use crate::use_cases::state::SkipPolicy;
    use chrono::Utc;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn seed(root: &Path) {
        let dir = root.join("adventures/lost_mines");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("adventure.json"),
            serde_json::to_vec(&json!({
                "id": "lost_mines",
                "name": "Lost Mines of Phandelver",
                "description": "A starter adventure",
                "current_state": {
                    "chapter": "part1_goblin_arrows",
                    "location": "triboar_trail",
                    "session_number": 1,
                    "party_level": 1
                }
            }))
            .unwrap(),
        )
        .unwrap();
    }

    async fn harness() -> (TempDir, AdventureState) {
        let tmp = TempDir::new().unwrap();
        seed(tmp.path());
        let store = Arc::new(AdventureStore::new(tmp.path()));
        let state = AdventureState::load(store, "lost_mines", SkipPolicy::Advisory)
            .await
            .unwrap();
        (tmp, state)
    }

    async fn reload(root: &Path) -> AdventureState {
        let store = Arc::new(AdventureStore::new(root));
        AdventureState::load(store, "lost_mines", SkipPolicy::Advisory)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_track_combat_dedupes_and_persists() {
        let (tmp, mut state) = harness().await;
        let now = Utc::now();

        assert!(track_combat(&mut state, "goblin_ambush", 150, now).await.unwrap());
        assert!(!track_combat(&mut state, "goblin_ambush", 150, now).await.unwrap());

        let reloaded = reload(tmp.path()).await;
        assert_eq!(reloaded.adventure().progression.combat_encounters.len(), 1);
        assert_eq!(reloaded.adventure().progression.combat_encounters[0].xp, 150);
    }

    #[tokio::test]
    async fn test_check_is_readonly() {
        let (_tmp, mut state) = harness().await;
        let now = Utc::now();
        track_combat(&mut state, "goblin_ambush", 150, now).await.unwrap();

        let check = check_level_up(&state);
        assert!(check.eligible);
        assert_eq!(check.new_level, 2);
        // Checking never stamps or levels
        assert_eq!(state.adventure().current_state.party_level, 1);
        assert!(state.adventure().last_level_up.checked_at.is_none());
    }

    #[tokio::test]
    async fn test_long_rest_levels_and_persists() {
        let (tmp, mut state) = harness().await;
        let now = Utc::now();
        track_combat(&mut state, "goblin_ambush", 150, now).await.unwrap();

        let outcome = long_rest(&mut state, now).await.unwrap();
        assert!(outcome.level_up);
        assert_eq!(outcome.new_level, Some(2));

        let reloaded = reload(tmp.path()).await;
        assert_eq!(reloaded.adventure().current_state.party_level, 2);
        assert_eq!(reloaded.adventure().last_level_up.leveled_up, Some(true));
    }

    #[tokio::test]
    async fn test_long_rest_without_progress_stays_level_one() {
        let (_tmp, mut state) = harness().await;

        let outcome = long_rest(&mut state, Utc::now()).await.unwrap();
        assert!(!outcome.level_up);
        assert_eq!(outcome.current_level, Some(1));
        assert!(outcome.reason.contains("meaningful progress"));
        // The failed check is still stamped, so stale activity cannot
        // carry over to the next rest.
        assert!(state.adventure().last_level_up.checked_at.is_some());
    }

    #[tokio::test]
    async fn test_overview_counts_all_pillars() {
        let (_tmp, mut state) = harness().await;
        let now = Utc::now();
        track_combat(&mut state, "goblin_ambush", 150, now).await.unwrap();
        track_exploration(&mut state, "found_waterfall", Some("hidden_grotto".into()), now)
            .await
            .unwrap();
        track_social(&mut state, "met_npc", Some("toblen".into()), None, now)
            .await
            .unwrap();

        let overview = overview(&state);
        assert_eq!(overview.current_level, 1);
        assert_eq!(overview.combat_encounters, 1);
        assert_eq!(overview.exploration_milestones, 1);
        assert_eq!(overview.social_interactions, 1);
    }
}
