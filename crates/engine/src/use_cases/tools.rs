//! Narrator tool surface.
//!
//! The definitions advertised to the model and the dispatcher that executes
//! its calls against the mechanics engine and the adventure state. Dispatch
//! never fails the turn: bad arguments and handler errors come back as JSON
//! the model can read and recover from.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::infrastructure::ports::ToolDefinition;
use crate::use_cases::mechanics::MechanicsEngine;
use crate::use_cases::progression;
use crate::use_cases::state::AdventureState;

/// Every game-mechanics tool the narrator may call.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        tool(
            "roll_dice",
            "Roll dice using standard notation (e.g., '1d20', '2d6+3')",
            json!({
                "type": "object",
                "properties": {
                    "dice": {"type": "string", "description": "Dice notation, e.g. '1d20' or '2d6+3'"},
                    "reason": {"type": "string", "description": "What the roll is for"}
                },
                "required": ["dice"]
            }),
        ),
        tool(
            "skill_check",
            "Make a skill check for a character against a difficulty class",
            json!({
                "type": "object",
                "properties": {
                    "character": {"type": "string", "description": "Character name"},
                    "skill": {"type": "string", "description": "Skill name, e.g. 'athletics' or 'perception'"},
                    "dc": {"type": "integer", "description": "Difficulty class"},
                    "advantage": {"type": "boolean"},
                    "disadvantage": {"type": "boolean"}
                },
                "required": ["character", "skill", "dc"]
            }),
        ),
        tool(
            "saving_throw",
            "Roll a saving throw for a character",
            json!({
                "type": "object",
                "properties": {
                    "character": {"type": "string", "description": "Character name"},
                    "ability": {"type": "string", "description": "Ability (STR, DEX, CON, INT, WIS, CHA)"},
                    "dc": {"type": "integer", "description": "Difficulty class"}
                },
                "required": ["character", "ability", "dc"]
            }),
        ),
        tool(
            "attack_roll",
            "Resolve an attack from one combatant against another, applying damage on a hit",
            json!({
                "type": "object",
                "properties": {
                    "attacker": {"type": "string", "description": "Attacking character or monster"},
                    "target": {"type": "string", "description": "Target of the attack"},
                    "weapon": {"type": "string", "description": "Weapon used, narrative only"},
                    "advantage": {"type": "boolean"},
                    "disadvantage": {"type": "boolean"}
                },
                "required": ["attacker", "target"]
            }),
        ),
        tool(
            "update_hp",
            "Heal or damage a character",
            json!({
                "type": "object",
                "properties": {
                    "character": {"type": "string", "description": "Character name"},
                    "hp_change": {"type": "integer", "description": "Positive to heal, negative to damage"},
                    "reason": {"type": "string", "description": "Cause of the change"}
                },
                "required": ["character", "hp_change"]
            }),
        ),
        tool(
            "start_combat",
            "Roll initiative and start combat",
            json!({
                "type": "object",
                "properties": {
                    "participants": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Names of everyone in the fight"
                    }
                },
                "required": ["participants"]
            }),
        ),
        tool(
            "end_combat",
            "End the current combat",
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            "get_character_info",
            "Get a character's full sheet",
            json!({
                "type": "object",
                "properties": {
                    "character": {"type": "string", "description": "Character name"}
                },
                "required": ["character"]
            }),
        ),
        tool(
            "add_to_inventory",
            "Add an item to a party member's inventory",
            json!({
                "type": "object",
                "properties": {
                    "character": {"type": "string", "description": "Party member name"},
                    "item": {"type": "string", "description": "Item name"},
                    "quantity": {"type": "integer", "description": "How many (default 1)"}
                },
                "required": ["character", "item"]
            }),
        ),
        tool(
            "check_level_up_status",
            "Check whether the party is eligible to level up",
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            "long_rest",
            "Take a long rest: restore hit points and apply any pending level up",
            json!({
                "type": "object",
                "properties": {
                    "description": {"type": "string", "description": "Narrative description of the rest"}
                }
            }),
        ),
    ]
}

/// Execute a tool call. Returns the raw result payload; failures are folded
/// into an error object rather than propagated, so one bad call never kills
/// the narration loop.
pub async fn dispatch(
    mechanics: &mut MechanicsEngine,
    state: &mut AdventureState,
    now: DateTime<Utc>,
    name: &str,
    arguments: &Value,
) -> Value {
    match run(mechanics, state, now, name, arguments).await {
        Ok(result) => result,
        Err(message) => json!({
            "error": format!("Tool '{name}' failed: {message}"),
            "success": false,
        }),
    }
}

async fn run(
    mechanics: &mut MechanicsEngine,
    state: &mut AdventureState,
    now: DateTime<Utc>,
    name: &str,
    arguments: &Value,
) -> Result<Value, String> {
    match name {
        "roll_dice" => {
            let dice = required_str(arguments, name, "dice")?;
            Ok(mechanics.roll_dice(dice))
        }
        "skill_check" => {
            let character = required_str(arguments, name, "character")?;
            let skill = required_str(arguments, name, "skill")?;
            let dc = required_int(arguments, name, "dc")?;
            Ok(mechanics.skill_check(
                character,
                skill,
                dc,
                flag(arguments, "advantage"),
                flag(arguments, "disadvantage"),
            ))
        }
        "saving_throw" => {
            let character = required_str(arguments, name, "character")?;
            let ability = required_str(arguments, name, "ability")?;
            let dc = required_int(arguments, name, "dc")?;
            Ok(mechanics.saving_throw(character, ability, dc))
        }
        "attack_roll" => {
            let attacker = required_str(arguments, name, "attacker")?;
            let target = required_str(arguments, name, "target")?;
            Ok(mechanics.attack(
                attacker,
                target,
                flag(arguments, "advantage"),
                flag(arguments, "disadvantage"),
            ))
        }
        "update_hp" => {
            let character = required_str(arguments, name, "character")?;
            let hp_change = required_int(arguments, name, "hp_change")?;
            Ok(mechanics.update_hp(character, hp_change))
        }
        "start_combat" => {
            let participants = arguments
                .get("participants")
                .and_then(Value::as_array)
                .ok_or_else(|| missing(name, "participants", arguments))?;
            let names: Vec<String> = participants
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            Ok(mechanics.start_combat(&names))
        }
        "end_combat" => {
            // Capture the round before the tracker resets; it names the
            // encounter in the progression record.
            let round = mechanics.combat_round();
            let result = mechanics.end_combat();
            if let Some(round) = round {
                progression::track_combat(state, &format!("encounter_{round}"), 0, now)
                    .await
                    .map_err(|e| e.to_string())?;
            }
            Ok(result)
        }
        "get_character_info" => {
            let character = required_str(arguments, name, "character")?;
            Ok(mechanics.get_character(character))
        }
        "add_to_inventory" => {
            let character = required_str(arguments, name, "character")?;
            let item = required_str(arguments, name, "item")?;
            let quantity = arguments
                .get("quantity")
                .and_then(Value::as_u64)
                .unwrap_or(1) as u32;
            Ok(mechanics.add_to_inventory(character, item, quantity))
        }
        "check_level_up_status" => Ok(level_up_status(state)),
        "long_rest" => long_rest(mechanics, state, now).await,
        _ => Ok(json!({"error": format!("Unknown tool: {name}")})),
    }
}

fn level_up_status(state: &AdventureState) -> Value {
    let current_level = state.adventure().current_state.party_level;
    let check = progression::check_level_up(state);
    let message = if check.eligible {
        format!(
            "You are eligible to level up to level {} on your next long rest!",
            check.new_level
        )
    } else {
        format!("Not yet eligible for level up. {}", check.reason)
    };
    json!({
        "eligible": check.eligible,
        "current_level": current_level,
        "new_level": check.new_level,
        "reason": check.reason,
        "progress_summary": check.progress_summary,
        "message": message,
    })
}

async fn long_rest(
    mechanics: &mut MechanicsEngine,
    state: &mut AdventureState,
    now: DateTime<Utc>,
) -> Result<Value, String> {
    let level_before = state.adventure().current_state.party_level;
    let outcome = progression::long_rest(state, now)
        .await
        .map_err(|e| e.to_string())?;
    mechanics.restore_all_hp();

    let new_level = outcome.new_level.unwrap_or(level_before);
    let message = if outcome.level_up {
        format!("Level up to {new_level}!")
    } else {
        "Rest complete. No level up.".to_string()
    };
    Ok(json!({
        "rest_complete": true,
        "hp_restored": true,
        "level_up": outcome.level_up,
        "old_level": outcome.old_level.unwrap_or(level_before),
        "new_level": new_level,
        "reason": outcome.reason,
        "message": message,
    }))
}

fn tool(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}

fn required_str<'a>(arguments: &'a Value, tool: &str, key: &str) -> Result<&'a str, String> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| missing(tool, key, arguments))
}

fn required_int(arguments: &Value, tool: &str, key: &str) -> Result<i32, String> {
    arguments
        .get(key)
        .and_then(Value::as_i64)
        .map(|n| n as i32)
        .ok_or_else(|| missing(tool, key, arguments))
}

fn flag(arguments: &Value, key: &str) -> bool {
    arguments.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn missing(tool: &str, key: &str, arguments: &Value) -> String {
    let received: Vec<&String> = arguments
        .as_object()
        .map(|map| map.keys().collect())
        .unwrap_or_default();
    format!("Missing required parameter '{key}' for tool '{tool}'. Received parameters: {received:?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use loremaster_domain::{Adventure, CharacterSheet};

    use crate::infrastructure::store::AdventureStore;
    use crate::use_cases::state::SkipPolicy;

    fn party() -> HashMap<String, CharacterSheet> {
        let thorin: CharacterSheet = serde_json::from_value(json!({
            "name": "Thorin",
            "class": "Fighter",
            "abilities": {"str": 16, "dex": 14},
            "hp": 12,
            "max_hp": 12,
            "ac": 16,
            "attack_bonus": 5,
            "damage_dice": "1d8",
            "damage_bonus": 3
        }))
        .unwrap();
        HashMap::from([("Thorin".to_string(), thorin)])
    }

    fn monsters() -> HashMap<String, CharacterSheet> {
        let goblin: CharacterSheet = serde_json::from_value(json!({
            "name": "Goblin",
            "abilities": {"dex": 14},
            "hp": 7,
            "max_hp": 7,
            "ac": 15,
            "attack_bonus": 4,
            "damage_dice": "1d6",
            "damage_bonus": 2
        }))
        .unwrap();
        HashMap::from([("Goblin".to_string(), goblin)])
    }

    async fn seeded_state() -> (tempfile::TempDir, AdventureState) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AdventureStore::new(dir.path()));
        let adventure: Adventure = serde_json::from_value(json!({
            "id": "lost_mines",
            "name": "Lost Mines of Phandelver",
            "current_state": {
                "chapter": "part1_goblin_arrows",
                "location": "triboar_trail",
                "session_number": 1,
                "party_level": 1
            }
        }))
        .unwrap();
        store.save_adventure(&adventure).await.unwrap();
        let state = AdventureState::load(store, "lost_mines", SkipPolicy::Advisory)
            .await
            .unwrap();
        (dir, state)
    }

    #[test]
    fn test_definitions_cover_the_whole_table() {
        let definitions = tool_definitions();
        assert_eq!(definitions.len(), 11);

        let names: Vec<&str> = definitions.iter().map(|d| d.name.as_str()).collect();
        for expected in [
            "roll_dice",
            "skill_check",
            "saving_throw",
            "attack_roll",
            "update_hp",
            "start_combat",
            "end_combat",
            "get_character_info",
            "add_to_inventory",
            "check_level_up_status",
            "long_rest",
        ] {
            assert!(names.contains(&expected), "missing {expected}");
        }
        for definition in &definitions {
            assert_eq!(definition.parameters["type"], "object");
        }
    }

    #[tokio::test]
    async fn test_missing_parameter_reports_what_was_received() {
        let (_dir, mut state) = seeded_state().await;
        let mut mechanics = MechanicsEngine::new("lost_mines", party(), monsters());

        let result = dispatch(
            &mut mechanics,
            &mut state,
            Utc::now(),
            "skill_check",
            &json!({"character": "Thorin"}),
        )
        .await;

        let error = result["error"].as_str().unwrap();
        assert!(error.starts_with("Tool 'skill_check' failed: Missing required parameter 'skill'"));
        assert!(error.contains("character"));
        assert_eq!(result["success"], false);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_inline() {
        let (_dir, mut state) = seeded_state().await;
        let mut mechanics = MechanicsEngine::new("lost_mines", party(), monsters());

        let result = dispatch(
            &mut mechanics,
            &mut state,
            Utc::now(),
            "fireball",
            &json!({}),
        )
        .await;

        assert_eq!(result["error"], "Unknown tool: fireball");
        assert!(result.get("success").is_none());
    }

    #[tokio::test]
    async fn test_roll_dice_through_dispatch() {
        let (_dir, mut state) = seeded_state().await;
        let mut mechanics = MechanicsEngine::new("lost_mines", party(), monsters());

        let result = dispatch(
            &mut mechanics,
            &mut state,
            Utc::now(),
            "roll_dice",
            &json!({"dice": "1d4", "reason": "loot"}),
        )
        .await;

        let total = result["total"].as_i64().unwrap();
        assert!((1..=4).contains(&total));
    }

    #[tokio::test]
    async fn test_end_combat_tracks_the_encounter() {
        let (_dir, mut state) = seeded_state().await;
        let mut mechanics = MechanicsEngine::new("lost_mines", party(), monsters());
        let now = Utc::now();

        dispatch(
            &mut mechanics,
            &mut state,
            now,
            "start_combat",
            &json!({"participants": ["Thorin", "Goblin"]}),
        )
        .await;

        let result = dispatch(&mut mechanics, &mut state, now, "end_combat", &json!({})).await;

        assert_eq!(result["message"], "Combat ended");
        let encounters = &state.adventure().progression.combat_encounters;
        assert_eq!(encounters.len(), 1);
        assert_eq!(encounters[0].id, "encounter_1");
    }

    #[tokio::test]
    async fn test_end_combat_without_combat_tracks_nothing() {
        let (_dir, mut state) = seeded_state().await;
        let mut mechanics = MechanicsEngine::new("lost_mines", party(), monsters());

        let result = dispatch(
            &mut mechanics,
            &mut state,
            Utc::now(),
            "end_combat",
            &json!({}),
        )
        .await;

        assert_eq!(result["message"], "Combat ended");
        assert!(state.adventure().progression.combat_encounters.is_empty());
    }

    #[tokio::test]
    async fn test_level_up_status_message() {
        let (_dir, mut state) = seeded_state().await;
        let mut mechanics = MechanicsEngine::new("lost_mines", party(), monsters());
        let now = Utc::now();
        progression::track_combat(&mut state, "goblin_ambush", 150, now)
            .await
            .unwrap();

        let result = dispatch(
            &mut mechanics,
            &mut state,
            now,
            "check_level_up_status",
            &json!({}),
        )
        .await;

        assert_eq!(result["eligible"], true);
        assert_eq!(result["current_level"], 1);
        assert_eq!(result["new_level"], 2);
        assert_eq!(
            result["message"],
            "You are eligible to level up to level 2 on your next long rest!"
        );
    }

    #[tokio::test]
    async fn test_long_rest_levels_up_and_restores_hp() {
        let (_dir, mut state) = seeded_state().await;
        let mut mechanics = MechanicsEngine::new("lost_mines", party(), monsters());
        let now = Utc::now();
        progression::track_combat(&mut state, "goblin_ambush", 150, now)
            .await
            .unwrap();

        dispatch(
            &mut mechanics,
            &mut state,
            now,
            "update_hp",
            &json!({"character": "Thorin", "hp_change": -8}),
        )
        .await;

        let result = dispatch(&mut mechanics, &mut state, now, "long_rest", &json!({})).await;

        assert_eq!(result["rest_complete"], true);
        assert_eq!(result["hp_restored"], true);
        assert_eq!(result["level_up"], true);
        assert_eq!(result["old_level"], 1);
        assert_eq!(result["new_level"], 2);
        assert_eq!(result["message"], "Level up to 2!");
        assert_eq!(mechanics.character("Thorin").unwrap().hit_points(), 12);
        assert_eq!(state.adventure().current_state.party_level, 2);

        // And the level survives a reload from disk.
        let reloaded = state
            .store()
            .load_adventure("lost_mines")
            .await
            .unwrap();
        assert_eq!(reloaded.current_state.party_level, 2);
    }

    #[tokio::test]
    async fn test_no_progress_rest_keeps_level() {
        let (_dir, mut state) = seeded_state().await;
        let mut mechanics = MechanicsEngine::new("lost_mines", party(), monsters());

        let result = dispatch(
            &mut mechanics,
            &mut state,
            Utc::now(),
            "long_rest",
            &json!({"description": "camping on the trail"}),
        )
        .await;

        assert_eq!(result["level_up"], false);
        assert_eq!(result["message"], "Rest complete. No level up.");
        assert_eq!(result["old_level"], 1);
        assert_eq!(result["new_level"], 1);
        assert_eq!(state.adventure().current_state.party_level, 1);
    }

    #[tokio::test]
    async fn test_add_to_inventory_defaults_quantity() {
        let (_dir, mut state) = seeded_state().await;
        let mut mechanics = MechanicsEngine::new("lost_mines", party(), monsters());

        let result = dispatch(
            &mut mechanics,
            &mut state,
            Utc::now(),
            "add_to_inventory",
            &json!({"character": "Thorin", "item": "Torch"}),
        )
        .await;

        assert_eq!(result["quantity"], 1);
        assert_eq!(
            mechanics.character("Thorin").unwrap().inventory[0].item,
            "Torch"
        );
    }
}
