//! Game mechanics execution for a play session.
//!
//! Holds the loaded character sheets and the combat tracker, and resolves
//! every dice-backed action the narrator can call for. Results come back
//! as JSON in the shape the tool relay and the HTTP surface both emit;
//! rule math itself lives in the domain crate.

use std::collections::HashMap;

use serde_json::{json, Value};

use loremaster_domain::{
    ability_save, apply_damage, attack_roll, heal, roll_initiative, Ability, CharacterSheet,
    Combatant, DiceFormula, InitiativeTracker, SessionId,
};

pub struct MechanicsEngine {
    session_id: SessionId,
    campaign: String,
    characters: HashMap<String, CharacterSheet>,
    npcs: HashMap<String, CharacterSheet>,
    tracker: Option<InitiativeTracker>,
}

impl MechanicsEngine {
    pub fn new(
        campaign: impl Into<String>,
        characters: HashMap<String, CharacterSheet>,
        npcs: HashMap<String, CharacterSheet>,
    ) -> Self {
        Self {
            session_id: SessionId::new(),
            campaign: campaign.into(),
            characters,
            npcs,
            tracker: None,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn characters(&self) -> &HashMap<String, CharacterSheet> {
        &self.characters
    }

    pub fn character(&self, name: &str) -> Option<&CharacterSheet> {
        self.sheet(name)
    }

    pub fn combat_active(&self) -> bool {
        self.tracker.is_some()
    }

    /// Round number of the active combat, if one is running.
    pub fn combat_round(&self) -> Option<u32> {
        self.tracker.as_ref().map(|t| t.round_number)
    }

    pub fn roll_dice(&self, notation: &str) -> Value {
        match DiceFormula::parse(notation) {
            Ok(formula) => {
                let result = formula.roll();
                json!({"total": result.total, "notation": notation})
            }
            Err(e) => json!({"error": e.to_string()}),
        }
    }

    pub fn skill_check(
        &self,
        character: &str,
        skill: &str,
        dc: i32,
        advantage: bool,
        disadvantage: bool,
    ) -> Value {
        let Some(sheet) = self.sheet(character) else {
            return json!({"error": format!("Character not found: {character}")});
        };
        let outcome = loremaster_domain::skill_check(
            sheet,
            skill,
            dc,
            advantage,
            disadvantage,
            &mut rand::thread_rng(),
        );
        annotate(
            serde_json::to_value(&outcome).unwrap_or(Value::Null),
            &[("character", json!(character)), ("skill", json!(skill))],
        )
    }

    pub fn saving_throw(&self, character: &str, ability: &str, dc: i32) -> Value {
        let Some(sheet) = self.sheet(character) else {
            return json!({"error": format!("Character not found: {character}")});
        };
        let parsed = match ability.parse::<Ability>() {
            Ok(parsed) => parsed,
            Err(e) => return json!({"error": e.to_string()}),
        };
        let outcome = ability_save(sheet, parsed, dc, false, false, &mut rand::thread_rng());
        annotate(
            serde_json::to_value(&outcome).unwrap_or(Value::Null),
            &[("character", json!(character)), ("ability", json!(ability))],
        )
    }

    /// Resolve an attack and, on a hit, apply the damage to the target.
    pub fn attack(
        &mut self,
        attacker: &str,
        target: &str,
        advantage: bool,
        disadvantage: bool,
    ) -> Value {
        let Some(attacker_sheet) = self.sheet(attacker).cloned() else {
            return json!({"error": format!("Attacker not found: {attacker}")});
        };
        let Some(target_key) = self.resolve(target) else {
            return json!({"error": format!("Target not found: {target}")});
        };
        let Some(target_sheet) = self.sheet(&target_key).cloned() else {
            return json!({"error": format!("Target not found: {target}")});
        };

        let outcome = match attack_roll(
            &attacker_sheet,
            &target_sheet,
            advantage,
            disadvantage,
            &mut rand::thread_rng(),
        ) {
            Ok(outcome) => outcome,
            Err(e) => return json!({"error": e.to_string()}),
        };

        let mut result = annotate(
            serde_json::to_value(&outcome).unwrap_or(Value::Null),
            &[("attacker", json!(attacker)), ("target", json!(target))],
        );
        if outcome.hit && outcome.damage > 0 {
            if let Some(sheet) = self.sheet_mut(&target_key) {
                let damage_result = apply_damage(sheet, outcome.damage);
                if let Value::Object(map) = &mut result {
                    map.insert(
                        "damage_result".to_string(),
                        serde_json::to_value(&damage_result).unwrap_or(Value::Null),
                    );
                }
            }
        }
        result
    }

    /// Positive change heals, negative change deals damage.
    pub fn update_hp(&mut self, character: &str, hp_change: i32) -> Value {
        let Some(sheet) = self.sheet_mut(character) else {
            return json!({"error": format!("Character not found: {character}")});
        };
        if hp_change > 0 {
            let outcome = heal(sheet, hp_change);
            json!({
                "character": character,
                "change": hp_change,
                "new_hp": outcome.current_hp,
                "max_hp": outcome.max_hp,
                "healed": true,
            })
        } else {
            let outcome = apply_damage(sheet, -hp_change);
            json!({
                "character": character,
                "change": hp_change,
                "new_hp": outcome.current_hp,
                "max_hp": outcome.max_hp,
                "status": outcome.status.as_str(),
                "damage_taken": outcome.damage_taken,
            })
        }
    }

    /// Roll initiative for the named participants. Names that match no
    /// loaded sheet are skipped rather than failing the whole roll.
    pub fn start_combat(&mut self, participants: &[String]) -> Value {
        let mut combatants = Vec::new();
        for name in participants {
            let Some(key) = self.resolve(name) else {
                tracing::warn!(name = %name, "Skipping unknown combatant");
                continue;
            };
            let Some(sheet) = self.sheet(&key) else {
                continue;
            };
            combatants.push(Combatant {
                dex_mod: sheet.abilities.modifier(Ability::Dex),
                is_player: self.characters.contains_key(&key),
                name: key,
            });
        }

        let order = roll_initiative(combatants, &mut rand::thread_rng());
        let tracker = InitiativeTracker::new(order);
        let current = tracker.current().map(|e| e.name.clone());
        let order_value = serde_json::to_value(&tracker.order).unwrap_or(Value::Null);
        self.tracker = Some(tracker);

        json!({
            "initiative_order": order_value,
            "current_turn": current,
        })
    }

    pub fn next_turn(&mut self) -> Value {
        let Some(tracker) = self.tracker.as_mut() else {
            return json!({"error": "No active combat"});
        };
        let current = tracker.next_turn().map(|e| e.name.clone());
        json!({"current_turn": current, "round": tracker.round_number})
    }

    pub fn end_combat(&mut self) -> Value {
        self.tracker = None;
        json!({"message": "Combat ended"})
    }

    pub fn combat_state(&self) -> Value {
        match &self.tracker {
            Some(tracker) => json!({
                "active": true,
                "round": tracker.round_number,
                "turn_order": tracker.turn_order(),
                "current_turn": tracker.current().map(|e| e.name.clone()),
            }),
            None => json!({"active": false}),
        }
    }

    pub fn get_character(&self, name: &str) -> Value {
        match self.sheet(name) {
            Some(sheet) => serde_json::to_value(sheet).unwrap_or(Value::Null),
            None => json!({"error": format!("Character not found: {name}")}),
        }
    }

    /// Party members only; monsters do not carry loot for the party.
    pub fn add_to_inventory(&mut self, character: &str, item: &str, quantity: u32) -> Value {
        let Some(key) = resolve_key(&self.characters, character) else {
            return json!({"error": format!("Character not found: {character}")});
        };
        if let Some(sheet) = self.characters.get_mut(&key) {
            sheet.add_to_inventory(item, quantity);
        }
        json!({"character": character, "item": item, "quantity": quantity})
    }

    /// Bring every party member back to full hit points.
    pub fn restore_all_hp(&mut self) {
        for sheet in self.characters.values_mut() {
            sheet.set_hit_points(sheet.max_hp);
        }
    }

    pub fn get_state(&self) -> Value {
        json!({
            "session_id": self.session_id.to_string(),
            "campaign": self.campaign,
            "characters": self.characters,
            "npcs": self.npcs,
            "combat": self.combat_state(),
            "quest_log": [],
            "world_state": {},
            "party_inventory": [],
            "location": null,
        })
    }

    fn resolve(&self, name: &str) -> Option<String> {
        resolve_key(&self.characters, name).or_else(|| resolve_key(&self.npcs, name))
    }

    fn sheet(&self, name: &str) -> Option<&CharacterSheet> {
        let key = self.resolve(name)?;
        self.characters.get(&key).or_else(|| self.npcs.get(&key))
    }

    fn sheet_mut(&mut self, name: &str) -> Option<&mut CharacterSheet> {
        let key = self.resolve(name)?;
        if self.characters.contains_key(&key) {
            self.characters.get_mut(&key)
        } else {
            self.npcs.get_mut(&key)
        }
    }
}

/// Exact match first, case-insensitive second; the model does not always
/// reproduce character names precisely.
fn resolve_key(map: &HashMap<String, CharacterSheet>, name: &str) -> Option<String> {
    if map.contains_key(name) {
        return Some(name.to_string());
    }
    map.keys().find(|k| k.eq_ignore_ascii_case(name)).cloned()
}

fn annotate(mut value: Value, extras: &[(&str, Value)]) -> Value {
    if let Value::Object(map) = &mut value {
        for (key, extra) in extras {
            map.insert((*key).to_string(), extra.clone());
        }
    }
    value
}
