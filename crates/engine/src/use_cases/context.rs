//! Tiered context rendering for the language model.
//!
//! Every turn carries a slice of the adventure into the prompt. The slice
//! comes in three sizes keyed to what the turn needs: a handful of facts
//! for quick exchanges, the working set for ordinary play, and the full
//! picture with lore blocks for scene changes. On top of the tier, the
//! smart loader bolts on location detail when the player is searching and
//! NPC dossiers when known characters come up by name.

use std::sync::Arc;

use loremaster_domain::{
    classify_tier, is_examining, mentions_entity, Adventure, Area, ContextTier, NpcSheet,
};
use serde_json::Value;

use crate::infrastructure::store::AdventureStore;

/// Renders adventure state into prompt context at a chosen tier.
pub struct ContextEngine {
    store: Arc<AdventureStore>,
}

impl ContextEngine {
    pub fn new(store: Arc<AdventureStore>) -> Self {
        Self { store }
    }

    pub async fn render(&self, adventure: &Adventure, tier: ContextTier) -> String {
        match tier {
            ContextTier::Minimal => self.minimal(adventure).await,
            ContextTier::Standard => self.standard(adventure).await,
            ContextTier::Detailed => self.detailed(adventure).await,
        }
    }

    /// Context for one turn: classified tier plus on-demand detail blocks.
    pub async fn context_for_turn(
        &self,
        adventure: &Adventure,
        player_input: &str,
        tier: Option<ContextTier>,
    ) -> String {
        let tier = tier.unwrap_or_else(|| classify_tier(player_input));
        let mut context = self.render(adventure, tier).await;

        if is_examining(player_input) {
            if let Some(location_id) = adventure.current_state.location.as_deref() {
                let details = self.location_details(&adventure.id, location_id, None).await;
                context.push_str("\n\n");
                context.push_str(&details);
            }
        }

        for npc_id in &adventure.met_npcs {
            if mentions_entity(player_input, npc_id) {
                if let Some(info) = self.try_npc_info(&adventure.id, npc_id).await {
                    context.push_str("\n\n");
                    context.push_str(&info);
                }
            }
        }

        context
    }

    async fn minimal(&self, adventure: &Adventure) -> String {
        let mut lines = vec![format!("**{}**", adventure.name)];

        if let Some(chapter_id) = &adventure.current_state.chapter {
            let display = match self.store.load_chapter(&adventure.id, chapter_id).await {
                Some(chapter) => chapter.display_title().to_string(),
                None => chapter_id.clone(),
            };
            lines.push(format!("Chapter: {display}"));
        }
        lines.push(format!("Level: {}", adventure.current_state.party_level));
        if let Some(location_id) = &adventure.current_state.location {
            let display = match self.store.load_location(&adventure.id, location_id).await {
                Some(location) => location.name.clone(),
                None => location_id.clone(),
            };
            lines.push(format!("Location: {display}"));
        }
        if let Some(quest) = adventure.primary_quest() {
            lines.push(format!("Quest: {}", quest.name));
        }

        lines.join("\n")
    }

    async fn standard(&self, adventure: &Adventure) -> String {
        let mut lines = vec![
            format!("=== {} ===", adventure.name),
            format!("{}...", clip(&adventure.description, 200)),
            String::new(),
        ];

        if let Some(chapter_id) = &adventure.current_state.chapter {
            if let Some(chapter) = self.store.load_chapter(&adventure.id, chapter_id).await {
                lines.push(format!("**Chapter:** {}", chapter.display_title()));
                lines.push(format!("{}...", clip(&chapter.overview, 300)));
                lines.push(String::new());
            }
        }

        if let Some(location_id) = &adventure.current_state.location {
            if let Some(location) = self.store.load_location(&adventure.id, location_id).await {
                lines.push(format!("**Location:** {}", location.name));
                lines.push(format!("{}...", clip(&location.description, 200)));
                if let Some(atmosphere) = &location.atmosphere {
                    lines.push(format!("_Atmosphere: {}_", clip(atmosphere, 150)));
                }
                lines.push(String::new());
            }
        }

        let (visited, in_area) = self.location_names(adventure).await;
        if !visited.is_empty() || !in_area.is_empty() {
            lines.push("**Accessible Locations:**".to_string());
            if !visited.is_empty() {
                lines.push(format!("  Previously visited: {}", join_first(&visited, 5)));
            }
            if !in_area.is_empty() {
                lines.push(format!("  In this area: {}", join_first(&in_area, 5)));
            }
            lines.push(String::new());
        }

        if !adventure.active_quests.is_empty() {
            lines.push("**Active Quests:**".to_string());
            for quest in adventure.active_quests.iter().take(3) {
                lines.push(format!("  - {}", quest.name));
            }
            lines.push(String::new());
        }

        if !adventure.important_events.is_empty() {
            lines.push("**Recent Events:**".to_string());
            for event in last_n(&adventure.important_events, 3) {
                lines.push(format!("  - {event}"));
            }
        }

        lines.join("\n")
    }

    async fn detailed(&self, adventure: &Adventure) -> String {
        let mut lines = vec![
            format!("=== {} ===", adventure.name),
            adventure.description.clone(),
        ];
        if let Some(setting) = &adventure.setting {
            lines.push(format!("_Setting: {setting}_"));
        }
        lines.push(String::new());

        if let Some(chapter_id) = &adventure.current_state.chapter {
            if let Some(chapter) = self.store.load_chapter(&adventure.id, chapter_id).await {
                lines.push(format!("## {}", chapter.display_title()));
                lines.push(chapter.overview.clone());
                if !chapter.objectives.is_empty() {
                    lines.push("\n**Objectives:**".to_string());
                    for objective in &chapter.objectives {
                        lines.push(format!("  - {}", objective.description()));
                    }
                }
                lines.push(String::new());
            }
        }

        if let Some(location_id) = &adventure.current_state.location {
            if let Some(location) = self.store.load_location(&adventure.id, location_id).await {
                lines.push(format!("## {}", location.name));
                lines.push(location.description.clone());
                if let Some(atmosphere) = &location.atmosphere {
                    lines.push(format!("\n_Atmosphere: {atmosphere}_"));
                }
                if !location.areas.is_empty() {
                    let areas: Vec<&str> = location.areas.keys().map(String::as_str).collect();
                    lines.push(format!("\n**Areas:** {}", areas.join(", ")));
                }
                lines.push(String::new());
            }
        }

        if !adventure.active_quests.is_empty() {
            lines.push("## Active Quests".to_string());
            for quest in &adventure.active_quests {
                lines.push(format!("\n**{}**", quest.name));
                if !quest.description.is_empty() {
                    lines.push(quest.description.clone());
                }
                if let Some(giver) = &quest.giver {
                    lines.push(format!("_From: {giver}_"));
                }
                if let Some(reward) = &quest.reward {
                    lines.push(format!("_Reward: {reward}_"));
                }
            }
            lines.push(String::new());
        }

        if !adventure.met_npcs.is_empty() {
            lines.push("## Known NPCs".to_string());
            lines.push(join_first(&adventure.met_npcs, 10));
            lines.push(String::new());
        }

        if !adventure.important_events.is_empty() {
            lines.push("## Recent Events".to_string());
            for event in last_n(&adventure.important_events, 5) {
                lines.push(format!("  - {event}"));
            }
        }

        render_spider_plot(adventure, &mut lines);
        render_rockseekers(adventure, &mut lines);
        render_factions(adventure, &mut lines);
        render_party_knowledge(adventure, &mut lines);

        lines.join("\n")
    }

    /// Drill-down detail for one location, or one area within it.
    pub async fn location_details(
        &self,
        adventure_id: &str,
        location_id: &str,
        area_id: Option<&str>,
    ) -> String {
        let Some(location) = self.store.load_location(adventure_id, location_id).await else {
            return "Location details not available.".to_string();
        };

        if let Some(area_id) = area_id {
            if let Some(area) = location.area(area_id) {
                return render_area(area_id, area);
            }
        }

        let mut lines = vec![
            format!("**{}**", location.name),
            format!("{}...", clip(&location.description, 200)),
        ];
        if !location.areas.is_empty() {
            let areas: Vec<&str> = location.areas.keys().map(String::as_str).collect();
            lines.push(format!("\n**Areas:** {}", join_strs(&areas, 5)));
        }
        lines.join("\n")
    }

    pub async fn npc_info(&self, adventure_id: &str, npc_id: &str) -> String {
        match self.try_npc_info(adventure_id, npc_id).await {
            Some(info) => info,
            None => "NPC not found.".to_string(),
        }
    }

    async fn try_npc_info(&self, adventure_id: &str, npc_id: &str) -> Option<String> {
        let npc = self.store.load_npc(adventure_id, npc_id).await?;
        Some(render_npc(&npc))
    }

    async fn location_names(&self, adventure: &Adventure) -> (Vec<String>, Vec<String>) {
        let current_part = adventure
            .current_state
            .chapter
            .as_deref()
            .and_then(loremaster_domain::chapter_ordinal);

        let mut visited = Vec::new();
        let mut in_area = Vec::new();
        for location in self.store.all_locations(&adventure.id).await {
            if adventure.has_discovered(&location.id) {
                visited.push(location.name.clone());
            }
            if location.part.is_some() && location.part == current_part {
                in_area.push(location.name.clone());
            }
        }
        (visited, in_area)
    }
}

fn render_area(area_id: &str, area: &Area) -> String {
    let mut lines = vec![
        format!("**{}**", title_case(area_id)),
        area.description.clone(),
    ];
    if !area.features.is_empty() {
        lines.push(format!("\n**Features:** {}", join_first(&area.features, 5)));
    }
    if let Some(encounter) = &area.encounter {
        lines.push(format!(
            "\n**Encounter:** {} ({})",
            encounter.summary(),
            encounter.trigger_text()
        ));
    }
    if area.secret_count() > 0 {
        lines.push(format!("\n**Hidden:** {} secret(s)", area.secret_count()));
    }
    if area.has_treasure() {
        lines.push("\n**Treasure:** Present".to_string());
    }
    lines.join("\n")
}

fn render_npc(npc: &NpcSheet) -> String {
    let mut lines = vec![format!("**{}**", npc.display_name())];
    if let Some(title) = &npc.title {
        lines.push(format!("_{title}_"));
    }
    if let Some(race_class) = npc.race_class_line() {
        lines.push(race_class);
    }
    if !npc.personality.traits.is_empty() {
        lines.push(format!("\n**Traits:** {}", join_first(&npc.personality.traits, 3)));
    }
    if !npc.personality.goals.is_empty() {
        lines.push(format!("**Goals:** {}", join_first(&npc.personality.goals, 2)));
    }
    if let Some(mannerisms) = &npc.personality.mannerisms {
        lines.push(format!("**Mannerisms:** {}", clip(mannerisms, 100)));
    }
    if let Some(example) = npc.dialogue_examples.first() {
        lines.push(format!("\n_Example: {}_", clip(example, 150)));
    }
    if let Some(situation) = &npc.current_situation {
        lines.push(format!("\n**Status:** {}", situation.status_text()));
        if let Some(location) = &situation.location {
            lines.push(format!("**Location:** {location}"));
        }
    }
    if !npc.information_known.is_empty() {
        lines.push("\n**Knows:**".to_string());
        for info in npc.information_known.iter().take(2) {
            lines.push(format!("  - {}", clip(info, 100)));
        }
    }
    lines.join("\n")
}

fn render_spider_plot(adventure: &Adventure, lines: &mut Vec<String>) {
    let Some(plot) = adventure.extra.get("black_spider_plot").and_then(Value::as_object) else {
        return;
    };
    lines.push("\n## Black Spider Plot".to_string());

    let revealed = plot
        .get("identity_revealed")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if revealed {
        let name = plot.get("true_name").and_then(Value::as_str).unwrap_or("unknown");
        let race = plot.get("race").and_then(Value::as_str).unwrap_or("unknown");
        lines.push(format!("  - Identity: {name} ({race})"));
    } else {
        lines.push("  - Identity: Unknown villain".to_string());
    }
    if let Some(status) = plot.get("gundren_status").and_then(Value::as_str) {
        lines.push(format!("  - Gundren: {status}"));
    }
    if let Some(status) = plot.get("sildar_status").and_then(Value::as_str) {
        lines.push(format!("  - Sildar: {status}"));
    }
    if plot
        .get("wave_echo_location_known")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        lines.push("  - Wave Echo Cave location: Known".to_string());
    }
    lines.push(String::new());
}

fn render_rockseekers(adventure: &Adventure, lines: &mut Vec<String>) {
    let Some(brothers) = adventure
        .extra
        .get("rockseeker_brothers")
        .and_then(Value::as_object)
    else {
        return;
    };
    if brothers.is_empty() {
        return;
    }
    lines.push("## Rockseeker Brothers".to_string());
    for (name, info) in brothers {
        let status = info.get("status").and_then(Value::as_str).unwrap_or("unknown");
        let location = info.get("location").and_then(Value::as_str).unwrap_or("unknown");
        lines.push(format!("  - {}: {status} ({location})", title_case(name)));
    }
    lines.push(String::new());
}

fn render_factions(adventure: &Adventure, lines: &mut Vec<String>) {
    let Some(factions) = adventure
        .extra
        .get("faction_standings")
        .and_then(Value::as_object)
    else {
        return;
    };
    let nonzero: Vec<(&String, i64)> = factions
        .iter()
        .filter_map(|(key, value)| {
            let standing = value.as_i64()?;
            (standing != 0).then_some((key, standing))
        })
        .collect();
    if nonzero.is_empty() {
        return;
    }
    lines.push("## Faction Standings".to_string());
    for (key, standing) in nonzero {
        lines.push(format!("  - {}: {standing}", title_case(key)));
    }
    lines.push(String::new());
}

fn render_party_knowledge(adventure: &Adventure, lines: &mut Vec<String>) {
    let known: Vec<&String> = adventure
        .party_knowledge
        .iter()
        .filter_map(|(key, value)| value.then_some(key))
        .collect();
    if known.is_empty() {
        return;
    }
    lines.push("## Party Knowledge".to_string());
    for key in known {
        let fact = key.strip_prefix("knows_").unwrap_or(key);
        lines.push(format!("  - {}", title_case(fact)));
    }
}

/// First `limit` characters. Char-based so multibyte text never splits.
fn clip(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Last `n` items in original order.
fn last_n<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

fn join_first(items: &[String], limit: usize) -> String {
    items
        .iter()
        .take(limit)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_strs(items: &[&str], limit: usize) -> String {
    items.iter().take(limit).copied().collect::<Vec<_>>().join(", ")
}

fn title_case(key: &str) -> String {
    key.replace('_', " ")
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
