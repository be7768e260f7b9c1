//! Narrative quest analysis.
//!
//! After each narration the quest log is checked against the text: quests
//! mentioned alongside completion or failure language get a status change
//! proposed, progress language gets a note, and "new quest:" phrasing
//! yields a creation. Analysis only produces suggestions; nothing touches
//! the adventure until the caller applies them.

use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use loremaster_domain::{Quest, QuestStatus};

use super::state::{AdventureState, StateError};

const COMPLETION_KEYWORDS: &[&str] = &[
    "completed",
    "finished",
    "accomplished",
    "fulfilled",
    "succeeded",
    "done",
    "achieved",
    "resolved",
    "concluded",
];

const FAILURE_KEYWORDS: &[&str] = &[
    "failed",
    "lost",
    "abandoned",
    "gave up",
    "couldn't complete",
    "unable to",
    "impossible",
    "too late",
];

const PROGRESS_KEYWORDS: &[&str] = &[
    "progress",
    "advance",
    "step forward",
    "closer",
    "discovered",
    "found",
    "learned",
    "uncovered",
    "revealed",
];

const NEW_QUEST_PATTERNS: [&str; 4] = [
    r"(?i)new quest[:\s]+(.+?)(?:\.|$)",
    r"(?i)your quest[:\s]+(.+?)(?:\.|$)",
    r"(?i)mission[:\s]+(.+?)(?:\.|$)",
    r"(?i)task[:\s]+(.+?)(?:\.|$)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestAction {
    Create,
    Update,
    Complete,
    Fail,
}

/// One proposed change to the quest log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestUpdate {
    pub action: QuestAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quest_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: QuestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Scan a narration against the quest log and propose updates.
pub fn analyze(narrative: &str, current_quests: &[Quest]) -> Vec<QuestUpdate> {
    let mut updates = Vec::new();
    let lower = narrative.to_lowercase();

    for quest in current_quests {
        // Terminal quests stay where they are
        if matches!(quest.status, QuestStatus::Completed | QuestStatus::Failed) {
            continue;
        }
        if !quest_mentioned(&lower, &quest.name) {
            continue;
        }

        if contains_any(&lower, COMPLETION_KEYWORDS) {
            let snippet = extract_snippet(narrative, &quest.name);
            updates.push(QuestUpdate {
                action: QuestAction::Complete,
                quest_id: Some(quest.id.clone()),
                name: None,
                description: None,
                status: QuestStatus::Completed,
                notes: Some(format!("Completed: {snippet}")),
            });
        } else if contains_any(&lower, FAILURE_KEYWORDS) {
            let snippet = extract_snippet(narrative, &quest.name);
            updates.push(QuestUpdate {
                action: QuestAction::Fail,
                quest_id: Some(quest.id.clone()),
                name: None,
                description: None,
                status: QuestStatus::Failed,
                notes: Some(format!("Failed: {snippet}")),
            });
        } else if contains_any(&lower, PROGRESS_KEYWORDS) {
            let snippet = extract_snippet(narrative, &quest.name);
            updates.push(QuestUpdate {
                action: QuestAction::Update,
                quest_id: Some(quest.id.clone()),
                name: None,
                description: None,
                status: QuestStatus::InProgress,
                notes: (!snippet.is_empty()).then_some(snippet),
            });
        }
    }

    detect_new_quests(narrative, current_quests, &mut updates);
    updates
}

/// Apply proposed updates to the adventure. Returns how many took effect.
pub async fn apply(
    state: &mut AdventureState,
    updates: &[QuestUpdate],
    now: DateTime<Utc>,
) -> Result<usize, StateError> {
    let mut applied = 0;

    for update in updates {
        match update.action {
            QuestAction::Create => {
                let Some(name) = update.name.as_deref() else {
                    continue;
                };
                let id = slugify(name);
                if id.is_empty() {
                    continue;
                }
                let adventure = state.adventure_mut();
                if adventure.active_quests.iter().any(|q| q.id == id) {
                    continue;
                }
                let mut quest = Quest::new(id, name).with_status(update.status);
                if let Some(description) = &update.description {
                    quest = quest.with_description(description.as_str());
                }
                adventure.add_quest(quest);
                applied += 1;
            }
            QuestAction::Update | QuestAction::Complete | QuestAction::Fail => {
                let Some(quest_id) = update.quest_id.as_deref() else {
                    continue;
                };
                let adventure = state.adventure_mut();
                if !adventure.set_quest_status(quest_id, update.status, now) {
                    continue;
                }
                if let Some(notes) = update.notes.as_deref() {
                    if let Some(quest) =
                        adventure.active_quests.iter_mut().find(|q| q.id == quest_id)
                    {
                        quest.append_note(notes);
                    }
                }
                applied += 1;
            }
        }
    }

    state.save().await?;
    Ok(applied)
}

fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| haystack.contains(kw))
}

fn quest_mentioned(narrative_lower: &str, quest_name: &str) -> bool {
    let name_lower = quest_name.to_lowercase();
    if narrative_lower.contains(&name_lower) {
        return true;
    }
    name_lower
        .split_whitespace()
        .filter(|word| word.len() > 3)
        .any(|word| narrative_lower.contains(word))
}

/// A window of text around where the quest comes up, whitespace collapsed.
fn extract_snippet(narrative: &str, quest_name: &str) -> String {
    let lower = narrative.to_lowercase();
    let mut index = lower.find(&quest_name.to_lowercase());
    if index.is_none() {
        for word in quest_name.split_whitespace().filter(|w| w.len() > 3) {
            index = lower.find(&word.to_lowercase());
            if index.is_some() {
                break;
            }
        }
    }
    let Some(index) = index else {
        return String::new();
    };

    let start = floor_boundary(narrative, index.saturating_sub(100));
    let end = ceil_boundary(narrative, index + 100);
    narrative[start..end]
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn floor_boundary(s: &str, mut i: usize) -> usize {
    i = i.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(s: &str, mut i: usize) -> usize {
    if i >= s.len() {
        return s.len();
    }
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

fn detect_new_quests(narrative: &str, current_quests: &[Quest], updates: &mut Vec<QuestUpdate>) {
    let mut seen: Vec<String> = Vec::new();

    for pattern in NEW_QUEST_PATTERNS {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        for captures in re.captures_iter(narrative) {
            let Some(capture) = captures.get(1) else {
                continue;
            };
            let name = capture.as_str().trim();
            if name.is_empty() || name.len() >= 100 {
                continue;
            }
            let name_lower = name.to_lowercase();
            let exists = current_quests
                .iter()
                .any(|q| q.name.to_lowercase() == name_lower);
            if exists || seen.contains(&name_lower) {
                continue;
            }
            seen.push(name_lower);

            let description = describe_new_quest(narrative, name);
            updates.push(QuestUpdate {
                action: QuestAction::Create,
                quest_id: None,
                name: Some(name.to_string()),
                description: (!description.is_empty()).then_some(description),
                status: QuestStatus::NotStarted,
                notes: None,
            });
        }
    }
}

/// Best-effort description: the sentence naming the quest, else the first
/// sentence that talks about a quest at all.
fn describe_new_quest(narrative: &str, name: &str) -> String {
    let name_lower = name.to_lowercase();
    for sentence in narrative.split('.') {
        if sentence.to_lowercase().contains(&name_lower) {
            return sentence.trim().to_string();
        }
    }
    for sentence in narrative.split('.') {
        let lower = sentence.to_lowercase();
        if ["quest", "mission", "task", "goal"]
            .iter()
            .any(|word| lower.contains(word))
        {
            return sentence.trim().to_string();
        }
    }
    String::new()
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_separator = true;
    for ch in name.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_separator = false;
        } else if !last_was_separator {
            slug.push('_');
            last_was_separator = true;
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}
