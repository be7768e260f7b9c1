//! NPC entity - Non-player characters from the adventure's data files
//!
//! NPC sheets are authored content: identity, personality, stock dialogue,
//! and the slowly-changing `current_situation` block. Only a compressed
//! slice of this is ever shown to the narrator, so list fields here keep
//! their full length and the renderer truncates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An NPC document loaded from the adventure's data directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcSheet {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race: Option<String>,
    #[serde(default, rename = "class", skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Personality::is_empty")]
    pub personality: Personality,
    #[serde(default)]
    pub dialogue_examples: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_situation: Option<NpcSituation>,
    #[serde(default)]
    pub information_known: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NpcSheet {
    /// Display name, falling back when the sheet is missing one.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            "Unknown"
        } else {
            &self.name
        }
    }

    /// "race class" line, omitting whichever half is absent.
    pub fn race_class_line(&self) -> Option<String> {
        let parts: Vec<&str> = [self.race.as_deref(), self.class_name.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Authored personality block
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Personality {
    #[serde(default)]
    pub traits: Vec<String>,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mannerisms: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Personality {
    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
            && self.goals.is_empty()
            && self.mannerisms.is_none()
            && self.extra.is_empty()
    }
}

/// Where the NPC is and what state they are in right now
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcSituation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NpcSituation {
    pub fn status_text(&self) -> &str {
        self.status.as_deref().unwrap_or("normal")
    }
}
