//! Location entity - Keyed areas within an adventure's places
//!
//! Location files carry a prose description plus an `areas` map of keyed
//! sub-locations (cave mouths, chambers, streets). Area values are loosely
//! structured in the source data, so optional fields stay optional and
//! unknown keys are preserved.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A location document loaded from the adventure's data directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSheet {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Free-form category such as `town`, `dungeon`, `wilderness`
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Which chapter ordinal this location belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part: Option<u32>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atmosphere: Option<String>,
    /// Keyed sub-areas; BTreeMap keeps rendering order stable
    #[serde(default)]
    pub areas: BTreeMap<String, Area>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LocationSheet {
    pub fn area(&self, area_id: &str) -> Option<&Area> {
        self.areas.get(area_id)
    }
}

/// A keyed sub-area of a location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Area {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encounter: Option<AreaEncounter>,
    /// Secrets waiting to be found; shape varies, only the count is shown
    #[serde(default)]
    pub hidden: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treasure: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Area {
    pub fn secret_count(&self) -> usize {
        self.hidden.len()
    }

    /// Treasure is "present" when the field holds anything non-empty.
    pub fn has_treasure(&self) -> bool {
        match &self.treasure {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(_) => true,
        }
    }
}

/// An encounter attached to an area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaEncounter {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Either a single creature name or a list of them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enemies: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AreaEncounter {
    /// One-line label: the encounter type, else the enemy list, else "Unknown".
    pub fn summary(&self) -> String {
        if let Some(kind) = &self.kind {
            return kind.clone();
        }
        match &self.enemies {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(items)) => {
                let names: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
                if names.is_empty() {
                    "Unknown".to_string()
                } else {
                    names.join(", ")
                }
            }
            _ => "Unknown".to_string(),
        }
    }

    pub fn trigger_text(&self) -> &str {
        self.trigger.as_deref().unwrap_or("when entering")
    }
}
