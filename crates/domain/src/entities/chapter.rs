//! Chapter entity - One part of an adventure module
//!
//! Chapter files in the wild are loosely structured: objectives appear both
//! as bare strings and as objects with a `description` field, and the chapter
//! heading may be under `title` or `name`. The entity absorbs both shapes so
//! the rest of the crate never has to care.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A chapter document loaded from the adventure's data directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub objectives: Vec<ChapterObjective>,
    /// Locations a party is expected to have found before moving past this
    /// chapter; consulted when a chapter skip is requested.
    #[serde(default)]
    pub key_locations: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Chapter {
    /// Preferred heading: `title`, falling back to `name`, then the id.
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(&self.id)
    }
}

/// An objective entry, either a plain string or an object with a description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChapterObjective {
    Detailed {
        description: String,
        #[serde(flatten)]
        extra: Map<String, Value>,
    },
    Text(String),
}

impl ChapterObjective {
    pub fn description(&self) -> &str {
        match self {
            Self::Detailed { description, .. } => description,
            Self::Text(text) => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_mixed_objective_shapes() {
        let chapter: Chapter = serde_json::from_value(serde_json::json!({
            "id": "part1_goblin_arrows",
            "title": "Goblin Arrows",
            "overview": "The party escorts a wagon to Phandalin.",
            "objectives": [
                "Escort the wagon safely",
                {"description": "Investigate the goblin ambush", "optional": true}
            ],
            "key_locations": ["cragmaw_hideout"]
        }))
        .unwrap();

        assert_eq!(chapter.objectives.len(), 2);
        assert_eq!(chapter.objectives[0].description(), "Escort the wagon safely");
        assert_eq!(
            chapter.objectives[1].description(),
            "Investigate the goblin ambush"
        );
    }

    #[test]
    fn test_display_title_fallbacks() {
        let with_title: Chapter = serde_json::from_value(serde_json::json!({
            "id": "part2", "title": "Phandalin", "name": "ignored"
        }))
        .unwrap();
        assert_eq!(with_title.display_title(), "Phandalin");

        let with_name: Chapter = serde_json::from_value(serde_json::json!({
            "id": "part2", "name": "Phandalin"
        }))
        .unwrap();
        assert_eq!(with_name.display_title(), "Phandalin");

        let bare: Chapter = serde_json::from_value(serde_json::json!({"id": "part2"})).unwrap();
        assert_eq!(bare.display_title(), "part2");
    }
}
