//! Player-input classification.
//!
//! Two cheap keyword passes steer the narration loop before any model is
//! called: the *turn kind* sets how long the response is allowed to be,
//! and the *context tier* sets how much of the adventure briefing gets
//! assembled into the prompt. Matching is plain lowercase substring
//! search; that is deliberate, these run on every keystroke of play.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

const COMBAT_WORDS: &[&str] = &[
    "attack", "hit", "strike", "shoot", "stab", "slash", "cast", "fireball", "spell", "swing",
    "punch", "kick",
];

const SCENE_WORDS: &[&str] = &[
    "enter", "arrive", "open door", "approach", "go to", "walk into", "step into", "move to",
    "head to",
];

const DIALOGUE_WORDS: &[&str] = &[
    "talk", "speak", "ask", "tell", "say to", "greet", "question", "inquire", "chat", "converse",
];

const SKILL_WORDS: &[&str] = &[
    "search", "investigate", "look for", "examine", "check for", "perceive", "inspect", "study",
];

const EXPLORE_WORDS: &[&str] = &[
    "look around", "survey", "observe", "scan", "take in", "view", "regard",
];

/// What kind of response a player action calls for.
///
/// Combat beats should be terse, scene transitions lavish; the kind maps
/// to a response token budget on both model calls of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    CombatAction,
    SceneDescription,
    NpcDialogue,
    SkillCheck,
    Exploration,
    Standard,
}

impl TurnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CombatAction => "combat_action",
            Self::SceneDescription => "scene_description",
            Self::NpcDialogue => "npc_dialogue",
            Self::SkillCheck => "skill_check",
            Self::Exploration => "exploration",
            Self::Standard => "standard",
        }
    }

    /// Response budget for the opening model call of a turn.
    pub fn initial_token_budget(&self) -> u32 {
        match self {
            Self::CombatAction => 150,
            Self::SceneDescription => 500,
            Self::NpcDialogue => 250,
            Self::SkillCheck => 150,
            Self::Exploration => 350,
            Self::Standard => 200,
        }
    }

    /// Response budget for the final narration call, after tool results
    /// are in. Larger than the opening budget so the wrap-up does not get
    /// cut mid-sentence.
    pub fn narration_token_budget(&self) -> u32 {
        match self {
            Self::CombatAction => 200,
            Self::SceneDescription => 600,
            Self::NpcDialogue => 350,
            Self::SkillCheck => 200,
            Self::Exploration => 450,
            Self::Standard => 300,
        }
    }
}

impl fmt::Display for TurnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a player action. Active combat wins outright; otherwise the
/// first keyword table that matches decides.
pub fn classify_turn(input: &str, combat_active: bool) -> TurnKind {
    if combat_active {
        return TurnKind::CombatAction;
    }

    let lower = input.to_lowercase();
    let matches = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    if matches(COMBAT_WORDS) {
        TurnKind::CombatAction
    } else if matches(SCENE_WORDS) {
        TurnKind::SceneDescription
    } else if matches(DIALOGUE_WORDS) {
        TurnKind::NpcDialogue
    } else if matches(SKILL_WORDS) {
        TurnKind::SkillCheck
    } else if matches(EXPLORE_WORDS) {
        TurnKind::Exploration
    } else {
        TurnKind::Standard
    }
}

const DETAILED_TIER_WORDS: &[&str] = &[
    "recap",
    "summary",
    "remind me",
    "what's happening",
    "where am i",
    "what was",
    "confused",
    "what's my quest",
];

const STANDARD_TIER_WORDS: &[&str] = &[
    "look around",
    "what do i see",
    "describe",
    "where are we",
    "status",
    "investigate",
    "search",
];

/// How much of the adventure briefing goes into the prompt.
///
/// Most actions run on the minimal tier; the full recap is assembled only
/// when the player actually asks for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextTier {
    Minimal,
    Standard,
    Detailed,
}

impl ContextTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Standard => "standard",
            Self::Detailed => "detailed",
        }
    }

    /// Upper bound on the estimated token size of a briefing at this tier.
    pub fn token_ceiling(&self) -> usize {
        match self {
            Self::Minimal => 400,
            Self::Standard => 800,
            Self::Detailed => 1500,
        }
    }
}

impl fmt::Display for ContextTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextTier {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minimal" => Ok(Self::Minimal),
            "standard" => Ok(Self::Standard),
            "detailed" => Ok(Self::Detailed),
            other => Err(DomainError::parse(format!(
                "Unknown context tier: {other}"
            ))),
        }
    }
}

/// Pick the context tier for a player action.
pub fn classify_tier(input: &str) -> ContextTier {
    let lower = input.to_lowercase();

    if DETAILED_TIER_WORDS.iter().any(|w| lower.contains(w)) {
        ContextTier::Detailed
    } else if STANDARD_TIER_WORDS.iter().any(|w| lower.contains(w)) {
        ContextTier::Standard
    } else {
        ContextTier::Minimal
    }
}

/// Is the player poking at their surroundings? If so the current
/// location's area detail gets appended to the briefing.
pub fn is_examining(input: &str) -> bool {
    const EXAMINE_WORDS: &[&str] = &[
        "look", "search", "examine", "investigate", "check", "inspect", "explore",
    ];
    let lower = input.to_lowercase();
    EXAMINE_WORDS.iter().any(|w| lower.contains(w))
}

/// Does the input mention an entity known by this id? Ids are
/// underscore-joined names; any word longer than three characters counts
/// as a mention.
pub fn mentions_entity(input: &str, entity_id: &str) -> bool {
    let lower = input.to_lowercase();
    entity_id
        .split('_')
        .filter(|part| part.len() > 3)
        .any(|part| lower.contains(&part.to_lowercase()))
}
