//! Milestone leveling - Eligibility checks tied to chapter progression
//!
//! Advancement uses milestone leveling across the three pillars of play
//! (combat, exploration, social) rather than XP bookkeeping. Each level has
//! a target chapter and a set of loosely-matched objectives; a long rest
//! evaluates them and levels the party when enough has happened since the
//! previous check.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{Adventure, LastLevelUp};

/// Level cap when the adventure does not declare its own `level_range`.
pub const DEFAULT_LEVEL_CAP: u32 = 5;

/// What it takes to advance from a given level
#[derive(Debug, Clone, Copy)]
pub struct LevelMilestone {
    /// Level the party is advancing *from*
    pub level: u32,
    pub chapter: &'static str,
    pub required: &'static [&'static str],
    pub description: &'static str,
}

/// Milestone table for levels 1 through 4 (advancing to 2 through 5).
pub const LEVEL_MILESTONES: [LevelMilestone; 4] = [
    LevelMilestone {
        level: 1,
        chapter: "part1_goblin_arrows",
        required: &["clear_hideout", "rescue_sildar"],
        description: "Complete Cragmaw Hideout and rescue Sildar",
    },
    LevelMilestone {
        level: 2,
        chapter: "part2_phandalin",
        required: &["clear_redbrands"],
        description: "Clear Redbrand Hideout and defeat Glasstaff",
    },
    LevelMilestone {
        level: 3,
        chapter: "part3_spiders_web",
        required: &["find_cragmaw_castle", "rescue_gundren"],
        description: "Find Cragmaw Castle and rescue Gundren",
    },
    LevelMilestone {
        level: 4,
        chapter: "part4_wave_echo_cave",
        required: &["defeat_black_spider", "find_forge"],
        description: "Defeat Black Spider and find Forge of Spells",
    },
];

pub fn milestone_for_level(level: u32) -> Option<&'static LevelMilestone> {
    LEVEL_MILESTONES.iter().find(|m| m.level == level)
}

/// Level cap for an adventure, read from the top of its declared
/// `level_range`. Falls back to [`DEFAULT_LEVEL_CAP`] when the range is
/// absent or empty.
pub fn adventure_level_cap(adventure: &Adventure) -> u32 {
    adventure
        .level_range
        .as_ref()
        .and_then(|range| range.last().copied())
        .filter(|&cap| cap > 0)
        .unwrap_or(DEFAULT_LEVEL_CAP)
}

/// Outcome of an eligibility evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityCheck {
    pub eligible: bool,
    pub reason: String,
    /// The level the party would advance to, or the current level if not
    /// eligible.
    pub new_level: u32,
    pub progress_summary: ProgressSummary,
}

/// What the party has accomplished, as shown to players
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub current_chapter: String,
    pub required_chapter: String,
    pub chapter_match: bool,
    pub required_objectives: Vec<String>,
    pub completed_objectives: Vec<String>,
    pub combat_encounters: usize,
    pub exploration_milestones: usize,
    pub social_interactions: usize,
    pub completed_quests: usize,
    pub recent_activity: bool,
}

/// Result of a long rest, including any level change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongRestOutcome {
    pub level_up: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_level: Option<u32>,
    pub reason: String,
    pub progress_summary: ProgressSummary,
}

/// Snapshot of progression across all three pillars
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressionOverview {
    pub current_level: u32,
    pub current_chapter: String,
    pub combat_encounters: usize,
    pub exploration_milestones: usize,
    pub social_interactions: usize,
    pub completed_quests: usize,
    pub last_level_up: LastLevelUp,
}

/// Evaluate whether the party can advance from `current_level`.
///
/// The check is deterministic for a given adventure state: objectives are
/// matched against discovered locations, combat encounter ids, exploration
/// milestones, and met NPCs; recency compares record timestamps against the
/// last check if one exists. `level_cap` usually comes from
/// [`adventure_level_cap`].
pub fn check_level_up_eligibility(
    adventure: &Adventure,
    current_level: u32,
    level_cap: u32,
) -> EligibilityCheck {
    if current_level >= level_cap {
        return EligibilityCheck {
            eligible: false,
            reason: "Already at maximum level for this adventure".to_string(),
            new_level: current_level,
            progress_summary: ProgressSummary::default(),
        };
    }

    let Some(milestone) = milestone_for_level(current_level) else {
        return EligibilityCheck {
            eligible: false,
            reason: format!("No milestone defined for level {current_level}"),
            new_level: current_level,
            progress_summary: ProgressSummary::default(),
        };
    };

    let current_chapter = adventure.current_state.chapter.as_deref().unwrap_or("");
    let progression = &adventure.progression;

    // Substring match in both directions, so "part1" counts as being in
    // "part1_goblin_arrows" and vice versa.
    let required_chapter = milestone.chapter;
    let chapter_match =
        current_chapter.contains(required_chapter) || required_chapter.contains(current_chapter);

    let completed_objectives = completed_objectives(adventure, milestone);

    let last_check = adventure.last_level_up.checked_at;
    let recent_activity = progression.has_activity_since(last_check);

    let (objectives_met, chapter_progress) = if current_level < 2 {
        // Advancing past level 1 is lenient: any activity in or around Part 1
        (
            !completed_objectives.is_empty() || !progression.combat_encounters.is_empty(),
            chapter_match || current_chapter.to_lowercase().contains("part1"),
        )
    } else {
        // Higher levels need 60% of the named objectives
        let needed = (milestone.required.len() as f64 * 0.6).max(1.0);
        (
            completed_objectives.len() as f64 >= needed,
            chapter_match,
        )
    };

    let eligible = (objectives_met || chapter_progress) && recent_activity;

    let progress_summary = ProgressSummary {
        current_chapter: current_chapter.to_string(),
        required_chapter: required_chapter.to_string(),
        chapter_match,
        required_objectives: milestone.required.iter().map(|s| s.to_string()).collect(),
        completed_objectives: completed_objectives.clone(),
        combat_encounters: progression.combat_encounters.len(),
        exploration_milestones: progression.exploration_milestones.len(),
        social_interactions: progression.social_interactions.len(),
        completed_quests: adventure.completed_quest_count(),
        recent_activity,
    };

    let reason = if eligible {
        format!("Completed milestone: {}", milestone.description)
    } else {
        let mut missing = Vec::new();
        if !chapter_progress {
            missing.push(format!("reach chapter {required_chapter}"));
        }
        if !objectives_met {
            let outstanding: Vec<&str> = milestone
                .required
                .iter()
                .copied()
                .filter(|obj| !completed_objectives.iter().any(|c| c == obj))
                .collect();
            missing.push(format!("complete objectives: {}", outstanding.join(", ")));
        }
        if !recent_activity {
            missing.push(
                "make meaningful progress (combat, exploration, or social interaction)"
                    .to_string(),
            );
        }
        format!("Need to: {}", missing.join(", "))
    };

    EligibilityCheck {
        eligible,
        reason,
        new_level: if eligible {
            current_level + 1
        } else {
            current_level
        },
        progress_summary,
    }
}

/// Match the milestone's objective keywords against what actually happened.
///
/// Matching is deliberately loose: an objective can be satisfied by a
/// discovered location, a combat encounter id, an exploration milestone, or
/// a met NPC, depending on its wording.
fn completed_objectives(adventure: &Adventure, milestone: &LevelMilestone) -> Vec<String> {
    let progression = &adventure.progression;
    let mut completed: Vec<String> = Vec::new();
    let mark = |obj: &str, done: bool, completed: &mut Vec<String>| {
        if done && !completed.iter().any(|c| c == obj) {
            completed.push(obj.to_string());
        }
    };

    let combat_id_contains = |needle: &str| {
        progression
            .combat_encounters
            .iter()
            .any(|e| e.id.to_lowercase().contains(needle))
    };
    let exploration_contains = |needle: &str| {
        progression
            .exploration_milestones
            .iter()
            .any(|m| m.milestone.to_lowercase().contains(needle))
    };
    let social_npc_contains = |needle: &str| {
        progression.social_interactions.iter().any(|s| {
            s.npc
                .as_deref()
                .is_some_and(|npc| npc.to_lowercase().contains(needle))
        })
    };

    for obj in milestone.required {
        let obj_lower = obj.to_lowercase();

        // Clearing a lair counts once the place is found or fought in
        if obj_lower.contains("hideout") || obj_lower.contains("clear") {
            if obj_lower.contains("cragmaw") {
                let done = adventure.has_discovered("cragmaw_hideout")
                    || !progression.combat_encounters.is_empty();
                mark(obj, done, &mut completed);
            } else if obj_lower.contains("redbrand") {
                let done =
                    adventure.has_discovered("redbrand_hideout") || combat_id_contains("redbrand");
                mark(obj, done, &mut completed);
            }
        }

        // Boss kills are matched against combat encounter ids
        if obj_lower.contains("black_spider")
            || obj_lower.contains("nezznar")
            || obj_lower.contains("defeat")
        {
            let done = combat_id_contains("black_spider") || combat_id_contains("nezznar");
            mark(obj, done, &mut completed);
        }

        // Discovery objectives
        if obj_lower.contains("find") || obj_lower.contains("castle") {
            if obj_lower.contains("cragmaw_castle") {
                mark(obj, adventure.has_discovered("cragmaw_castle"), &mut completed);
            } else if obj_lower.contains("forge") {
                mark(obj, exploration_contains("forge"), &mut completed);
            }
        }

        // Rescues count once the NPC has been met
        if obj_lower.contains("rescue") {
            if obj_lower.contains("sildar") {
                let done =
                    adventure.has_met("sildar_hallwinter") || social_npc_contains("sildar");
                mark(obj, done, &mut completed);
            } else if obj_lower.contains("gundren") {
                let done =
                    adventure.has_met("gundren_rockseeker") || social_npc_contains("gundren");
                mark(obj, done, &mut completed);
            }
        }
    }

    // A milestone with no named objectives falls back to general activity
    if milestone.required.is_empty() {
        let current_chapter = adventure.current_state.chapter.as_deref().unwrap_or("");
        let chapter_match = current_chapter.contains(milestone.chapter)
            || milestone.chapter.contains(current_chapter);
        if chapter_match && progression.has_activity_since(None) {
            completed.push("general_progress".to_string());
        }
    }

    completed
}

/// Take a long rest: always stamps the check, levels the party if eligible.
pub fn process_long_rest(
    adventure: &mut Adventure,
    current_level: u32,
    level_cap: u32,
    now: DateTime<Utc>,
) -> LongRestOutcome {
    let check = check_level_up_eligibility(adventure, current_level, level_cap);

    adventure.last_level_up.record_check(current_level, now);

    if check.eligible {
        adventure.last_level_up.record_level_up(check.new_level, now);
        adventure.set_party_level(check.new_level);
        LongRestOutcome {
            level_up: true,
            old_level: Some(current_level),
            new_level: Some(check.new_level),
            current_level: None,
            reason: check.reason,
            progress_summary: check.progress_summary,
        }
    } else {
        LongRestOutcome {
            level_up: false,
            old_level: None,
            new_level: None,
            current_level: Some(current_level),
            reason: check.reason,
            progress_summary: check.progress_summary,
        }
    }
}

/// Cross-pillar progression snapshot for status endpoints.
pub fn progression_overview(adventure: &Adventure) -> ProgressionOverview {
    ProgressionOverview {
        current_level: adventure.current_state.party_level,
        current_chapter: adventure
            .current_state
            .chapter
            .clone()
            .unwrap_or_default(),
        combat_encounters: adventure.progression.combat_encounters.len(),
        exploration_milestones: adventure.progression.exploration_milestones.len(),
        social_interactions: adventure.progression.social_interactions.len(),
        completed_quests: adventure.completed_quest_count(),
        last_level_up: adventure.last_level_up.clone(),
    }
}
