//! Dice notation parsing and rolling
//!
//! Supports standard notation like "1d20+5", "2d6-1", and the keep-highest
//! form "4d6kh3" used for ability score generation. Rolling goes through
//! `rand::Rng` so callers can supply a seeded generator; the no-argument
//! variants use the thread RNG.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error when parsing a dice formula
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiceParseError {
    /// The formula string is empty
    #[error("Empty dice formula")]
    Empty,
    /// Invalid format - expected XdY, XdYkhZ, or XdY+Z
    #[error("Invalid dice format: {0}")]
    InvalidFormat(String),
    /// Dice count must be at least 1
    #[error("Dice count must be at least 1")]
    InvalidDiceCount,
    /// Die size must be at least 2
    #[error("Die size must be at least 2")]
    InvalidDieSize,
}

/// A parsed dice formula like "2d6+3" or "4d6kh3"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceFormula {
    /// Number of dice to roll (X in XdY)
    pub dice_count: u8,
    /// Size of each die (Y in XdY)
    pub die_size: u8,
    /// Keep only this many of the highest dice (Z in XdYkhZ)
    pub keep_highest: Option<u8>,
    /// Modifier to add/subtract after rolling (+M or -M)
    pub modifier: i32,
}

impl DiceFormula {
    pub fn new(dice_count: u8, die_size: u8, modifier: i32) -> Result<Self, DiceParseError> {
        if dice_count == 0 {
            return Err(DiceParseError::InvalidDiceCount);
        }
        if die_size < 2 {
            return Err(DiceParseError::InvalidDieSize);
        }
        Ok(Self {
            dice_count,
            die_size,
            keep_highest: None,
            modifier,
        })
    }

    /// Parse a dice formula string like "1d20+5", "2d6-1", "4d6kh3"
    ///
    /// Supported formats:
    /// - "XdY" - Roll X dice of size Y
    /// - "XdYkhZ" - Roll X dice, keep the Z highest
    /// - "XdY+M" / "XdY-M" - Apply a flat modifier after rolling
    /// - "dY" - Roll 1 die of size Y (shorthand)
    pub fn parse(input: &str) -> Result<Self, DiceParseError> {
        let input = input.trim().to_lowercase();
        if input.is_empty() {
            return Err(DiceParseError::Empty);
        }

        // Manual parse to keep the domain layer free of regex
        let d_pos = input.find('d').ok_or_else(|| {
            DiceParseError::InvalidFormat(format!("Missing 'd' separator in '{input}'"))
        })?;

        let dice_count_str = &input[..d_pos];
        let dice_count: u8 = if dice_count_str.is_empty() {
            1 // "d20" means "1d20"
        } else {
            dice_count_str.parse().map_err(|_| {
                DiceParseError::InvalidFormat(format!("Invalid dice count: '{dice_count_str}'"))
            })?
        };

        if dice_count == 0 {
            return Err(DiceParseError::InvalidDiceCount);
        }

        let after_d = &input[d_pos + 1..];

        // Modifier comes last, so split it off first
        let (before_mod, modifier) = if let Some(plus_pos) = after_d.find('+') {
            let mod_str = &after_d[plus_pos + 1..];
            let modifier: i32 = mod_str.parse().map_err(|_| {
                DiceParseError::InvalidFormat(format!("Invalid modifier: '+{mod_str}'"))
            })?;
            (&after_d[..plus_pos], modifier)
        } else if let Some(minus_pos) = after_d.rfind('-') {
            if minus_pos == 0 {
                return Err(DiceParseError::InvalidFormat(format!(
                    "Invalid die size: '{after_d}'"
                )));
            }
            let mod_str = &after_d[minus_pos + 1..];
            let modifier: i32 = mod_str.parse().map_err(|_| {
                DiceParseError::InvalidFormat(format!("Invalid modifier: '-{mod_str}'"))
            })?;
            (&after_d[..minus_pos], -modifier)
        } else {
            (after_d, 0)
        };

        // Then the optional keep-highest suffix
        let (die_size_str, keep_highest) = if let Some(kh_pos) = before_mod.find("kh") {
            let keep_str = &before_mod[kh_pos + 2..];
            let keep: u8 = keep_str.parse().map_err(|_| {
                DiceParseError::InvalidFormat(format!("Invalid keep-highest count: '{keep_str}'"))
            })?;
            (&before_mod[..kh_pos], Some(keep))
        } else {
            (before_mod, None)
        };

        let die_size: u8 = die_size_str.parse().map_err(|_| {
            DiceParseError::InvalidFormat(format!("Invalid die size: '{die_size_str}'"))
        })?;

        if die_size < 2 {
            return Err(DiceParseError::InvalidDieSize);
        }

        Ok(Self {
            dice_count,
            die_size,
            keep_highest,
            modifier,
        })
    }

    /// Roll using the thread RNG.
    pub fn roll(&self) -> DiceRollResult {
        self.roll_with(&mut rand::thread_rng())
    }

    /// Roll with a caller-supplied RNG.
    pub fn roll_with(&self, rng: &mut impl Rng) -> DiceRollResult {
        let mut rolls = Vec::with_capacity(self.dice_count as usize);
        for _ in 0..self.dice_count {
            rolls.push(rng.gen_range(1..=self.die_size as i32));
        }

        let kept = match self.keep_highest {
            Some(keep) => {
                let mut sorted = rolls.clone();
                sorted.sort_unstable_by(|a, b| b.cmp(a));
                sorted.truncate(keep as usize);
                sorted
            }
            None => rolls.clone(),
        };

        let dice_total: i32 = kept.iter().sum();
        let total = dice_total + self.modifier;

        DiceRollResult {
            formula: self.clone(),
            rolls,
            kept,
            dice_total,
            modifier_applied: self.modifier,
            total,
        }
    }

    pub fn min_roll(&self) -> i32 {
        let kept = self
            .keep_highest
            .map_or(self.dice_count, |k| k.min(self.dice_count));
        kept as i32 + self.modifier
    }

    pub fn max_roll(&self) -> i32 {
        let kept = self
            .keep_highest
            .map_or(self.dice_count, |k| k.min(self.dice_count));
        (kept as i32 * self.die_size as i32) + self.modifier
    }

    /// Format as a notation string (e.g., "4d6kh3+2")
    pub fn display(&self) -> String {
        let mut out = format!("{}d{}", self.dice_count, self.die_size);
        if let Some(keep) = self.keep_highest {
            out.push_str(&format!("kh{keep}"));
        }
        if self.modifier > 0 {
            out.push_str(&format!("+{}", self.modifier));
        } else if self.modifier < 0 {
            out.push_str(&format!("{}", self.modifier));
        }
        out
    }

    fn display_without_modifier(&self) -> String {
        match self.keep_highest {
            Some(keep) => format!("{}d{}kh{}", self.dice_count, self.die_size, keep),
            None => format!("{}d{}", self.dice_count, self.die_size),
        }
    }
}

impl fmt::Display for DiceFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Result of rolling dice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceRollResult {
    /// The formula that was rolled
    pub formula: DiceFormula,
    /// Every die that hit the table
    pub rolls: Vec<i32>,
    /// The dice that counted (equals `rolls` unless keep-highest applied)
    pub kept: Vec<i32>,
    /// Sum of kept dice before modifier
    pub dice_total: i32,
    /// Modifier that was applied
    pub modifier_applied: i32,
    /// Final total (dice_total + modifier)
    pub total: i32,
}

impl DiceRollResult {
    /// Format as a breakdown string (e.g., "1d20(14) + 5 = 19")
    pub fn breakdown(&self) -> String {
        let dice_part = if self.kept.len() == 1 {
            format!("{}({})", self.formula.display_without_modifier(), self.kept[0])
        } else {
            let rolls_str: Vec<String> = self.kept.iter().map(|r| r.to_string()).collect();
            format!(
                "{}[{}]",
                self.formula.display_without_modifier(),
                rolls_str.join(", ")
            )
        };

        if self.modifier_applied == 0 {
            format!("{} = {}", dice_part, self.total)
        } else if self.modifier_applied > 0 {
            format!("{} + {} = {}", dice_part, self.modifier_applied, self.total)
        } else {
            format!("{} - {} = {}", dice_part, -self.modifier_applied, self.total)
        }
    }

    /// Check if this is a natural 20 (single kept d20)
    pub fn is_natural_20(&self) -> bool {
        self.formula.die_size == 20 && self.kept.len() == 1 && self.kept.first() == Some(&20)
    }

    /// Check if this is a natural 1 (single kept d20)
    pub fn is_natural_1(&self) -> bool {
        self.formula.die_size == 20 && self.kept.len() == 1 && self.kept.first() == Some(&1)
    }
}

/// Roll a d20 twice and take the higher.
pub fn roll_advantage(rng: &mut impl Rng) -> i32 {
    let first = rng.gen_range(1..=20);
    let second = rng.gen_range(1..=20);
    first.max(second)
}

/// Roll a d20 twice and take the lower.
pub fn roll_disadvantage(rng: &mut impl Rng) -> i32 {
    let first = rng.gen_range(1..=20);
    let second = rng.gen_range(1..=20);
    first.min(second)
}

/// A single d20, honoring advantage/disadvantage. Advantage wins when both
/// flags are set.
pub fn d20(advantage: bool, disadvantage: bool, rng: &mut impl Rng) -> i32 {
    if advantage {
        roll_advantage(rng)
    } else if disadvantage {
        roll_disadvantage(rng)
    } else {
        rng.gen_range(1..=20)
    }
}

/// Roll a full set of ability scores: six 4d6-keep-highest-3.
pub fn roll_stats(rng: &mut impl Rng) -> [i32; 6] {
    let formula = DiceFormula {
        dice_count: 4,
        die_size: 6,
        keep_highest: Some(3),
        modifier: 0,
    };
    let mut stats = [0i32; 6];
    for slot in &mut stats {
        *slot = formula.roll_with(rng).total;
    }
    stats
}

/// Outcome of a death saving throw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathSaveOutcome {
    /// Natural 20: back up with 1 HP
    Critical,
    /// Natural 1: counts as two failures
    CriticalFailure,
    Success,
    Failure,
}

impl DeathSaveOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::CriticalFailure => "critical_failure",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for DeathSaveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a d20 roll as a death save result.
pub fn resolve_death_save(roll: i32) -> DeathSaveOutcome {
    match roll {
        20 => DeathSaveOutcome::Critical,
        1 => DeathSaveOutcome::CriticalFailure,
        r if r >= 10 => DeathSaveOutcome::Success,
        _ => DeathSaveOutcome::Failure,
    }
}

/// Roll a death saving throw.
pub fn death_save(rng: &mut impl Rng) -> DeathSaveOutcome {
    resolve_death_save(rng.gen_range(1..=20))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_parse_simple_d20() {
        let formula = DiceFormula::parse("1d20").unwrap();
        assert_eq!(formula.dice_count, 1);
        assert_eq!(formula.die_size, 20);
        assert_eq!(formula.keep_highest, None);
        assert_eq!(formula.modifier, 0);
    }

    #[test]
    fn test_parse_shorthand_d20() {
        let formula = DiceFormula::parse("d20").unwrap();
        assert_eq!(formula.dice_count, 1);
        assert_eq!(formula.die_size, 20);
    }

    #[test]
    fn test_parse_with_positive_modifier() {
        let formula = DiceFormula::parse("1d20+5").unwrap();
        assert_eq!(formula.modifier, 5);
    }

    #[test]
    fn test_parse_with_negative_modifier() {
        let formula = DiceFormula::parse("2d6-1").unwrap();
        assert_eq!(formula.dice_count, 2);
        assert_eq!(formula.die_size, 6);
        assert_eq!(formula.modifier, -1);
    }

    #[test]
    fn test_parse_keep_highest() {
        let formula = DiceFormula::parse("4d6kh3").unwrap();
        assert_eq!(formula.dice_count, 4);
        assert_eq!(formula.die_size, 6);
        assert_eq!(formula.keep_highest, Some(3));
        assert_eq!(formula.modifier, 0);
    }

    #[test]
    fn test_parse_keep_highest_with_modifier() {
        let formula = DiceFormula::parse("4d6kh3+2").unwrap();
        assert_eq!(formula.keep_highest, Some(3));
        assert_eq!(formula.modifier, 2);
    }

    #[test]
    fn test_parse_case_insensitive_and_whitespace() {
        let formula = DiceFormula::parse("  1D20+5  ").unwrap();
        assert_eq!(formula.die_size, 20);
        assert_eq!(formula.modifier, 5);
    }

    #[test]
    fn test_parse_empty() {
        assert!(matches!(DiceFormula::parse(""), Err(DiceParseError::Empty)));
    }

    #[test]
    fn test_parse_invalid_no_d() {
        assert!(matches!(
            DiceFormula::parse("20"),
            Err(DiceParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_parse_invalid_zero_dice() {
        assert!(matches!(
            DiceFormula::parse("0d20"),
            Err(DiceParseError::InvalidDiceCount)
        ));
    }

    #[test]
    fn test_parse_invalid_die_size() {
        assert!(matches!(
            DiceFormula::parse("1d1"),
            Err(DiceParseError::InvalidDieSize)
        ));
    }

    #[test]
    fn test_parse_invalid_keep_highest() {
        assert!(matches!(
            DiceFormula::parse("4d6khx"),
            Err(DiceParseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_roll_range() {
        let formula = DiceFormula::parse("1d20").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let result = formula.roll_with(&mut rng);
            assert!(result.total >= 1 && result.total <= 20);
            assert_eq!(result.rolls.len(), 1);
        }
    }

    #[test]
    fn test_roll_with_modifier() {
        let formula = DiceFormula::parse("2d6+3").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let result = formula.roll_with(&mut rng);
            assert!(result.total >= 5 && result.total <= 15);
            assert_eq!(result.modifier_applied, 3);
            assert_eq!(result.dice_total + 3, result.total);
        }
    }

    #[test]
    fn test_keep_highest_keeps_the_largest_dice() {
        let formula = DiceFormula::parse("4d6kh3").unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..100 {
            let result = formula.roll_with(&mut rng);
            assert_eq!(result.rolls.len(), 4);
            assert_eq!(result.kept.len(), 3);
            assert_eq!(result.dice_total, result.kept.iter().sum::<i32>());
            assert!(result.total >= 3 && result.total <= 18);

            // The dropped die can be no larger than any kept die
            let mut sorted = result.rolls.clone();
            sorted.sort_unstable();
            let dropped = sorted[0];
            assert!(result.kept.iter().all(|&k| k >= dropped));
        }
    }

    #[test]
    fn test_roll_stats_produces_six_valid_scores() {
        let mut rng = StdRng::seed_from_u64(1);
        let stats = roll_stats(&mut rng);
        assert_eq!(stats.len(), 6);
        for stat in stats {
            assert!((3..=18).contains(&stat));
        }
    }

    #[test]
    fn test_advantage_and_disadvantage_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..100 {
            let adv = roll_advantage(&mut rng);
            let dis = roll_disadvantage(&mut rng);
            assert!((1..=20).contains(&adv));
            assert!((1..=20).contains(&dis));
        }
    }

    #[test]
    fn test_resolve_death_save() {
        assert_eq!(resolve_death_save(20), DeathSaveOutcome::Critical);
        assert_eq!(resolve_death_save(1), DeathSaveOutcome::CriticalFailure);
        assert_eq!(resolve_death_save(10), DeathSaveOutcome::Success);
        assert_eq!(resolve_death_save(19), DeathSaveOutcome::Success);
        assert_eq!(resolve_death_save(9), DeathSaveOutcome::Failure);
        assert_eq!(resolve_death_save(2), DeathSaveOutcome::Failure);
    }

    #[test]
    fn test_death_save_serializes_snake_case() {
        let json = serde_json::to_string(&DeathSaveOutcome::CriticalFailure).unwrap();
        assert_eq!(json, "\"critical_failure\"");
    }

    #[test]
    fn test_breakdown_single_die() {
        let result = DiceRollResult {
            formula: DiceFormula::new(1, 20, 5).unwrap(),
            rolls: vec![14],
            kept: vec![14],
            dice_total: 14,
            modifier_applied: 5,
            total: 19,
        };
        assert_eq!(result.breakdown(), "1d20(14) + 5 = 19");
    }

    #[test]
    fn test_breakdown_keep_highest() {
        let mut formula = DiceFormula::new(4, 6, 0).unwrap();
        formula.keep_highest = Some(3);
        let result = DiceRollResult {
            formula,
            rolls: vec![6, 5, 4, 2],
            kept: vec![6, 5, 4],
            dice_total: 15,
            modifier_applied: 0,
            total: 15,
        };
        assert_eq!(result.breakdown(), "4d6kh3[6, 5, 4] = 15");
    }

    #[test]
    fn test_natural_20_and_1() {
        let formula = DiceFormula::new(1, 20, 0).unwrap();
        let nat20 = DiceRollResult {
            formula: formula.clone(),
            rolls: vec![20],
            kept: vec![20],
            dice_total: 20,
            modifier_applied: 0,
            total: 20,
        };
        assert!(nat20.is_natural_20());
        assert!(!nat20.is_natural_1());

        let nat1 = DiceRollResult {
            formula,
            rolls: vec![1],
            kept: vec![1],
            dice_total: 1,
            modifier_applied: 0,
            total: 1,
        };
        assert!(nat1.is_natural_1());
    }

    #[test]
    fn test_display() {
        assert_eq!(DiceFormula::parse("1d20").unwrap().display(), "1d20");
        assert_eq!(DiceFormula::parse("1d20+5").unwrap().display(), "1d20+5");
        assert_eq!(DiceFormula::parse("2d6-1").unwrap().display(), "2d6-1");
        assert_eq!(DiceFormula::parse("4d6kh3+2").unwrap().display(), "4d6kh3+2");
    }

    #[test]
    fn test_min_max_roll_with_keep_highest() {
        let formula = DiceFormula::parse("4d6kh3").unwrap();
        assert_eq!(formula.min_roll(), 3);
        assert_eq!(formula.max_roll(), 18);
    }
}
