//! Chapter ordinal extraction.
//!
//! Adventure data names chapters in two conventions, `part1_goblin_arrows`
//! and `ch01`. Progression rules need the number to tell "one step forward"
//! from "skipping ahead".

/// Pull the ordinal out of a chapter id.
///
/// `part`-style ids take consecutive digits right after the prefix;
/// `ch`-style ids take every digit in the remainder. Anything else has
/// no ordinal.
pub fn chapter_ordinal(chapter_id: &str) -> Option<u32> {
    if let Some(rest) = chapter_id.strip_prefix("part") {
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if let Ok(n) = digits.parse() {
            return Some(n);
        }
    }

    if let Some(rest) = chapter_id.strip_prefix("ch") {
        let digits: String = rest.chars().filter(|c| c.is_ascii_digit()).collect();
        if let Ok(n) = digits.parse() {
            return Some(n);
        }
    }

    None
}
