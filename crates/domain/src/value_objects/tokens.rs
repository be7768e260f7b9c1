//! Rough token estimation for prompt budgeting.
//!
//! Whitespace word count times 1.3, truncated. Coarse, but close enough
//! to keep an assembled context block under its tier ceiling without
//! shipping a tokenizer.

/// Estimate the token count of a prompt fragment.
pub fn estimate_tokens(text: &str) -> usize {
    (text.split_whitespace().count() as f64 * 1.3) as usize
}
