//! Value objects - Immutable values defined by their attributes

mod classify;
mod ordinal;
mod tokens;

pub use classify::{
    classify_tier, classify_turn, is_examining, mentions_entity, ContextTier, TurnKind,
};
pub use ordinal::chapter_ordinal;
pub use tokens::estimate_tokens;
