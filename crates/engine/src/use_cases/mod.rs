//! Use cases - Game orchestration.
//!
//! Each module covers one concern of running a session: adventure state and
//! chapter flow, prompt context assembly, dice-backed mechanics, the tool
//! surface, milestone progression, the quest log, and the DM turn itself.

pub mod context;
pub mod mechanics;
pub mod progression;
pub mod quest_log;
pub mod session;
pub mod state;
pub mod tools;
pub mod turn;

pub use context::ContextEngine;
pub use mechanics::MechanicsEngine;
pub use session::{GameSession, SessionRegistry, SessionSummary};
pub use state::{AdventureState, SkipPolicy, StateError};
pub use turn::{DmAgent, TurnError, TurnOutcome};
