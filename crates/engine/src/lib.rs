//! Loremaster engine library.
//!
//! This crate contains all server-side code for the Loremaster game master.
//!
//! ## Structure
//!
//! - `use_cases/` - Session state, turn orchestration, and game mechanics
//! - `infrastructure/` - External dependency implementations (ports + adapters)
//! - `api/` - HTTP and WebSocket entry points
//! - `app` - Application composition

pub mod api;
pub mod app;
pub mod infrastructure;
pub mod use_cases;

pub use app::App;
