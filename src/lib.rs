pub mod core {
	pub mod clock;
	pub mod engine;
	pub mod error;
	pub mod game;
	pub mod input;
	pub mod lobby;
	pub mod network;
	pub mod renderer;
	pub mod rules;
	pub mod session;
	pub mod termination;
}

pub mod cli;
pub mod config;
pub mod history;

// Re-export for convenience
pub use crate::core::game::{MoveRequest, Side};
pub use crate::core::rules::{ChessRules, RulesEngine};
pub use crate::core::session::Session;
