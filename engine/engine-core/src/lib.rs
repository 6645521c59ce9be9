//! Core traits and types for the rpszero game engine
//!
//! This crate provides the contract between the search core and the games it plays:
//! - `Game`: Typed, copy-on-write trait over positions and moves
//! - `Player`: The two seats of a zero-sum game
//! - `GameError`: Failures when applying moves or building a game
//! - `GameMetadata`: Sizes and display information consumed by actors and models
//!
//! Search code depends only on this crate; concrete games live in their own crates.

pub mod game_utils;
pub mod metadata;
pub mod typed;

// Re-export main types for convenience
pub use game_utils::outcome_value;
pub use metadata::GameMetadata;
pub use typed::{Game, GameError, Player};
