//! Game metadata for configuration
//!
//! Describes the shapes a game exposes to the rest of the system so that
//! actors, model backends and example stores can configure themselves.

use serde::{Deserialize, Serialize};

/// Metadata about a game
///
/// This struct contains the information needed to:
/// - Size policy and feature vectors (`num_actions`, `obs_size`)
/// - Make example databases self-describing
/// - Render a board for logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameMetadata {
    /// Environment identifier (e.g., "rps_card")
    pub env_id: String,

    /// Human-readable display name
    pub display_name: String,

    /// Board width in cells
    pub board_width: usize,

    /// Board height in cells
    pub board_height: usize,

    /// Length of the policy vector
    pub num_actions: usize,

    /// Length of the feature vector produced by `Game::encode`
    pub obs_size: usize,

    /// Number of players (typically 2)
    pub player_count: usize,

    /// Brief description of the game rules
    pub description: String,
}

impl GameMetadata {
    /// Create a new GameMetadata with required fields
    pub fn new(env_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            env_id: env_id.into(),
            display_name: display_name.into(),
            board_width: 0,
            board_height: 0,
            num_actions: 0,
            obs_size: 0,
            player_count: 2,
            description: String::new(),
        }
    }

    /// Builder method for board dimensions
    pub fn with_board(mut self, width: usize, height: usize) -> Self {
        self.board_width = width;
        self.board_height = height;
        self
    }

    /// Builder method for action count
    pub fn with_actions(mut self, num_actions: usize) -> Self {
        self.num_actions = num_actions;
        self
    }

    /// Builder method for observation size
    pub fn with_observation(mut self, obs_size: usize) -> Self {
        self.obs_size = obs_size;
        self
    }

    /// Builder method for description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Get the total number of board cells
    pub fn board_size(&self) -> usize {
        self.board_width * self.board_height
    }
}
