//! Typed Game trait consumed by the search core
//!
//! Positions are immutable snapshots: `apply` returns a new state and never
//! mutates its input, so search trees can hold positions by value.

use std::fmt;

use crate::metadata::GameMetadata;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

/// One of the two seats in a two-player zero-sum game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Player {
    One,
    Two,
}

impl Player {
    /// The other seat.
    #[inline]
    pub fn opponent(self) -> Player {
        match self {
            Player::One => Player::Two,
            Player::Two => Player::One,
        }
    }

    /// Zero-based seat index (0 for player one, 1 for player two).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Player::One => 0,
            Player::Two => 1,
        }
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Player::One => write!(f, "Player 1"),
            Player::Two => write!(f, "Player 2"),
        }
    }
}

/// Errors raised by game implementations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("Game is already over")]
    GameOver,
    #[error("Illegal move: {0}")]
    IllegalMove(String),
    #[error("Invalid game configuration: {0}")]
    InvalidConfig(String),
}

/// Main trait for game implementations
///
/// All methods take `&self`: a game value holds only its rules and
/// configuration, while every piece of mutable play lives in `State`.
///
/// # Example
///
/// ```rust
/// # use engine_core::{Game, GameError, GameMetadata, Player};
/// # use rand_chacha::ChaCha20Rng;
/// /// Players alternately add 1 or 2; whoever reaches 5 wins.
/// #[derive(Debug)]
/// struct RaceToFive;
///
/// #[derive(Debug, Clone)]
/// struct Race { total: u8, to_move: Player }
///
/// impl Game for RaceToFive {
///     type State = Race;
///     type Action = u8;
///
///     fn metadata(&self) -> GameMetadata {
///         GameMetadata::new("race", "Race to Five").with_actions(2).with_observation(1)
///     }
///     fn new_game(&self, _rng: &mut ChaCha20Rng) -> Race {
///         Race { total: 0, to_move: Player::One }
///     }
///     fn legal_moves(&self, s: &Race) -> Vec<u8> {
///         if s.total >= 5 { vec![] } else { vec![1, 2] }
///     }
///     fn apply(&self, s: &Race, mv: u8) -> Result<Race, GameError> {
///         if s.total >= 5 { return Err(GameError::GameOver); }
///         Ok(Race { total: s.total + mv, to_move: s.to_move.opponent() })
///     }
///     fn is_terminal(&self, s: &Race) -> bool { s.total >= 5 }
///     fn winner(&self, s: &Race) -> Option<Player> {
///         self.is_terminal(s).then(|| s.to_move.opponent())
///     }
///     fn current_player(&self, s: &Race) -> Player { s.to_move }
///     fn encode(&self, s: &Race) -> Vec<f32> { vec![s.total as f32 / 5.0] }
///     fn action_index(&self, mv: &u8) -> usize { (*mv - 1) as usize }
/// }
/// ```
pub trait Game: Send + Sync + fmt::Debug + 'static {
    /// Immutable position snapshot
    type State: Clone + Send + Sync + fmt::Debug + 'static;

    /// Move identifier - small and Copy
    type Action: Copy + PartialEq + Send + Sync + fmt::Debug + 'static;

    /// Get game metadata (action space size, observation size, display info)
    fn metadata(&self) -> GameMetadata;

    /// Size of the policy vector. Every `action_index` is below this bound.
    fn num_actions(&self) -> usize {
        self.metadata().num_actions
    }

    /// Create a fresh starting position using the supplied RNG.
    fn new_game(&self, rng: &mut ChaCha20Rng) -> Self::State;

    /// Legal moves in a fixed, deterministic enumeration order.
    ///
    /// Empty if and only if the position is terminal.
    fn legal_moves(&self, state: &Self::State) -> Vec<Self::Action>;

    /// Apply a move, returning the successor position.
    ///
    /// Fails with `GameOver` on a terminal position and `IllegalMove` when
    /// the move does not target a legal slot.
    fn apply(&self, state: &Self::State, action: Self::Action) -> Result<Self::State, GameError>;

    fn is_terminal(&self, state: &Self::State) -> bool;

    /// Winner of a finished game, `None` for a draw or an ongoing game.
    fn winner(&self, state: &Self::State) -> Option<Player>;

    /// The player to move.
    fn current_player(&self, state: &Self::State) -> Player;

    /// Feature vector fed to the policy/value model.
    fn encode(&self, state: &Self::State) -> Vec<f32>;

    /// Position of a move in the policy vector.
    fn action_index(&self, action: &Self::Action) -> usize;
}
