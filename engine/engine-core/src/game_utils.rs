//! Shared utilities for two-player game implementations
//!
//! Common helpers used by games, the search core and the self-play actor
//! so that every component agrees on outcome signs and encodings.

use crate::typed::Player;

/// Value of a finished game from one player's perspective.
///
/// # Returns
/// * `1.0` if `perspective` won
/// * `-1.0` if `perspective` lost
/// * `0.0` for draws (and for games without a winner yet)
///
/// # Example
/// ```
/// use engine_core::{outcome_value, Player};
///
/// assert_eq!(outcome_value(Some(Player::One), Player::One), 1.0);
/// assert_eq!(outcome_value(Some(Player::One), Player::Two), -1.0);
/// assert_eq!(outcome_value(None, Player::Two), 0.0);
/// ```
#[inline]
pub fn outcome_value(winner: Option<Player>, perspective: Player) -> f32 {
    match winner {
        Some(w) if w == perspective => 1.0,
        Some(_) => -1.0,
        None => 0.0,
    }
}

/// Write a one-hot group into `out` at `offset`.
///
/// `out[offset + hot]` is set to 1.0; the rest of the group is left untouched,
/// so callers start from a zeroed buffer. Out-of-range indices are ignored.
///
/// # Example
/// ```
/// use engine_core::game_utils::one_hot;
///
/// let mut features = vec![0.0f32; 6];
/// one_hot(&mut features, 3, 3, 1);
/// assert_eq!(features, vec![0.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
/// ```
#[inline]
pub fn one_hot(out: &mut [f32], offset: usize, width: usize, hot: usize) {
    if hot < width {
        if let Some(slot) = out.get_mut(offset + hot) {
            *slot = 1.0;
        }
    }
}

/// Normalize non-negative weights in place so they sum to 1.
///
/// Negative and non-finite entries are clamped to 0 first. Returns `false`
/// (leaving the slice zeroed) when no positive mass remains.
pub fn normalize_weights(weights: &mut [f32]) -> bool {
    for w in weights.iter_mut() {
        if !w.is_finite() || *w < 0.0 {
            *w = 0.0;
        }
    }
    let sum: f32 = weights.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return false;
    }
    for w in weights.iter_mut() {
        *w /= sum;
    }
    true
}
