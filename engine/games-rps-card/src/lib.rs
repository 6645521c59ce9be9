//! Rock-Paper-Scissors card game for the rpszero engine
//!
//! Two players take turns placing cards from their hands onto a shared 3x3
//! board. A freshly placed card captures every orthogonally adjacent
//! opponent card it beats (Rock beats Scissors, Paper beats Rock, Scissors
//! beats Paper). When the board fills or the hands run out, the player
//! owning more board cards wins.
//!
//! # Usage
//!
//! ```rust
//! use engine_core::Game;
//! use games_rps_card::RpsCard;
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha20Rng;
//!
//! let game = RpsCard::default();
//! let mut rng = ChaCha20Rng::seed_from_u64(42);
//! let state = game.new_game(&mut rng);
//!
//! let first = game.legal_moves(&state)[0];
//! let next = game.apply(&state, first).unwrap();
//! assert_eq!(next.hand(engine_core::Player::One).len(), 4);
//! ```

use std::fmt;

use engine_core::game_utils::one_hot;
use engine_core::{Game, GameError, GameMetadata, Player};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

/// Number of board cells.
pub const BOARD_CELLS: usize = 9;
const BOARD_SIDE: usize = 3;
const KINDS: usize = 3;

/// Card kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardKind {
    Rock,
    Paper,
    Scissors,
}

impl CardKind {
    /// Kind at deck position `i`; decks cycle Rock, Paper, Scissors.
    pub fn cycle(i: usize) -> Self {
        match i % KINDS {
            0 => CardKind::Rock,
            1 => CardKind::Paper,
            _ => CardKind::Scissors,
        }
    }

    #[inline]
    pub fn index(self) -> usize {
        match self {
            CardKind::Rock => 0,
            CardKind::Paper => 1,
            CardKind::Scissors => 2,
        }
    }

    /// Whether this card captures `other`.
    #[inline]
    pub fn beats(self, other: CardKind) -> bool {
        matches!(
            (self, other),
            (CardKind::Rock, CardKind::Scissors)
                | (CardKind::Paper, CardKind::Rock)
                | (CardKind::Scissors, CardKind::Paper)
        )
    }

    fn symbol(self, owner: Player) -> char {
        let c = match self {
            CardKind::Rock => 'R',
            CardKind::Paper => 'P',
            CardKind::Scissors => 'S',
        };
        match owner {
            Player::One => c,
            Player::Two => c.to_ascii_lowercase(),
        }
    }
}

/// A card on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub kind: CardKind,
    pub owner: Player,
}

/// Move: play the card at `card_index` of the mover's hand onto `position`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RpsMove {
    pub card_index: u8,
    pub position: u8,
}

impl RpsMove {
    pub fn new(card_index: u8, position: u8) -> Self {
        Self {
            card_index,
            position,
        }
    }
}

/// Game state
///
/// Immutable from the engine's point of view: `RpsCard::apply` clones and
/// returns a successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    board: [Option<Card>; BOARD_CELLS],
    hands: [Vec<CardKind>; 2],
    to_move: Player,
    /// Starts at 1 and advances after player two moves
    round: u32,
}

impl State {
    /// Empty board with the given hands, player one to move in round 1.
    pub fn with_hands(player_one: Vec<CardKind>, player_two: Vec<CardKind>) -> Self {
        Self {
            board: [None; BOARD_CELLS],
            hands: [player_one, player_two],
            to_move: Player::One,
            round: 1,
        }
    }

    /// Place a card directly (used to set up positions).
    pub fn with_card(mut self, position: usize, kind: CardKind, owner: Player) -> Self {
        if position < BOARD_CELLS {
            self.board[position] = Some(Card { kind, owner });
        }
        self
    }

    /// Override the player to move.
    pub fn with_to_move(mut self, player: Player) -> Self {
        self.to_move = player;
        self
    }

    pub fn board(&self) -> &[Option<Card>; BOARD_CELLS] {
        &self.board
    }

    pub fn hand(&self, player: Player) -> &[CardKind] {
        &self.hands[player.index()]
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn to_move(&self) -> Player {
        self.to_move
    }

    /// Number of board cards owned by `player`.
    pub fn owned_by(&self, player: Player) -> usize {
        self.board
            .iter()
            .flatten()
            .filter(|card| card.owner == player)
            .count()
    }

    fn capture_around(&mut self, position: usize) {
        let Some(placed) = self.board[position] else {
            return;
        };
        let row = (position / BOARD_SIDE) as isize;
        let col = (position % BOARD_SIDE) as isize;

        // up, right, down, left
        for (dr, dc) in [(-1isize, 0isize), (0, 1), (1, 0), (0, -1)] {
            let (r, c) = (row + dr, col + dc);
            if !(0..BOARD_SIDE as isize).contains(&r) || !(0..BOARD_SIDE as isize).contains(&c) {
                continue;
            }
            let neighbour = r as usize * BOARD_SIDE + c as usize;
            if let Some(card) = self.board[neighbour].as_mut() {
                if card.owner != placed.owner && placed.kind.beats(card.kind) {
                    card.owner = placed.owner;
                }
            }
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Round {} - {} to move", self.round, self.to_move)?;
        for row in 0..BOARD_SIDE {
            let cells: String = (0..BOARD_SIDE)
                .map(|col| match self.board[row * BOARD_SIDE + col] {
                    Some(card) => card.kind.symbol(card.owner),
                    None => '.',
                })
                .collect();
            writeln!(f, "  {}", cells)?;
        }
        for player in [Player::One, Player::Two] {
            let hand: String = self
                .hand(player)
                .iter()
                .map(|kind| kind.symbol(player))
                .collect();
            writeln!(f, "{} hand: [{}]", player, hand)?;
        }
        Ok(())
    }
}

/// Deal and turn-limit parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpsCardConfig {
    pub deck_size: usize,
    pub hand_size: usize,
    pub max_rounds: u32,
}

impl Default for RpsCardConfig {
    fn default() -> Self {
        Self {
            deck_size: 21,
            hand_size: 5,
            max_rounds: 10,
        }
    }
}

impl RpsCardConfig {
    pub fn validate(&self) -> Result<(), GameError> {
        if self.hand_size == 0 {
            return Err(GameError::InvalidConfig(
                "hand_size must be at least 1".into(),
            ));
        }
        if self.hand_size > u8::MAX as usize {
            return Err(GameError::InvalidConfig(format!(
                "hand_size {} is too large",
                self.hand_size
            )));
        }
        if self.deck_size < 2 * self.hand_size {
            return Err(GameError::InvalidConfig(format!(
                "deck_size {} cannot deal two hands of {}",
                self.deck_size, self.hand_size
            )));
        }
        if self.max_rounds == 0 {
            return Err(GameError::InvalidConfig(
                "max_rounds must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// RPS card game rules
#[derive(Debug, Clone)]
pub struct RpsCard {
    config: RpsCardConfig,
}

impl RpsCard {
    pub fn new(config: RpsCardConfig) -> Result<Self, GameError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &RpsCardConfig {
        &self.config
    }

    /// Feature vector length: board kinds, board owners, hand slots, player flag, round.
    pub fn obs_size(&self) -> usize {
        BOARD_CELLS * KINDS + BOARD_CELLS * 3 + self.config.hand_size * KINDS + 2
    }

    fn round_limit_reached(&self, state: &State) -> bool {
        state.round > self.config.max_rounds
    }
}

impl Default for RpsCard {
    fn default() -> Self {
        Self {
            config: RpsCardConfig::default(),
        }
    }
}

impl Game for RpsCard {
    type State = State;
    type Action = RpsMove;

    fn metadata(&self) -> GameMetadata {
        GameMetadata::new("rps_card", "RPS Card Game")
            .with_board(BOARD_SIDE, BOARD_SIDE)
            .with_actions(self.config.hand_size * BOARD_CELLS)
            .with_observation(self.obs_size())
            .with_description(
                "Place cards on a 3x3 board; a card captures adjacent opponent cards it beats",
            )
    }

    fn num_actions(&self) -> usize {
        self.config.hand_size * BOARD_CELLS
    }

    fn new_game(&self, rng: &mut ChaCha20Rng) -> State {
        let mut deck: Vec<CardKind> = (0..self.config.deck_size).map(CardKind::cycle).collect();
        deck.shuffle(rng);

        let hand = self.config.hand_size;
        State::with_hands(deck[..hand].to_vec(), deck[hand..2 * hand].to_vec())
    }

    fn legal_moves(&self, state: &State) -> Vec<RpsMove> {
        if self.round_limit_reached(state) {
            return Vec::new();
        }
        let hand_len = state.hand(state.to_move).len();
        let mut moves = Vec::with_capacity(hand_len * BOARD_CELLS);
        for position in 0..BOARD_CELLS {
            if state.board[position].is_some() {
                continue;
            }
            for card_index in 0..hand_len {
                moves.push(RpsMove::new(card_index as u8, position as u8));
            }
        }
        moves
    }

    fn apply(&self, state: &State, mv: RpsMove) -> Result<State, GameError> {
        if self.is_terminal(state) {
            return Err(GameError::GameOver);
        }
        let position = mv.position as usize;
        if position >= BOARD_CELLS {
            return Err(GameError::IllegalMove(format!(
                "position {} is out of bounds",
                position
            )));
        }
        if state.board[position].is_some() {
            return Err(GameError::IllegalMove(format!(
                "position {} is already occupied",
                position
            )));
        }
        let mover = state.to_move;
        let card_index = mv.card_index as usize;
        if card_index >= state.hand(mover).len() {
            return Err(GameError::IllegalMove(format!(
                "card index {} is not in {}'s hand",
                card_index, mover
            )));
        }

        let mut next = state.clone();
        let kind = next.hands[mover.index()].remove(card_index);
        next.board[position] = Some(Card { kind, owner: mover });
        next.to_move = mover.opponent();
        if mover == Player::Two {
            next.round += 1;
        }
        next.capture_around(position);
        Ok(next)
    }

    fn is_terminal(&self, state: &State) -> bool {
        (state.hands[0].is_empty() && state.hands[1].is_empty())
            || self.round_limit_reached(state)
            || self.legal_moves(state).is_empty()
    }

    fn winner(&self, state: &State) -> Option<Player> {
        let one = state.owned_by(Player::One);
        let two = state.owned_by(Player::Two);
        match one.cmp(&two) {
            std::cmp::Ordering::Greater => Some(Player::One),
            std::cmp::Ordering::Less => Some(Player::Two),
            std::cmp::Ordering::Equal => None,
        }
    }

    fn current_player(&self, state: &State) -> Player {
        state.to_move
    }

    fn encode(&self, state: &State) -> Vec<f32> {
        let mut features = vec![0.0f32; self.obs_size()];
        let kinds_offset = 0;
        let owners_offset = BOARD_CELLS * KINDS;
        let hand_offset = owners_offset + BOARD_CELLS * 3;

        for (cell, slot) in state.board.iter().enumerate() {
            let owner = match slot {
                Some(card) => {
                    one_hot(&mut features, kinds_offset + cell * KINDS, KINDS, card.kind.index());
                    1 + card.owner.index()
                }
                None => 0,
            };
            one_hot(&mut features, owners_offset + cell * 3, 3, owner);
        }

        for (slot, kind) in state
            .hand(state.to_move)
            .iter()
            .take(self.config.hand_size)
            .enumerate()
        {
            one_hot(&mut features, hand_offset + slot * KINDS, KINDS, kind.index());
        }

        let player_offset = hand_offset + self.config.hand_size * KINDS;
        features[player_offset] = if state.to_move == Player::One { 1.0 } else { 0.0 };
        features[player_offset + 1] = state.round as f32 / self.config.max_rounds as f32;
        features
    }

    fn action_index(&self, mv: &RpsMove) -> usize {
        mv.card_index as usize * BOARD_CELLS + mv.position as usize
    }
}

#[cfg(test)]
mod tests;
