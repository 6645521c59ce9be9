use super::*;
use rand::SeedableRng;
use CardKind::{Paper, Rock, Scissors};

fn game() -> RpsCard {
    RpsCard::default()
}

fn small_game(hand_size: usize) -> RpsCard {
    RpsCard::new(RpsCardConfig {
        deck_size: 2 * hand_size,
        hand_size,
        max_rounds: 10,
    })
    .unwrap()
}

#[test]
fn test_new_game_deals_hands() {
    let game = game();
    let mut rng = ChaCha20Rng::seed_from_u64(42);
    let state = game.new_game(&mut rng);

    assert_eq!(state.hand(Player::One).len(), 5);
    assert_eq!(state.hand(Player::Two).len(), 5);
    assert_eq!(state.to_move(), Player::One);
    assert_eq!(state.round(), 1);
    assert!(state.board().iter().all(|c| c.is_none()));
    assert!(!game.is_terminal(&state));
}

#[test]
fn test_new_game_is_deterministic_per_seed() {
    let game = game();
    let a = game.new_game(&mut ChaCha20Rng::seed_from_u64(7));
    let b = game.new_game(&mut ChaCha20Rng::seed_from_u64(7));
    assert_eq!(a, b);
}

#[test]
fn test_deck_cycles_kinds() {
    assert_eq!(CardKind::cycle(0), Rock);
    assert_eq!(CardKind::cycle(1), Paper);
    assert_eq!(CardKind::cycle(2), Scissors);
    assert_eq!(CardKind::cycle(3), Rock);

    // A six card deck holds exactly two of each kind across both hands
    let game = small_game(3);
    let state = game.new_game(&mut ChaCha20Rng::seed_from_u64(1));
    let mut counts = [0usize; 3];
    for player in [Player::One, Player::Two] {
        for kind in state.hand(player) {
            counts[kind.index()] += 1;
        }
    }
    assert_eq!(counts, [2, 2, 2]);
}

#[test]
fn test_beats() {
    assert!(Rock.beats(Scissors));
    assert!(Paper.beats(Rock));
    assert!(Scissors.beats(Paper));
    assert!(!Rock.beats(Paper));
    assert!(!Rock.beats(Rock));
}

#[test]
fn test_legal_move_order_positions_outer() {
    let game = game();
    let state = State::with_hands(vec![Rock, Paper], vec![Scissors, Scissors]);
    let moves = game.legal_moves(&state);

    assert_eq!(moves.len(), 18);
    assert_eq!(moves[0], RpsMove::new(0, 0));
    assert_eq!(moves[1], RpsMove::new(1, 0));
    assert_eq!(moves[2], RpsMove::new(0, 1));
    assert_eq!(moves[17], RpsMove::new(1, 8));
}

#[test]
fn test_legal_moves_skip_occupied_cells() {
    let game = game();
    let state = State::with_hands(vec![Rock], vec![Paper]).with_card(4, Scissors, Player::Two);
    let moves = game.legal_moves(&state);
    assert_eq!(moves.len(), 8);
    assert!(moves.iter().all(|m| m.position != 4));
}

#[test]
fn test_apply_places_card_and_switches_player() {
    let game = game();
    let state = State::with_hands(vec![Rock, Paper], vec![Scissors]);
    let next = game.apply(&state, RpsMove::new(1, 4)).unwrap();

    assert_eq!(
        next.board()[4],
        Some(Card {
            kind: Paper,
            owner: Player::One
        })
    );
    assert_eq!(next.hand(Player::One), &[Rock]);
    assert_eq!(next.to_move(), Player::Two);
    assert_eq!(next.round(), 1);

    // Input position is untouched
    assert!(state.board()[4].is_none());
}

#[test]
fn test_round_advances_after_player_two() {
    let game = game();
    let state = State::with_hands(vec![Rock, Rock], vec![Paper, Paper]);
    let state = game.apply(&state, RpsMove::new(0, 0)).unwrap();
    assert_eq!(state.round(), 1);
    let state = game.apply(&state, RpsMove::new(0, 8)).unwrap();
    assert_eq!(state.round(), 2);
    assert_eq!(state.to_move(), Player::One);
}

#[test]
fn test_capture_adjacent_beaten_cards() {
    let game = game();
    // Player two owns scissors above and right of the center, and rock below
    let state = State::with_hands(vec![Rock], vec![Paper])
        .with_card(1, Scissors, Player::Two)
        .with_card(5, Scissors, Player::Two)
        .with_card(7, Rock, Player::Two)
        .with_card(3, Scissors, Player::One);

    let next = game.apply(&state, RpsMove::new(0, 4)).unwrap();
    let board = next.board();

    assert_eq!(board[1].unwrap().owner, Player::One);
    assert_eq!(board[5].unwrap().owner, Player::One);
    // Rock does not beat rock
    assert_eq!(board[7].unwrap().owner, Player::Two);
    // Own card stays own
    assert_eq!(board[3].unwrap().owner, Player::One);
}

#[test]
fn test_capture_ignores_diagonals() {
    let game = game();
    let state = State::with_hands(vec![Rock], vec![Paper]).with_card(0, Scissors, Player::Two);
    let next = game.apply(&state, RpsMove::new(0, 4)).unwrap();
    assert_eq!(next.board()[0].unwrap().owner, Player::Two);
}

#[test]
fn test_apply_rejects_illegal_moves() {
    let game = game();
    let state = State::with_hands(vec![Rock], vec![Paper]).with_card(4, Rock, Player::Two);

    assert!(matches!(
        game.apply(&state, RpsMove::new(0, 4)),
        Err(GameError::IllegalMove(_))
    ));
    assert!(matches!(
        game.apply(&state, RpsMove::new(0, 9)),
        Err(GameError::IllegalMove(_))
    ));
    assert!(matches!(
        game.apply(&state, RpsMove::new(3, 0)),
        Err(GameError::IllegalMove(_))
    ));
}

#[test]
fn test_apply_on_terminal_position() {
    let game = game();
    let state = State::with_hands(vec![], vec![]);
    assert!(game.is_terminal(&state));
    assert_eq!(
        game.apply(&state, RpsMove::new(0, 0)),
        Err(GameError::GameOver)
    );
}

#[test]
fn test_terminal_when_round_limit_passed() {
    let game = RpsCard::new(RpsCardConfig {
        deck_size: 10,
        hand_size: 5,
        max_rounds: 1,
    })
    .unwrap();
    let state = State::with_hands(vec![Rock, Rock], vec![Paper, Paper]);
    let state = game.apply(&state, RpsMove::new(0, 0)).unwrap();
    assert!(!game.is_terminal(&state));
    let state = game.apply(&state, RpsMove::new(0, 8)).unwrap();

    assert_eq!(state.round(), 2);
    assert!(game.is_terminal(&state));
    assert!(game.legal_moves(&state).is_empty());
}

#[test]
fn test_winner_by_board_count() {
    let game = game();
    let state = State::with_hands(vec![], vec![])
        .with_card(0, Rock, Player::One)
        .with_card(1, Rock, Player::One)
        .with_card(2, Paper, Player::Two);
    assert_eq!(game.winner(&state), Some(Player::One));

    let state = state.with_card(3, Paper, Player::Two);
    assert_eq!(game.winner(&state), None);

    let state = state.with_card(4, Paper, Player::Two);
    assert_eq!(game.winner(&state), Some(Player::Two));
}

#[test]
fn test_full_game_terminates() {
    let game = game();
    let mut rng = ChaCha20Rng::seed_from_u64(3);
    let mut state = game.new_game(&mut rng);
    let mut moves = 0;
    while !game.is_terminal(&state) {
        let mv = *game.legal_moves(&state).last().unwrap();
        state = game.apply(&state, mv).unwrap();
        moves += 1;
    }
    // Nine cells, five cards each: the board fills first
    assert_eq!(moves, 9);
    assert!(game.legal_moves(&state).is_empty());
}

#[test]
fn test_metadata_and_action_index() {
    let game = game();
    let meta = game.metadata();
    assert_eq!(meta.env_id, "rps_card");
    assert_eq!(meta.num_actions, 45);
    assert_eq!(game.num_actions(), 45);
    assert_eq!(meta.obs_size, 27 + 27 + 15 + 2);

    assert_eq!(game.action_index(&RpsMove::new(0, 0)), 0);
    assert_eq!(game.action_index(&RpsMove::new(0, 8)), 8);
    assert_eq!(game.action_index(&RpsMove::new(2, 3)), 21);
    assert_eq!(game.action_index(&RpsMove::new(4, 8)), 44);
}

#[test]
fn test_encode_layout() {
    let game = game();
    let state = State::with_hands(vec![Paper, Scissors], vec![Rock])
        .with_card(0, Rock, Player::One)
        .with_card(8, Scissors, Player::Two);
    let features = game.encode(&state);

    assert_eq!(features.len(), game.obs_size());
    // Board kinds
    assert_eq!(features[0], 1.0); // cell 0 rock
    assert_eq!(features[8 * 3 + 2], 1.0); // cell 8 scissors
    assert_eq!(features[3..6], [0.0, 0.0, 0.0]); // cell 1 empty
    // Board owners
    let owners = 27;
    assert_eq!(features[owners..owners + 3], [0.0, 1.0, 0.0]); // cell 0 player one
    assert_eq!(features[owners + 3..owners + 6], [1.0, 0.0, 0.0]); // cell 1 empty
    assert_eq!(features[owners + 24..owners + 27], [0.0, 0.0, 1.0]); // cell 8 player two
    // Hand of the player to move
    let hand = 54;
    assert_eq!(features[hand..hand + 3], [0.0, 1.0, 0.0]);
    assert_eq!(features[hand + 3..hand + 6], [0.0, 0.0, 1.0]);
    assert!(features[hand + 6..hand + 15].iter().all(|&v| v == 0.0));
    // Player flag and round
    assert_eq!(features[69], 1.0);
    assert!((features[70] - 0.1).abs() < 1e-6);
}

#[test]
fn test_encode_uses_mover_hand() {
    let game = game();
    let state = State::with_hands(vec![Paper], vec![Rock]).with_to_move(Player::Two);
    let features = game.encode(&state);
    assert_eq!(features[54..57], [1.0, 0.0, 0.0]);
    assert_eq!(features[69], 0.0);
}

#[test]
fn test_config_validation() {
    assert!(RpsCardConfig::default().validate().is_ok());

    let bad = RpsCardConfig {
        deck_size: 9,
        hand_size: 5,
        max_rounds: 10,
    };
    assert!(matches!(bad.validate(), Err(GameError::InvalidConfig(_))));

    let zero_hand = RpsCardConfig {
        deck_size: 21,
        hand_size: 0,
        max_rounds: 10,
    };
    assert!(RpsCard::new(zero_hand).is_err());
}

#[test]
fn test_display() {
    let state = State::with_hands(vec![Rock], vec![Paper])
        .with_card(0, Rock, Player::One)
        .with_card(4, Scissors, Player::Two);
    let rendered = state.to_string();
    assert!(rendered.contains("R.."));
    assert!(rendered.contains(".s."));
    assert!(rendered.contains("Player 1 hand: [R]"));
    assert!(rendered.contains("Player 2 hand: [p]"));
}
