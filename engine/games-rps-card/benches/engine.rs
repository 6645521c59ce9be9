use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use engine_core::Game;
use games_rps_card::RpsCard;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn bench_new_game(c: &mut Criterion) {
    let mut group = c.benchmark_group("rps_card_new_game");
    group.bench_function("deal", |b| {
        let game = RpsCard::default();
        b.iter_batched(
            || ChaCha20Rng::seed_from_u64(42),
            |mut rng| game.new_game(&mut rng),
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn bench_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("rps_card_apply");
    group.bench_function("first_legal_move", |b| {
        let game = RpsCard::default();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let state = game.new_game(&mut rng);
        let mv = game.legal_moves(&state)[0];
        b.iter(|| game.apply(&state, mv).unwrap());
    });
    group.bench_function("legal_moves_opening", |b| {
        let game = RpsCard::default();
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let state = game.new_game(&mut rng);
        b.iter(|| game.legal_moves(&state));
    });
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("rps_card_encode");
    group.bench_function("midgame", |b| {
        let game = RpsCard::default();
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let mut state = game.new_game(&mut rng);
        for _ in 0..4 {
            let mv = game.legal_moves(&state)[0];
            state = game.apply(&state, mv).unwrap();
        }
        b.iter(|| game.encode(&state));
    });
    group.finish();
}

criterion_group!(benches, bench_new_game, bench_apply, bench_encode);
criterion_main!(benches);
