//! Benchmarks for waiting-pool churn and board evaluation

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use duet::games::BoardGame;
use duet::storage::{MatchCriteria, MemoryStorage, Storage};
use duet::types::{Gender, UserStatus};
use duet::utils::current_timestamp;
use uuid::Uuid;

fn bench_pool_take(c: &mut Criterion) {
    let storage = MemoryStorage::new();
    for id in 0..1000 {
        storage.ensure_user(id, "bench").unwrap();
        storage.set_status(id, UserStatus::Searching, None).unwrap();
        storage.add_waiting(id, None).unwrap();
    }

    c.bench_function("take_and_reinsert_from_1000", |b| {
        let criteria = MatchCriteria {
            seeker: 10_000,
            seeker_gender: Gender::Unset,
            wanted: None,
            now: current_timestamp(),
        };
        b.iter(|| {
            let taken = storage.take_waiting(black_box(&criteria)).unwrap().unwrap();
            storage.add_waiting(taken, None).unwrap();
        });
    });
}

fn bench_board_win_evaluation(c: &mut Criterion) {
    c.bench_function("full_game_with_win", |b| {
        b.iter(|| {
            let mut game = BoardGame::new(Uuid::new_v4(), 1, Some(2));
            game.make_move(1, 0).unwrap();
            game.make_move(2, 3).unwrap();
            game.make_move(1, 1).unwrap();
            game.make_move(2, 4).unwrap();
            black_box(game.make_move(1, 2).unwrap())
        });
    });
}

criterion_group!(benches, bench_pool_take, bench_board_win_evaluation);
criterion_main!(benches);
