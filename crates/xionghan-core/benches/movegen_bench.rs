use criterion::{black_box, criterion_group, criterion_main, Criterion};
use xionghan_core::position::zobrist;
use xionghan_core::{movegen, Position};

fn bench_movegen(c: &mut Criterion) {
    let initial = Position::initial();
    let midgame = Position::decode(
        "i1a1h3h3i/3bcdedcb3/10a2/5f5f1/2g1g1F1g1g2/jF10j/13/J11J/2G1G1G1G1G2/13/13/3BCDEDCB3/I1A1H3H1A1I w",
    )
    .unwrap();

    c.bench_function("pseudo_legal_initial", |b| {
        b.iter(|| movegen::pseudo_legal(black_box(&initial)))
    });
    c.bench_function("legal_strict_initial", |b| {
        b.iter(|| movegen::legal(black_box(&initial), true))
    });
    c.bench_function("legal_permissive_midgame", |b| {
        b.iter(|| movegen::legal(black_box(&midgame), false))
    });
}

fn bench_hashing(c: &mut Criterion) {
    let pos = Position::initial();
    let mv = movegen::legal(&pos, false)[0];

    c.bench_function("zobrist_full_recompute", |b| {
        b.iter(|| zobrist::calculate_hash(black_box(&pos.board), pos.side_to_move))
    });
    c.bench_function("apply_move_incremental", |b| {
        b.iter(|| black_box(&pos).apply_move(black_box(mv)))
    });
}

criterion_group!(benches, bench_movegen, bench_hashing);
criterion_main!(benches);
