use core_replay::{CommandLog, ExtractMode, HeadlessHost, Replay, ReplayConfig, SideInfo};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use replay_runtime::{path_document, MapLocation, SpeakData, TurnBatch};

fn recorded_session(actions: usize) -> Replay {
    let mut replay = Replay::new(ReplayConfig::builtin());
    replay.add_start();
    for i in 0..actions {
        let step = i as i32;
        let path = path_document(&[MapLocation::new(1, step), MapLocation::new(2, step)]);
        replay.add_synced_command("move", path, 1);
        if i % 8 == 0 {
            replay.speak(SpeakData::new("alice", "still here"));
        }
    }
    replay.end_turn();
    replay
}

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");

    for size in [64usize, 512, 4096] {
        group.bench_with_input(BenchmarkId::new("non_undoable", size), &size, |b, &size| {
            b.iter_batched(
                || recorded_session(size),
                |mut replay| {
                    let log: &mut CommandLog = replay.log_mut();
                    let end = log.len();
                    log.extract_range(0, end, ExtractMode::NonUndoable)
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_undo(c: &mut Criterion) {
    c.bench_function("undo_cut/4096", |b| {
        b.iter_batched(
            || recorded_session(4096),
            |mut replay| replay.undo_cut(),
            BatchSize::SmallInput,
        )
    });
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");

    for size in [64usize, 512] {
        let batch: TurnBatch = recorded_session(size).to_batch();
        group.bench_with_input(BenchmarkId::new("headless", size), &batch, |b, batch| {
            b.iter_batched(
                || {
                    let replay = Replay::from_batch(ReplayConfig::builtin(), batch.clone());
                    let host = HeadlessHost::new(vec![SideInfo::human(), SideInfo::remote()]);
                    (replay, host)
                },
                |(mut replay, mut host)| replay.do_replay(&mut host, false),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(log_benches, bench_extract, bench_undo, bench_replay);
criterion_main!(log_benches);
