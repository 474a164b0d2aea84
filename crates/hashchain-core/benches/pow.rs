use criterion::{criterion_group, criterion_main, Criterion};
use hashchain_core::{mine::mine_parallel, Difficulty, Payload, Record, Timestamp};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn sample_records(count: usize) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|i| {
            let payload = Payload::transfer(&format!("alice-{i}"), "bob", rng.gen_range(1.0..10.0));
            Record::new(payload, "0", Timestamp::now())
        })
        .collect()
}

fn bench_pow(c: &mut Criterion) {
    let difficulty = Difficulty::new(4).expect("difficulty within bounds");
    let records = sample_records(10);

    c.bench_function("mine_sequential_difficulty_4", |b| {
        b.iter(|| {
            for record in &records {
                let mut record = record.clone();
                record.mine(difficulty).expect("mined");
            }
        });
    });

    c.bench_function("mine_parallel_difficulty_4", |b| {
        b.iter(|| {
            for record in &records {
                let mut record = record.clone();
                mine_parallel(&mut record, difficulty).expect("mined");
            }
        });
    });
}

criterion_group!(benches, bench_pow);
criterion_main!(benches);
