use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chronicle_dataset::core::StepClock;
use chronicle_dataset::{ReplayDescriptor, Store, StoreWriter, StoreWriterExt, StreamOptions, StreamReaderExt};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tempfile::tempdir;

const STREAMS: usize = 4;
const MSGS_PER_STREAM: u64 = 50_000;
const PAYLOAD_LEN: usize = 128;

fn bench_replay(c: &mut Criterion) {
    let dir = tempdir().expect("tempdir");
    let mut writer = Store::create("bench", dir.path())
        .expect("create store")
        .with_clock(Arc::new(StepClock::new(0, 1)));
    let streams: Vec<_> = (0..STREAMS)
        .map(|i| {
            writer
                .create_stream::<Vec<u8>>(&format!("s{i}"), StreamOptions::default())
                .expect("stream")
        })
        .collect();
    let payload = vec![7u8; PAYLOAD_LEN];
    for t in 0..MSGS_PER_STREAM {
        for stream in &streams {
            writer.write(stream, &payload, t).expect("write");
        }
    }
    writer.commit().expect("commit");

    let mut group = c.benchmark_group("replay");
    group.throughput(Throughput::Elements(STREAMS as u64 * MSGS_PER_STREAM));

    group.bench_function("all_streams_decoded", |b| {
        let mut reader = Store::open("bench", dir.path()).expect("open");
        let seen = Arc::new(AtomicU64::new(0));
        for i in 0..STREAMS {
            let seen = seen.clone();
            reader
                .open_stream::<Vec<u8>, _>(&format!("s{i}"), move |value, _| {
                    seen.fetch_add(black_box(value.len()) as u64, Ordering::Relaxed);
                    Ok(())
                })
                .expect("subscribe");
        }
        b.iter(|| reader.read_all(ReplayDescriptor::ALL).expect("replay"));
    });

    group.bench_function("cursor_only", |b| {
        let mut reader = Store::open("bench", dir.path()).expect("open");
        b.iter(|| {
            reader.rewind().expect("rewind");
            let mut count = 0u64;
            while let Some(record) = reader.next_record().expect("next") {
                count += black_box(record.envelope.sequence_id) & 1;
            }
            count
        });
    });

    group.finish();
}

criterion_group!(benches, bench_replay);
criterion_main!(benches);
