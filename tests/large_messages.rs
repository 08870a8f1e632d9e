use std::sync::{Arc, Mutex};

use chronicle_dataset::store::IndexEntry;
use chronicle_dataset::{
    ReplayDescriptor, Store, StoreConfig, StoreWriter, StoreWriterExt, StreamOptions,
    StreamReaderExt,
};
use tempfile::tempdir;

fn frame(i: u32) -> Vec<u8> {
    (0..4096u32).map(|b| (b.wrapping_mul(31) ^ i) as u8).collect()
}

#[test]
fn index_entries_resolve_to_payloads() {
    const M: u32 = 20;
    let dir = tempdir().expect("tempdir");
    let config = StoreConfig::default().with_large_segment_size(16 * 1024);
    let mut writer = Store::create_with_config("video", dir.path(), config).expect("create");
    let frames = writer
        .create_stream::<Vec<u8>>("frames", StreamOptions::large())
        .expect("stream");
    for i in 0..M {
        writer.write(&frames, &frame(i), 100 * i as u64).expect("write");
    }
    let catalog = writer.commit().expect("commit");
    assert!(catalog.large_segments > 1);
    assert!(catalog.stream("frames").expect("meta").is_indexed);

    let mut reader = Store::open("video", dir.path()).expect("open");

    let entries: Arc<Mutex<Vec<(IndexEntry, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = entries.clone();
    reader
        .open_stream_index(
            "frames",
            Box::new(move |entry, envelope| {
                sink.lock().unwrap().push((entry, envelope.originating_time));
                Ok(())
            }),
        )
        .expect("index subscription");

    let inline: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = inline.clone();
    reader
        .open_stream::<Vec<u8>, _>("frames", move |payload, _| {
            sink.lock().unwrap().push(payload);
            Ok(())
        })
        .expect("payload subscription");

    reader.read_all(ReplayDescriptor::ALL).expect("replay");

    let entries = entries.lock().unwrap();
    let inline = inline.lock().unwrap();
    assert_eq!(entries.len(), M as usize);
    assert!(entries.windows(2).all(|w| w[0].1 < w[1].1));

    let (middle, _) = entries[(M / 2) as usize];
    let fetched: Vec<u8> = reader.read(&middle).expect("random access");
    assert_eq!(fetched, inline[(M / 2) as usize]);
    assert_eq!(fetched, frame(M / 2));
}

#[test]
fn index_subscription_requires_large_stream() {
    let dir = tempdir().expect("tempdir");
    let mut writer = Store::create("s", dir.path()).expect("create");
    writer
        .create_stream::<u8>("small", StreamOptions::default())
        .expect("stream");
    writer.commit().expect("commit");

    let mut reader = Store::open("s", dir.path()).expect("open");
    assert!(reader
        .open_stream_index("small", Box::new(|_, _| Ok(())))
        .is_err());
}
