use std::path::Path;
use std::sync::{Arc, Mutex};

use chronicle_dataset::pipeline::{Exporter, Importer, Pipeline};
use chronicle_dataset::{
    CancellationToken, ReplayDescriptor, Store, StoreWriter, StoreWriterExt, StreamOptions,
    TimeInterval,
};
use tempfile::tempdir;

fn make_store(dir: &Path, name: &str, times: &[u64]) {
    let mut writer = Store::create(name, dir).expect("create");
    let stream = writer
        .create_stream::<String>("events", StreamOptions::default())
        .expect("stream");
    for &t in times {
        writer.write(&stream, &format!("{name}@{t}"), t).expect("write");
    }
    writer.commit().expect("commit");
}

#[test]
fn importers_are_merged_by_originating_time() {
    let dir = tempdir().expect("tempdir");
    make_store(dir.path(), "left", &[1, 5, 9]);
    make_store(dir.path(), "right", &[2, 5, 20]);

    let mut pipeline = Pipeline::create("merge");
    let left = Importer::open(&mut pipeline, "left", dir.path()).expect("left");
    let right = Importer::open(&mut pipeline, "right", dir.path()).expect("right");
    assert_eq!(pipeline.proposed_replay_time(), TimeInterval::new(1, 20));

    let seen = Arc::new(Mutex::new(Vec::new()));
    for importer in [&left, &right] {
        let sink = seen.clone();
        importer
            .open_stream::<String, _>("events", move |value, _| {
                sink.lock().unwrap().push(value);
                Ok(())
            })
            .expect("subscribe");
    }

    let stats = pipeline
        .run(ReplayDescriptor::new(TimeInterval::new(0, 9)), &CancellationToken::new())
        .expect("run");
    assert_eq!(stats.messages_read, 6);
    assert_eq!(stats.messages_filtered, 1);
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["left@1", "right@2", "left@5", "right@5", "left@9"]
    );
}

#[test]
fn exporter_writes_a_new_store() {
    let dir = tempdir().expect("tempdir");
    make_store(dir.path(), "in", &[3, 4]);

    let mut pipeline = Pipeline::create("copy");
    let importer = Importer::open(&mut pipeline, "in", dir.path()).expect("importer");
    let exporter = Exporter::new(Box::new(Store::create("out", dir.path()).expect("create")));
    let lengths = exporter.create_stream::<usize>("lengths").expect("stream");
    importer
        .open_stream::<String, _>("events", move |value, envelope| {
            lengths.post(&value.len(), envelope.originating_time)?;
            Ok(())
        })
        .expect("subscribe");

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    assert!(pipeline.run(ReplayDescriptor::ALL, &cancelled).is_err());

    pipeline
        .run(ReplayDescriptor::ALL, &CancellationToken::new())
        .expect("run");
    let catalog = exporter.commit().expect("commit");
    let stream = catalog.stream("lengths").expect("lengths");
    assert_eq!(stream.message_count, 2);
    assert_eq!(stream.originating_time_interval(), TimeInterval::new(3, 4));
    assert!(Store::exists("out", dir.path()));
}
