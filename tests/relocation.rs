use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chronicle_dataset::dataset::DatasetDescriptor;
use chronicle_dataset::{
    Dataset, ReplayDescriptor, Store, StoreWriter, StoreWriterExt, StreamOptions,
    StreamReaderExt,
};
use tempfile::tempdir;

fn make_store(dir: &Path, name: &str, values: &[i64]) {
    let mut writer = Store::create(name, dir).expect("create");
    let stream = writer
        .create_stream::<i64>("root", StreamOptions::default())
        .expect("stream");
    for (i, value) in values.iter().enumerate() {
        writer.write(&stream, value, 10 * i as u64).expect("write");
    }
    writer.commit().expect("commit");
}

fn replay_values(dataset: &Dataset, session: &str, partition: &str) -> Vec<(i64, u64)> {
    let partition = dataset
        .session(session)
        .expect("session")
        .partition(partition)
        .expect("partition");
    let mut reader = partition.open_reader().expect("reader");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    reader
        .open_stream::<i64, _>("root", move |value, envelope| {
            sink.lock().unwrap().push((value, envelope.originating_time));
            Ok(())
        })
        .expect("subscribe");
    reader.read_all(ReplayDescriptor::ALL).expect("replay");
    let out = seen.lock().unwrap().clone();
    out
}

fn copy_dir(from: &Path, to: &Path) {
    fs::create_dir_all(to).expect("mkdir");
    for entry in fs::read_dir(from).expect("read_dir") {
        let entry = entry.expect("entry");
        let target = to.join(entry.file_name());
        if entry.file_type().expect("type").is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            fs::copy(entry.path(), target).expect("copy");
        }
    }
}

#[test]
fn relative_dataset_survives_move() {
    let root = tempdir().expect("tempdir");
    let original = root.path().join("original");
    let stores = original.join("stores");
    make_store(&stores, "run1", &[1, 2, 3]);
    make_store(&stores.join("nested"), "run2", &[-5, 8]);

    let mut dataset = Dataset::new("portable");
    dataset
        .add_session_from_existing_store("run1", &stores, None)
        .expect("run1");
    dataset
        .add_partition_from_existing_store("run1", "run2", &stores.join("nested"), None)
        .expect("run2");
    let descriptor_path = original.join("datasets").join("portable.json");
    fs::create_dir_all(descriptor_path.parent().expect("parent")).expect("mkdir");
    dataset
        .save_as(&descriptor_path, true)
        .expect("save relative");
    let before_run1 = replay_values(&dataset, "run1", "run1");
    let before_run2 = replay_values(&dataset, "run1", "run2");
    drop(dataset);

    let descriptor = DatasetDescriptor::load(&descriptor_path).expect("descriptor");
    assert!(descriptor.relative_paths);
    assert_eq!(descriptor.sessions[0].partitions[0].store_path, "../stores");
    assert_eq!(descriptor.sessions[0].partitions[1].store_path, "../stores/nested");

    let moved = root.path().join("moved");
    copy_dir(&original, &moved);
    fs::remove_dir_all(&original).expect("remove original");

    let loaded = Dataset::load(&moved.join("datasets").join("portable.json")).expect("load");
    assert_eq!(loaded.name(), "portable");
    let partition = loaded
        .session("run1")
        .expect("session")
        .partition("run1")
        .expect("partition");
    assert!(partition.store_path().starts_with(&moved));
    assert_eq!(replay_values(&loaded, "run1", "run1"), before_run1);
    assert_eq!(replay_values(&loaded, "run1", "run2"), before_run2);
}

#[test]
fn absolute_paths_round_trip_structure() {
    let root = tempdir().expect("tempdir");
    make_store(root.path(), "a", &[1]);
    let mut dataset = Dataset::new("abs");
    dataset
        .add_session_from_existing_store("a", root.path(), Some("first"))
        .expect("session");
    dataset.create_session(Some("empty")).expect("empty");
    let path = root.path().join("abs.json");
    dataset.save_as(&path, false).expect("save");

    let loaded = Dataset::load(&path).expect("load");
    assert_eq!(
        loaded.to_descriptor(None),
        dataset.to_descriptor(None)
    );
    let descriptor = DatasetDescriptor::load(&path).expect("descriptor");
    assert!(!descriptor.relative_paths);
    assert!(Path::new(&descriptor.sessions[0].partitions[0].store_path).is_absolute());
}
