use std::path::Path;
use std::sync::{Arc, Mutex};

use chronicle_dataset::dataset::DatasetDescriptor;
use chronicle_dataset::{
    Dataset, DatasetEvent, Store, StoreWriter, StoreWriterExt, StreamOptions, TimeInterval,
};
use tempfile::tempdir;

fn make_store(dir: &Path, name: &str, times: &[u64]) {
    let mut writer = Store::create(name, dir).expect("create");
    let stream = writer
        .create_stream::<u32>("root", StreamOptions::default())
        .expect("stream");
    for &t in times {
        writer.write(&stream, &(t as u32), t).expect("write");
    }
    writer.commit().expect("commit");
}

#[test]
fn rename_and_remove_are_saved_before_events_fire() {
    let dir = tempdir().expect("tempdir");
    make_store(dir.path(), "early", &[10, 20]);
    make_store(dir.path(), "late", &[500, 900]);
    let file = dir.path().join("auto.json");

    let mut dataset = Dataset::new("auto");
    dataset.save_as(&file, true).expect("initial save");
    dataset.set_auto_save(true).expect("auto-save on");

    // Each listener call checks the file already reflects the change.
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    let watched = file.clone();
    dataset.on_changed(move |event| {
        let on_disk = DatasetDescriptor::load(&watched).expect("descriptor");
        let sessions: Vec<String> = on_disk.sessions.iter().map(|s| s.name.clone()).collect();
        sink.lock().unwrap().push((event.clone(), sessions));
    });

    dataset
        .add_session_from_existing_store("early", dir.path(), Some("a"))
        .expect("a");
    dataset
        .add_session_from_existing_store("late", dir.path(), Some("b"))
        .expect("b");
    assert!(!dataset.has_unsaved_changes());
    assert_eq!(
        dataset.originating_time_interval().expect("interval"),
        TimeInterval::new(10, 900)
    );

    dataset.rename_session("a", "first").expect("rename");
    dataset.remove_session("b").expect("remove");
    assert!(!dataset.has_unsaved_changes());
    assert_eq!(
        dataset.originating_time_interval().expect("interval"),
        TimeInterval::new(10, 20)
    );

    let observed = observed.lock().unwrap();
    assert_eq!(observed.len(), 4);
    assert_eq!(
        observed[2],
        (
            DatasetEvent::SessionRenamed {
                from: "a".into(),
                to: "first".into()
            },
            vec!["first".to_string(), "b".to_string()]
        )
    );
    assert_eq!(observed[3].1, vec!["first".to_string()]);

    let reloaded = Dataset::load(&file).expect("reload");
    assert_eq!(reloaded.session_count(), 1);
    assert_eq!(reloaded.sessions()[0].name(), "first");
    assert_eq!(
        reloaded.originating_time_interval().expect("interval"),
        TimeInterval::new(10, 20)
    );
}

#[test]
fn without_auto_save_changes_stay_pending() {
    let dir = tempdir().expect("tempdir");
    make_store(dir.path(), "s", &[1]);
    let file = dir.path().join("manual.json");

    let mut dataset = Dataset::new("manual");
    dataset.save_as(&file, false).expect("save");
    assert!(!dataset.has_unsaved_changes());

    dataset
        .add_session_from_existing_store("s", dir.path(), None)
        .expect("session");
    dataset
        .rename_partition("s", "s", "renamed")
        .expect("rename partition");
    assert!(dataset.has_unsaved_changes());
    assert_eq!(DatasetDescriptor::load(&file).expect("descriptor").sessions.len(), 0);

    dataset.save().expect("save");
    assert!(!dataset.has_unsaved_changes());
    let on_disk = DatasetDescriptor::load(&file).expect("descriptor");
    assert_eq!(on_disk.sessions[0].partitions[0].name, "renamed");
}

#[test]
fn enabling_auto_save_flushes_pending_changes() {
    let dir = tempdir().expect("tempdir");
    let file = dir.path().join("late.json");
    let mut dataset = Dataset::new("late");
    dataset.save_as(&file, false).expect("save");
    dataset.create_session(Some("x")).expect("session");
    assert!(dataset.has_unsaved_changes());

    dataset.set_auto_save(true).expect("auto-save");
    assert!(!dataset.has_unsaved_changes());
    assert_eq!(DatasetDescriptor::load(&file).expect("descriptor").sessions.len(), 1);
}
