use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chronicle_dataset::dataset::{
    compute_derived_store, DerivationInput, DerivationStatus, DerivedPartitionOptions, StatusHandle,
};
use chronicle_dataset::pipeline::{Exporter, Importer, Pipeline};
use chronicle_dataset::reader::DeliveryPolicy;
use chronicle_dataset::store::StoreKey;
use chronicle_dataset::{
    CancellationToken, Dataset, EntityKind, Error, ReplayDescriptor, Store, StoreFormat,
    StoreWriter, StoreWriterExt, StreamOptions, StreamReaderExt, TimeInterval,
};
use tempfile::tempdir;

const N: u64 = 50;

fn make_root_store(dir: &Path, name: &str) {
    let mut writer = Store::create(name, dir).expect("create");
    let root = writer
        .create_stream::<f64>("Root", StreamOptions::default())
        .expect("stream");
    for i in 0..N {
        writer.write(&root, &(i as f64 + 0.5), 1_000 + 10 * i).expect("write");
    }
    writer.commit().expect("commit");
}

fn dataset_with_root(dir: &Path) -> Dataset {
    make_root_store(dir, "raw");
    let mut dataset = Dataset::new("derive");
    dataset
        .add_session_from_existing_store("raw", dir, Some("s"))
        .expect("session");
    dataset
}

fn scale(pipeline: &mut Pipeline, importer: &Importer, exporter: &Exporter, k: f64) -> anyhow::Result<()> {
    let out = exporter.create_stream::<f64>("Scaled")?;
    importer.open_stream::<f64, _>("Root", move |value, envelope| {
        out.post(&(value * k), envelope.originating_time)?;
        Ok(())
    })?;
    pipeline.on_completion(|stats| {
        anyhow::ensure!(stats.messages_read == N, "short replay");
        Ok(())
    });
    Ok(())
}

fn read_f64(dir: &Path, store: &str, stream: &str) -> Vec<(f64, u64)> {
    let mut reader = Store::open(store, dir).expect("open");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    reader
        .open_stream::<f64, _>(stream, move |value, envelope| {
            sink.lock().unwrap().push((value, envelope.originating_time));
            Ok(())
        })
        .expect("subscribe");
    reader.read_all(ReplayDescriptor::ALL).expect("replay");
    let out = seen.lock().unwrap().clone();
    out
}

#[tokio::test]
async fn derived_partition_commits_scaled_stream() {
    let dir = tempdir().expect("tempdir");
    let mut dataset = dataset_with_root(dir.path());
    let status = StatusHandle::new();
    assert_eq!(status.status(), DerivationStatus::Idle);

    let options = DerivedPartitionOptions::new("scaled", "scaled", dir.path()).status(status.clone());
    let name = dataset
        .create_derived_partition("s", "raw", scale, 3.0, options)
        .await
        .expect("derive");
    assert_eq!(name, "scaled");
    assert_eq!(status.status(), DerivationStatus::Committed);

    let session = dataset.session("s").expect("s");
    assert_eq!(session.partition_count(), 2);
    let partition = session.partition("scaled").expect("partition");
    assert_eq!(partition.reader_type(), StoreFormat::Binary);

    let original = read_f64(dir.path(), "raw", "Root");
    let derived = read_f64(dir.path(), "scaled", "Scaled");
    assert_eq!(derived.len(), N as usize);
    for ((value, time), (scaled, scaled_time)) in original.iter().zip(derived.iter()) {
        assert_eq!(*scaled, value * 3.0);
        assert_eq!(time, scaled_time);
    }
    assert_eq!(
        partition.originating_time_interval().expect("interval"),
        TimeInterval::new(1_000, 1_000 + 10 * (N - 1))
    );
}

#[tokio::test]
async fn cancellation_rolls_back() {
    let dir = tempdir().expect("tempdir");
    let mut dataset = dataset_with_root(dir.path());
    let token = CancellationToken::new();
    let status = StatusHandle::new();

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let cancel_after = token.clone();
    let transform = move |_: &mut Pipeline, importer: &Importer, exporter: &Exporter, _: ()| -> anyhow::Result<()> {
        let out = exporter.create_stream::<f64>("Copy")?;
        importer.open_stream::<f64, _>("Root", move |value, envelope| {
            out.post(&value, envelope.originating_time)?;
            if counter.fetch_add(1, Ordering::SeqCst) == 9 {
                cancel_after.cancel();
            }
            Ok(())
        })?;
        Ok(())
    };

    let options = DerivedPartitionOptions::new("copy", "copy", dir.path())
        .cancellation(token)
        .status(status.clone());
    let err = dataset
        .create_derived_partition("s", "raw", transform, (), options)
        .await
        .expect_err("cancelled");

    assert!(matches!(err, Error::Cancelled));
    assert_eq!(seen.load(Ordering::SeqCst), 10);
    assert_eq!(status.status(), DerivationStatus::RolledBack);
    assert!(!Store::exists("copy", dir.path()));
    assert!(!dir.path().join("copy.000000.data").exists());
    assert_eq!(dataset.session("s").expect("s").partition_count(), 1);
    assert!(Store::exists("raw", dir.path()));
}

#[tokio::test]
async fn transform_failure_surfaces_original_error() {
    let dir = tempdir().expect("tempdir");
    let mut dataset = dataset_with_root(dir.path());

    let transform = |_: &mut Pipeline, importer: &Importer, exporter: &Exporter, limit: f64| -> anyhow::Result<()> {
        let out = exporter.create_stream::<f64>("Checked")?;
        importer.open_stream::<f64, _>("Root", move |value, envelope| {
            anyhow::ensure!(value < limit, "value {value} over limit");
            out.post(&value, envelope.originating_time)?;
            Ok(())
        })?;
        Ok(())
    };
    let options = DerivedPartitionOptions::new("checked", "checked", dir.path());
    let err = dataset
        .create_derived_partition("s", "raw", transform, 20.0, options)
        .await
        .expect_err("failure");

    match err {
        Error::TransformFailure(inner) => assert_eq!(inner.to_string(), "value 20.5 over limit"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!Store::exists("checked", dir.path()));
    assert_eq!(dataset.session("s").expect("s").partition_count(), 1);
}

#[tokio::test]
async fn duplicate_partition_name_deletes_candidate() {
    let dir = tempdir().expect("tempdir");
    let mut dataset = dataset_with_root(dir.path());

    let options = DerivedPartitionOptions::new("raw", "raw-scaled", dir.path());
    let err = dataset
        .create_derived_partition("s", "raw", scale, 2.0, options)
        .await
        .expect_err("duplicate");
    assert!(matches!(err, Error::DuplicateName { kind: EntityKind::Partition, .. }));
    assert!(!Store::exists("raw-scaled", dir.path()));

    let options = DerivedPartitionOptions::new("raw", "raw-scaled", dir.path()).overwrite_existing(true);
    dataset
        .create_derived_partition("s", "raw", scale, 2.0, options)
        .await
        .expect("overwrite");
    let session = dataset.session("s").expect("s");
    assert_eq!(session.partition_count(), 1);
    assert_eq!(session.partition("raw").expect("raw").store_name(), "raw-scaled");
    // The replaced partition's store is kept.
    assert!(Store::exists("raw", dir.path()));
}

#[tokio::test]
async fn existing_target_store_fails_fast() {
    let dir = tempdir().expect("tempdir");
    let mut dataset = dataset_with_root(dir.path());
    let options = DerivedPartitionOptions::new("again", "raw", dir.path());
    let err = dataset
        .create_derived_partition("s", "raw", scale, 1.0, options)
        .await
        .expect_err("store exists");
    assert!(matches!(err, Error::StoreExists(_)));
    assert!(Store::exists("raw", dir.path()));
    assert_eq!(read_f64(dir.path(), "raw", "Root").len(), N as usize);
}

#[tokio::test]
async fn delivery_policy_and_replay_range_apply() {
    let dir = tempdir().expect("tempdir");
    let mut dataset = dataset_with_root(dir.path());
    let options = DerivedPartitionOptions::new("sampled", "sampled", dir.path())
        .delivery_policy(DeliveryPolicy::Sample { every: 2 })
        .replay(ReplayDescriptor::new(TimeInterval::new(1_000, 1_190)))
        .format(StoreFormat::Json);
    let copy = |pipeline: &mut Pipeline, importer: &Importer, exporter: &Exporter, _: ()| -> anyhow::Result<()> {
        let out = exporter.create_stream::<f64>("Root")?;
        importer.open_stream::<f64, _>("Root", move |value, envelope| {
            out.post(&value, envelope.originating_time)?;
            Ok(())
        })?;
        anyhow::ensure!(!pipeline.proposed_replay_time().is_empty(), "no proposal");
        Ok(())
    };
    dataset
        .create_derived_partition("s", "raw", copy, (), options)
        .await
        .expect("derive");

    let partition = dataset
        .session("s")
        .expect("s")
        .partition("sampled")
        .expect("sampled");
    assert_eq!(partition.reader_type(), StoreFormat::Json);
    let values = read_f64(dir.path(), "sampled", "Root");
    let times: Vec<u64> = values.iter().map(|(_, t)| *t).collect();
    assert_eq!(times, vec![1_010, 1_030, 1_050, 1_070, 1_090, 1_110, 1_130, 1_150, 1_170, 1_190]);
}

#[tokio::test]
async fn independent_derivations_run_concurrently() {
    let dir = tempdir().expect("tempdir");
    let mut dataset = dataset_with_root(dir.path());
    let input = DerivationInput {
        key: StoreKey::new("raw", dir.path()),
        format: StoreFormat::Binary,
    };

    let double = DerivedPartitionOptions::new("double", "double", dir.path());
    let triple = DerivedPartitionOptions::new("triple", "triple", dir.path());
    let (a, b) = tokio::join!(
        compute_derived_store(input.clone(), scale, 2.0, &double),
        compute_derived_store(input, scale, 3.0, &triple),
    );
    let (a, b) = (a.expect("double"), b.expect("triple"));
    assert_eq!(a.catalog().message_count(), N);

    dataset.commit_derived_partition("s", a, &double).expect("bind double");
    dataset.commit_derived_partition("s", b, &triple).expect("bind triple");
    assert_eq!(dataset.session("s").expect("s").partition_count(), 3);
    assert_eq!(double.status.status(), DerivationStatus::Committed);
}

#[tokio::test]
async fn unbound_derived_store_is_deleted_on_drop() {
    let dir = tempdir().expect("tempdir");
    make_root_store(dir.path(), "raw");
    let input = DerivationInput {
        key: StoreKey::new("raw", dir.path()),
        format: StoreFormat::Binary,
    };
    let options = DerivedPartitionOptions::new("tmp", "tmp", dir.path());
    let derived = compute_derived_store(input, scale, 1.0, &options)
        .await
        .expect("derive");
    assert!(Store::exists("tmp", dir.path()));
    drop(derived);
    assert!(!Store::exists("tmp", dir.path()));
}

#[tokio::test]
async fn transform_can_merge_a_second_input_store() {
    let dir = tempdir().expect("tempdir");
    let mut dataset = dataset_with_root(dir.path());
    let mut marks = Store::create("marks", dir.path()).expect("create");
    let root = marks
        .create_stream::<f64>("Root", StreamOptions::default())
        .expect("stream");
    for t in [1_005u64, 1_105, 2_000] {
        marks.write(&root, &-1.0, t).expect("write");
    }
    marks.commit().expect("commit");

    let merge = |pipeline: &mut Pipeline,
                 importer: &Importer,
                 exporter: &Exporter,
                 extra_dir: std::path::PathBuf|
     -> anyhow::Result<()> {
        let extra = Importer::open(pipeline, "marks", &extra_dir)?;
        let out = exporter.create_stream::<f64>("Merged")?;
        for source in [importer, &extra] {
            let out = out.clone();
            source.open_stream::<f64, _>("Root", move |value, envelope| {
                out.post(&value, envelope.originating_time)?;
                Ok(())
            })?;
        }
        Ok(())
    };

    let options = DerivedPartitionOptions::new("merged", "merged", dir.path());
    dataset
        .create_derived_partition("s", "raw", merge, dir.path().to_path_buf(), options)
        .await
        .expect("derive");

    let merged = read_f64(dir.path(), "merged", "Merged");
    assert_eq!(merged.len() as u64, N + 3);
    assert!(merged.windows(2).all(|w| w[0].1 <= w[1].1));
    assert_eq!(merged[1], (-1.0, 1_005));
    assert_eq!(merged.last().copied(), Some((-1.0, 2_000)));
    assert_eq!(
        dataset
            .session("s")
            .expect("session")
            .partition("merged")
            .expect("partition")
            .originating_time_interval()
            .expect("interval"),
        TimeInterval::new(1_000, 2_000)
    );
}

#[tokio::test]
async fn timeout_bounds_a_slow_derivation() {
    let dir = tempdir().expect("tempdir");
    let mut dataset = dataset_with_root(dir.path());
    let slow = |_: &mut Pipeline, importer: &Importer, exporter: &Exporter, pause: Duration| -> anyhow::Result<()> {
        let out = exporter.create_stream::<f64>("Slow")?;
        importer.open_stream::<f64, _>("Root", move |value, envelope| {
            std::thread::sleep(pause);
            out.post(&value, envelope.originating_time)?;
            Ok(())
        })?;
        Ok(())
    };

    let status = StatusHandle::new();
    let options = DerivedPartitionOptions::new("slow", "slow", dir.path())
        .cancellation(CancellationToken::with_timeout(Duration::from_millis(30)))
        .status(status.clone());
    let err = dataset
        .create_derived_partition("s", "raw", slow, Duration::from_millis(5), options)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled), "unexpected error: {err}");
    assert_eq!(status.status(), DerivationStatus::RolledBack);
    assert!(!Store::exists("slow", dir.path()));
    assert_eq!(dataset.session("s").expect("session").partition_count(), 1);
}

#[tokio::test]
async fn failed_auto_save_rolls_back_the_bind() {
    let dir = tempdir().expect("tempdir");
    let mut dataset = dataset_with_root(dir.path());
    let meta = dir.path().join("meta");
    std::fs::create_dir(&meta).expect("meta dir");
    dataset.save_as(&meta.join("derive.json"), false).expect("save");
    dataset.set_auto_save(true).expect("auto-save");
    std::fs::remove_dir_all(&meta).expect("remove meta dir");

    let status = StatusHandle::new();
    let options = DerivedPartitionOptions::new("copy", "copy", dir.path()).status(status.clone());
    let err = dataset
        .create_derived_partition("s", "raw", scale, 1.0, options)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Io(_)), "unexpected error: {err}");
    assert_eq!(status.status(), DerivationStatus::RolledBack);
    assert!(!Store::exists("copy", dir.path()));
    let session = dataset.session("s").expect("session");
    assert_eq!(session.partition_count(), 1);
    assert!(!session.contains_partition("copy"));
    assert!(!dataset.has_unsaved_changes());

    // Overwriting keeps the original binding when the save fails.
    let options = DerivedPartitionOptions::new("raw", "raw2", dir.path()).overwrite_existing(true);
    assert!(dataset
        .create_derived_partition("s", "raw", scale, 2.0, options)
        .await
        .is_err());
    assert!(!Store::exists("raw2", dir.path()));
    let partition = dataset
        .session("s")
        .expect("session")
        .partition("raw")
        .expect("partition");
    assert_eq!(partition.store_name(), "raw");
}
