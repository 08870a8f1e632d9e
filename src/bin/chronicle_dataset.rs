use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chronicle_dataset::core::TimeInterval;
use chronicle_dataset::reader::{DeliveryPolicy, ReplayDescriptor};
use chronicle_dataset::{Dataset, Store, StoreConfig, StoreWriter, StreamOptions};
use clap::{Parser, Subcommand};

type SharedWriter = Arc<Mutex<Box<dyn StoreWriter>>>;

#[derive(Parser)]
#[command(name = "chronicle-dataset", version, about = "Dataset and store tooling")]
struct Cli {
    /// Store writer configuration (JSON).
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the streams of a store.
    Streams { store_name: String, store_path: PathBuf },
    /// Print a dataset's sessions and partitions with their time ranges.
    Show { dataset: PathBuf },
    /// Create an empty dataset file.
    Create {
        dataset: PathBuf,
        #[arg(long = "name")]
        name: Option<String>,
        #[arg(long = "relative")]
        relative: bool,
    },
    /// Bind an existing store to a dataset.
    AddStore {
        dataset: PathBuf,
        store_name: String,
        store_path: PathBuf,
        /// Add to this session instead of creating one.
        #[arg(long = "session")]
        session: Option<String>,
        #[arg(long = "partition")]
        partition: Option<String>,
    },
    RemoveSession { dataset: PathBuf, session: String },
    /// Re-save a dataset with store paths relative to its file.
    Relocate {
        dataset: PathBuf,
        /// Write to this file instead of in place.
        #[arg(long = "output")]
        output: Option<PathBuf>,
    },
    /// Copy a store into a new one, re-segmented with the active config.
    Repack {
        store_name: String,
        store_path: PathBuf,
        new_name: String,
        new_path: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => StoreConfig::default(),
    };

    match cli.command {
        Commands::Streams {
            store_name,
            store_path,
        } => cmd_streams(&store_name, &store_path),
        Commands::Show { dataset } => cmd_show(&dataset),
        Commands::Create {
            dataset,
            name,
            relative,
        } => {
            let name = name.unwrap_or_else(|| default_name(&dataset));
            Dataset::new(name).save_as(&dataset, relative)?;
            Ok(())
        }
        Commands::AddStore {
            dataset,
            store_name,
            store_path,
            session,
            partition,
        } => {
            let mut ds = Dataset::load(&dataset)?;
            ds.set_auto_save(true)?;
            match session {
                Some(session) => {
                    if !ds.contains_session(&session) {
                        ds.create_session(Some(&session))?;
                    }
                    ds.add_partition_from_existing_store(&session, &store_name, &store_path, partition.as_deref())?;
                }
                None => {
                    ds.add_session_from_existing_store(&store_name, &store_path, None)?;
                }
            }
            Ok(())
        }
        Commands::RemoveSession { dataset, session } => {
            let mut ds = Dataset::load(&dataset)?;
            ds.remove_session(&session)?;
            ds.save()?;
            Ok(())
        }
        Commands::Relocate { dataset, output } => {
            let mut ds = Dataset::load(&dataset)?;
            ds.save_as(output.as_deref().unwrap_or(&dataset), true)?;
            Ok(())
        }
        Commands::Repack {
            store_name,
            store_path,
            new_name,
            new_path,
        } => cmd_repack(&store_name, &store_path, &new_name, &new_path, config),
    }
}

fn default_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string())
}

fn fmt_interval(interval: TimeInterval) -> String {
    if interval.is_empty() {
        "-".to_string()
    } else {
        format!("{} .. {} ({:.3}s)", interval.left, interval.right, interval.span_ns() as f64 / 1e9)
    }
}

fn cmd_streams(store_name: &str, store_path: &Path) -> Result<()> {
    let reader = Store::open(store_name, store_path)?;
    println!("store '{}' ({})", reader.store_name(), reader.format());
    for stream in reader.available_streams() {
        println!(
            "  #{:<3} {:<24} {:>10} msgs  avg {:>8.1} B{}  {}  [{}]",
            stream.id,
            stream.name,
            stream.message_count,
            stream.average_message_size,
            if stream.is_indexed { " (large)" } else { "" },
            fmt_interval(stream.originating_time_interval()),
            stream.type_name
        );
    }
    Ok(())
}

fn cmd_show(path: &Path) -> Result<()> {
    let dataset = Dataset::load(path)?;
    println!("dataset '{}'  {}", dataset.name(), fmt_interval(dataset.originating_time_interval()?));
    for session in dataset.sessions() {
        println!("  session '{}'  {}", session.name(), fmt_interval(session.originating_time_interval()?));
        for partition in session.partitions() {
            println!(
                "    partition '{}' -> {} @ {} ({})  {}",
                partition.name(),
                partition.store_name(),
                partition.store_path().display(),
                partition.reader_type(),
                fmt_interval(partition.originating_time_interval()?)
            );
        }
    }
    Ok(())
}

fn cmd_repack(store_name: &str, store_path: &Path, new_name: &str, new_path: &Path, config: StoreConfig) -> Result<()> {
    let mut reader = Store::open(store_name, store_path)?;
    let writer = Store::create_as(new_name, new_path, reader.format(), config)?;
    let writer = Arc::new(Mutex::new(writer));
    let streams: Vec<_> = reader.available_streams().cloned().collect();
    for stream in &streams {
        let options = StreamOptions {
            large: stream.is_indexed,
        };
        let id = {
            let mut w = lock(&writer)?;
            let id = w.create_stream_raw(&stream.name, &stream.type_name, options)?;
            if let Some(meta) = &stream.supplemental {
                w.set_supplemental_raw(id, meta.clone())?;
            }
            id
        };
        let sink = writer.clone();
        reader.open_stream_raw(
            &stream.name,
            DeliveryPolicy::Unlimited,
            Box::new(move |payload, envelope| {
                lock(&sink)?.write_raw(id, envelope.originating_time, payload)?;
                Ok(())
            }),
        )?;
    }
    let stats = reader.read_all(ReplayDescriptor::ALL)?;
    let catalog = lock(&writer)?.commit()?;
    println!(
        "repacked {} messages into '{}' ({} data segments) in {:?}",
        catalog.message_count(),
        new_name,
        catalog.data_segments,
        stats.duration
    );
    Ok(())
}

fn lock(writer: &SharedWriter) -> Result<MutexGuard<'_, Box<dyn StoreWriter>>> {
    writer
        .lock()
        .map_err(|_| anyhow::anyhow!("store writer lock poisoned"))
}
