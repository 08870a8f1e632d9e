//! Derived partitions: run a transform over an input store into a new store
//! that only becomes visible if the whole computation succeeds.
//!
//! ```text
//! Idle ──> Running ──> Committed
//!             │
//!             └──────> RolledBack   (cancellation or transform error)
//! ```
//!
//! The candidate store is written through an [`Exporter`]; on any failure its
//! files are removed before the error reaches the caller.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::core::{CancellationToken, Error, Result, StoreFormat};
use crate::path::absolutize;
use crate::pipeline::{Exporter, Importer, Pipeline};
use crate::reader::{DeliveryPolicy, ReplayDescriptor, ReplayStats};
use crate::store::{Catalog, Store, StoreConfig, StoreKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivationStatus {
    Idle,
    Running,
    Committed,
    RolledBack,
}

impl DerivationStatus {
    fn code(self) -> u8 {
        match self {
            DerivationStatus::Idle => 0,
            DerivationStatus::Running => 1,
            DerivationStatus::Committed => 2,
            DerivationStatus::RolledBack => 3,
        }
    }

    fn from_code(code: u8) -> Self {
        match code {
            1 => DerivationStatus::Running,
            2 => DerivationStatus::Committed,
            3 => DerivationStatus::RolledBack,
            _ => DerivationStatus::Idle,
        }
    }
}

/// Pollable view of a derivation's state. Clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    state: Arc<AtomicU8>,
}

impl StatusHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> DerivationStatus {
        DerivationStatus::from_code(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, status: DerivationStatus) {
        self.state.store(status.code(), Ordering::Release);
    }
}

/// Knobs of a derived-partition computation.
#[derive(Debug, Clone)]
pub struct DerivedPartitionOptions {
    pub partition_name: String,
    pub overwrite_existing: bool,
    pub store_name: String,
    pub store_path: PathBuf,
    pub format: StoreFormat,
    pub config: StoreConfig,
    pub replay: ReplayDescriptor,
    /// Default delivery policy of the importer's subscriptions.
    pub delivery_policy: DeliveryPolicy,
    pub cancellation: CancellationToken,
    pub status: StatusHandle,
}

impl DerivedPartitionOptions {
    pub fn new(partition_name: impl Into<String>, store_name: impl Into<String>, store_path: impl Into<PathBuf>) -> Self {
        Self {
            partition_name: partition_name.into(),
            overwrite_existing: false,
            store_name: store_name.into(),
            store_path: store_path.into(),
            format: StoreFormat::Binary,
            config: StoreConfig::default(),
            replay: ReplayDescriptor::ALL,
            delivery_policy: DeliveryPolicy::Unlimited,
            cancellation: CancellationToken::new(),
            status: StatusHandle::new(),
        }
    }

    pub fn overwrite_existing(mut self, overwrite: bool) -> Self {
        self.overwrite_existing = overwrite;
        self
    }

    pub fn format(mut self, format: StoreFormat) -> Self {
        self.format = format;
        self
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn replay(mut self, replay: ReplayDescriptor) -> Self {
        self.replay = replay;
        self
    }

    pub fn delivery_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.delivery_policy = policy;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn status(mut self, status: StatusHandle) -> Self {
        self.status = status;
        self
    }
}

/// Input store of a derivation.
#[derive(Debug, Clone)]
pub struct DerivationInput {
    pub key: StoreKey,
    pub format: StoreFormat,
}

/// A committed candidate store not yet bound to a partition.
///
/// Dropping it without [`keep`](DerivedStore::keep) or handing it to
/// [`Dataset::commit_derived_partition`](crate::dataset::Dataset::commit_derived_partition)
/// deletes the store.
#[derive(Debug)]
pub struct DerivedStore {
    key: StoreKey,
    format: StoreFormat,
    catalog: Catalog,
    adopted: bool,
}

impl DerivedStore {
    pub fn store_name(&self) -> &str {
        &self.key.name
    }

    pub fn store_path(&self) -> &Path {
        &self.key.path
    }

    pub fn format(&self) -> StoreFormat {
        self.format
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Keeps the store on disk without binding it to a partition.
    pub fn keep(mut self) -> StoreKey {
        self.adopted = true;
        self.key.clone()
    }

    /// Deletes the store now, reporting failures.
    pub fn discard(mut self) -> Result<()> {
        self.adopted = true;
        Store::delete(&self.key.name, &self.key.path)
    }

    /// Hands ownership of the store files to a bound partition.
    pub(crate) fn adopt(mut self) {
        self.adopted = true;
    }
}

impl Drop for DerivedStore {
    fn drop(&mut self) {
        if self.adopted {
            return;
        }
        if let Err(err) = Store::delete(&self.key.name, &self.key.path) {
            log::warn!(
                "failed to delete unbound derived store '{}': {}",
                self.key.name,
                err
            );
        }
    }
}

/// Runs `transform` over `input` into a new store on a blocking worker.
///
/// The transform receives the compute context, an importer bound to the input
/// store, an exporter bound to the candidate store and `parameter`. It sets up
/// subscriptions and output streams; the replay itself runs after it returns.
/// Does not touch any dataset, so several derivations may run concurrently.
pub async fn compute_derived_store<P, F>(
    input: DerivationInput,
    transform: F,
    parameter: P,
    options: &DerivedPartitionOptions,
) -> Result<DerivedStore>
where
    P: Send + 'static,
    F: FnOnce(&mut Pipeline, &Importer, &Exporter, P) -> anyhow::Result<()> + Send + 'static,
{
    let status = options.status.clone();
    status.set(DerivationStatus::Running);
    let job = DerivationJob {
        input,
        store_name: options.store_name.clone(),
        store_path: options.store_path.clone(),
        format: options.format,
        config: options.config.clone(),
        replay: options.replay,
        policy: options.delivery_policy,
        cancel: options.cancellation.clone(),
    };

    let result = match tokio::task::spawn_blocking(move || job.run(transform, parameter)).await {
        Ok(result) => result,
        Err(join_err) => Err(Error::TransformFailure(anyhow::anyhow!(
            "derivation worker failed: {join_err}"
        ))),
    };
    if result.is_err() {
        status.set(DerivationStatus::RolledBack);
    }
    result
}

struct DerivationJob {
    input: DerivationInput,
    store_name: String,
    store_path: PathBuf,
    format: StoreFormat,
    config: StoreConfig,
    replay: ReplayDescriptor,
    policy: DeliveryPolicy,
    cancel: CancellationToken,
}

impl DerivationJob {
    fn run<P, F>(self, transform: F, parameter: P) -> Result<DerivedStore>
    where
        F: FnOnce(&mut Pipeline, &Importer, &Exporter, P) -> anyhow::Result<()>,
    {
        let store_path = absolutize(&self.store_path)?;
        self.cancel.check()?;
        if Store::exists(&self.store_name, &store_path) {
            return Err(Error::StoreExists(self.store_name));
        }

        let writer = Store::create_as(&self.store_name, &store_path, self.format, self.config.clone())?;
        let exporter = Exporter::new(writer);
        let mut pipeline = Pipeline::create(format!("derive {}", self.store_name));

        let outcome = (|| -> Result<(ReplayStats, Catalog)> {
            let mut importer = Importer::open_as(
                &mut pipeline,
                &self.input.key.name,
                &self.input.key.path,
                self.input.format,
            )?;
            importer.set_delivery_policy(self.policy);
            transform(&mut pipeline, &importer, &exporter, parameter).map_err(Error::from_user)?;
            let stats = pipeline.run(self.replay, &self.cancel)?;
            self.cancel.check()?;
            let catalog = exporter.commit()?;
            Ok((stats, catalog))
        })();

        match outcome {
            Ok((stats, catalog)) => {
                log::info!(
                    "derived store '{}' from '{}': {} read, {} delivered, {} written in {:?}",
                    self.store_name,
                    self.input.key.name,
                    stats.messages_read,
                    stats.messages_delivered,
                    catalog.message_count(),
                    stats.duration
                );
                Ok(DerivedStore {
                    key: StoreKey::new(self.store_name, store_path),
                    format: self.format,
                    catalog,
                    adopted: false,
                })
            }
            Err(err) => {
                if let Err(abort_err) = exporter.abort() {
                    log::error!(
                        "failed to roll back derived store '{}': {}",
                        self.store_name,
                        abort_err
                    );
                }
                log::info!("derivation of '{}' rolled back: {}", self.store_name, err);
                Err(err)
            }
        }
    }
}
