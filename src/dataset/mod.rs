//! Dataset → Session → Partition hierarchy over stores.
//!
//! A [`Dataset`] is the single owner of its sessions and partitions; every
//! structural mutation goes through `&mut Dataset`, is auto-saved when enabled
//! and is announced to change listeners.

pub mod derived;
pub mod descriptor;
pub mod events;
pub mod partition;
pub mod session;

use std::path::{Path, PathBuf};

pub use derived::{
    compute_derived_store, DerivationInput, DerivationStatus, DerivedPartitionOptions, DerivedStore,
    StatusHandle,
};
pub use descriptor::{DatasetDescriptor, PartitionDescriptor, SessionDescriptor, DESCRIPTOR_VERSION};
pub use events::{ChangeListener, DatasetEvent};
pub use partition::Partition;
pub use session::Session;

use crate::core::{EntityKind, Error, Result, TimeInterval};
use crate::path::{absolutize, from_portable, normalize, to_portable};
use crate::pipeline::{Exporter, Importer, Pipeline};
use crate::reader::ReaderRegistry;
use crate::store::Store;

pub struct Dataset {
    name: String,
    sessions: Vec<Session>,
    path: Option<PathBuf>,
    relative_paths: bool,
    auto_save: bool,
    unsaved: bool,
    registry: ReaderRegistry,
    listeners: Vec<ChangeListener>,
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sessions: Vec::new(),
            path: None,
            relative_paths: false,
            auto_save: false,
            unsaved: false,
            registry: ReaderRegistry::new(),
            listeners: Vec::new(),
        }
    }

    /// Loads a dataset from its descriptor file. Stores are not opened until
    /// their metadata is first needed.
    pub fn load(path: &Path) -> Result<Self> {
        let path = absolutize(path)?;
        let descriptor = DatasetDescriptor::load(&path)?;
        let dir = descriptor_dir(&path);
        let mut dataset = Dataset::new(descriptor.name);
        for session_desc in descriptor.sessions {
            if dataset.contains_session(&session_desc.name) {
                return Err(Error::duplicate(EntityKind::Session, session_desc.name));
            }
            let mut session = Session::new(session_desc.name);
            for part in session_desc.partitions {
                let store_path = from_portable(&part.store_path, &dir);
                session.add_partition(Partition::new(
                    part.name,
                    part.store_name,
                    store_path,
                    part.reader_type,
                    dataset.registry.clone(),
                ))?;
            }
            dataset.sessions.push(session);
        }
        dataset.relative_paths = descriptor.relative_paths;
        log::debug!(
            "loaded dataset '{}' from {} ({} sessions)",
            dataset.name,
            path.display(),
            dataset.sessions.len()
        );
        dataset.path = Some(path);
        Ok(dataset)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backing descriptor file, if the dataset was loaded or saved.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn contains_session(&self, name: &str) -> bool {
        self.sessions.iter().any(|s| s.name() == name)
    }

    pub fn session(&self, name: &str) -> Result<&Session> {
        self.sessions
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| Error::not_found(EntityKind::Session, name))
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.unsaved
    }

    pub fn is_auto_save(&self) -> bool {
        self.auto_save
    }

    pub fn reader_registry(&self) -> &ReaderRegistry {
        &self.registry
    }

    /// Union of the sessions' originating-time intervals.
    pub fn originating_time_interval(&self) -> Result<TimeInterval> {
        let mut interval = TimeInterval::EMPTY;
        for session in &self.sessions {
            interval = interval.union(&session.originating_time_interval()?);
        }
        Ok(interval)
    }

    /// Registers a listener called after every structural change.
    pub fn on_changed<F>(&mut self, listener: F)
    where
        F: FnMut(&DatasetEvent) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Writes the descriptor to the file the dataset was loaded from or last
    /// saved to.
    pub fn save(&mut self) -> Result<()> {
        let path = self
            .path
            .clone()
            .ok_or(Error::Unsupported("dataset has no backing file"))?;
        self.write_descriptor(&path, self.relative_paths)?;
        self.unsaved = false;
        Ok(())
    }

    /// Writes the descriptor to `path` and makes it the backing file. With
    /// `use_relative_paths` store paths are recorded relative to the
    /// descriptor's directory.
    pub fn save_as(&mut self, path: &Path, use_relative_paths: bool) -> Result<()> {
        let path = absolutize(path)?;
        self.write_descriptor(&path, use_relative_paths)?;
        self.path = Some(path);
        self.relative_paths = use_relative_paths;
        self.unsaved = false;
        Ok(())
    }

    /// Turns auto-save on or off. Enabling it saves pending changes at once.
    pub fn set_auto_save(&mut self, enabled: bool) -> Result<()> {
        if enabled && self.path.is_none() {
            return Err(Error::Unsupported("auto-save requires a backing file"));
        }
        self.auto_save = enabled;
        if enabled && self.unsaved {
            self.save()?;
        }
        Ok(())
    }

    pub fn to_descriptor(&self, relative_to: Option<&Path>) -> DatasetDescriptor {
        DatasetDescriptor {
            version: DESCRIPTOR_VERSION,
            name: self.name.clone(),
            relative_paths: relative_to.is_some(),
            sessions: self
                .sessions
                .iter()
                .map(|session| SessionDescriptor {
                    name: session.name().to_string(),
                    partitions: session
                        .partitions()
                        .iter()
                        .map(|partition| PartitionDescriptor {
                            name: partition.name().to_string(),
                            store_name: partition.store_name().to_string(),
                            store_path: match relative_to {
                                Some(dir) => to_portable(partition.store_path(), dir),
                                None => normalize(partition.store_path())
                                    .to_string_lossy()
                                    .into_owned(),
                            },
                            reader_type: partition.reader_type(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    fn write_descriptor(&self, path: &Path, use_relative_paths: bool) -> Result<()> {
        let dir = descriptor_dir(path);
        let descriptor = self.to_descriptor(use_relative_paths.then_some(dir.as_path()));
        descriptor.save(path)?;
        log::info!("saved dataset '{}' to {}", self.name, path.display());
        Ok(())
    }

    /// Marks the dataset dirty, auto-saves, then notifies listeners. A failed
    /// auto-save leaves the dataset dirty and is returned after notification.
    fn changed(&mut self, event: DatasetEvent) -> Result<()> {
        let saved = self.persist();
        self.notify(&event);
        saved
    }

    fn persist(&mut self) -> Result<()> {
        self.unsaved = true;
        if self.auto_save {
            self.save()
        } else {
            Ok(())
        }
    }

    fn notify(&mut self, event: &DatasetEvent) {
        for listener in self.listeners.iter_mut() {
            listener(event);
        }
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    pub fn rename(&mut self, new_name: &str) -> Result<()> {
        let from = std::mem::replace(&mut self.name, new_name.to_string());
        self.changed(DatasetEvent::DatasetRenamed {
            from,
            to: new_name.to_string(),
        })
    }

    /// Adds an empty session. Without a name, picks `Session N` with the
    /// smallest free `N`. Returns the session name.
    pub fn create_session(&mut self, name: Option<&str>) -> Result<String> {
        let name = match name {
            Some(name) => {
                if self.contains_session(name) {
                    return Err(Error::duplicate(EntityKind::Session, name));
                }
                name.to_string()
            }
            None => self.next_session_name(),
        };
        self.sessions.push(Session::new(name.clone()));
        self.changed(DatasetEvent::SessionAdded {
            session: name.clone(),
        })?;
        Ok(name)
    }

    /// Adds a session holding one partition bound to an existing store. The
    /// session defaults to the store name; the partition is named after the
    /// store.
    pub fn add_session_from_existing_store(
        &mut self,
        store_name: &str,
        store_path: &Path,
        session_name: Option<&str>,
    ) -> Result<String> {
        let session_name = session_name.unwrap_or(store_name).to_string();
        if self.contains_session(&session_name) {
            return Err(Error::duplicate(EntityKind::Session, session_name));
        }
        let partition = self.bind_store(store_name, store_path, store_name)?;
        let mut session = Session::new(session_name.clone());
        session.add_partition(partition)?;
        self.sessions.push(session);
        self.changed(DatasetEvent::SessionAdded {
            session: session_name.clone(),
        })?;
        Ok(session_name)
    }

    /// Removes a session. Store files are left untouched.
    pub fn remove_session(&mut self, name: &str) -> Result<()> {
        let index = self
            .sessions
            .iter()
            .position(|s| s.name() == name)
            .ok_or_else(|| Error::not_found(EntityKind::Session, name))?;
        drop(self.sessions.remove(index));
        self.changed(DatasetEvent::SessionRemoved {
            session: name.to_string(),
        })
    }

    pub fn rename_session(&mut self, name: &str, new_name: &str) -> Result<()> {
        if name != new_name && self.contains_session(new_name) {
            return Err(Error::duplicate(EntityKind::Session, new_name));
        }
        self.session_mut(name)?.set_name(new_name);
        self.changed(DatasetEvent::SessionRenamed {
            from: name.to_string(),
            to: new_name.to_string(),
        })
    }

    /// Binds an existing store as a new partition of `session`. The partition
    /// name defaults to the store name. Returns the partition name.
    pub fn add_partition_from_existing_store(
        &mut self,
        session: &str,
        store_name: &str,
        store_path: &Path,
        partition_name: Option<&str>,
    ) -> Result<String> {
        let partition_name = partition_name.unwrap_or(store_name).to_string();
        if self.session(session)?.contains_partition(&partition_name) {
            return Err(Error::duplicate(EntityKind::Partition, partition_name));
        }
        let partition = self.bind_store(store_name, store_path, &partition_name)?;
        self.session_mut(session)?.add_partition(partition)?;
        self.changed(DatasetEvent::PartitionAdded {
            session: session.to_string(),
            partition: partition_name.clone(),
        })?;
        Ok(partition_name)
    }

    /// Removes a partition and releases its reader. Store files are kept.
    pub fn remove_partition(&mut self, session: &str, partition: &str) -> Result<()> {
        drop(self.session_mut(session)?.remove_partition(partition)?);
        self.changed(DatasetEvent::PartitionRemoved {
            session: session.to_string(),
            partition: partition.to_string(),
        })
    }

    pub fn rename_partition(&mut self, session: &str, partition: &str, new_name: &str) -> Result<()> {
        self.session_mut(session)?
            .rename_partition(partition, new_name)?;
        self.changed(DatasetEvent::PartitionRenamed {
            session: session.to_string(),
            from: partition.to_string(),
            to: new_name.to_string(),
        })
    }

    /// Moves every session of `other` into this dataset. Fails without any
    /// effect if a session name exists on both sides.
    pub fn append(&mut self, other: Dataset) -> Result<()> {
        if let Some(clash) = other
            .sessions
            .iter()
            .find(|s| self.contains_session(s.name()))
        {
            return Err(Error::duplicate(EntityKind::Session, clash.name()));
        }
        let mut other = other;
        let mut names = Vec::with_capacity(other.sessions.len());
        for mut session in other.sessions.drain(..) {
            for partition in session.partitions_mut() {
                partition.rebind(self.registry.clone());
            }
            names.push(session.name().to_string());
            self.sessions.push(session);
        }
        self.changed(DatasetEvent::SessionsAppended { sessions: names })
    }

    // ------------------------------------------------------------------
    // Derived partitions
    // ------------------------------------------------------------------

    /// Derives a new store from `input_partition` of `session` and binds it as
    /// partition `options.partition_name` of the same session.
    ///
    /// On cancellation or transform failure the candidate store is removed
    /// and the dataset is left unchanged.
    pub async fn create_derived_partition<P, F>(
        &mut self,
        session: &str,
        input_partition: &str,
        transform: F,
        parameter: P,
        options: DerivedPartitionOptions,
    ) -> Result<String>
    where
        P: Send + 'static,
        F: FnOnce(&mut Pipeline, &Importer, &Exporter, P) -> anyhow::Result<()> + Send + 'static,
    {
        let input = {
            let partition = self.session(session)?.partition(input_partition)?;
            DerivationInput {
                key: partition.store_key().clone(),
                format: partition.reader_type(),
            }
        };
        let derived = compute_derived_store(input, transform, parameter, &options).await?;
        self.commit_derived_partition(session, derived, &options)
    }

    /// Binds a derived store to `session`. The store is deleted instead if
    /// the derivation was cancelled meanwhile or the partition name is taken
    /// and `overwrite_existing` is off.
    pub fn commit_derived_partition(
        &mut self,
        session: &str,
        derived: DerivedStore,
        options: &DerivedPartitionOptions,
    ) -> Result<String> {
        let status = options.status.clone();
        let result = self.bind_derived(session, derived, options);
        status.set(if result.is_ok() {
            DerivationStatus::Committed
        } else {
            DerivationStatus::RolledBack
        });
        result
    }

    fn bind_derived(
        &mut self,
        session: &str,
        derived: DerivedStore,
        options: &DerivedPartitionOptions,
    ) -> Result<String> {
        options.cancellation.check()?;
        let name = options.partition_name.clone();
        let exists = self.session(session)?.contains_partition(&name);
        if exists && !options.overwrite_existing {
            return Err(Error::duplicate(EntityKind::Partition, name));
        }
        let partition = Partition::new(
            name.clone(),
            derived.store_name(),
            derived.store_path(),
            derived.format(),
            self.registry.clone(),
        );
        let replaced = self.session_mut(session)?.put_partition(partition);
        let event = if replaced.is_some() {
            DatasetEvent::PartitionReplaced {
                session: session.to_string(),
                partition: name.clone(),
            }
        } else {
            DatasetEvent::PartitionAdded {
                session: session.to_string(),
                partition: name.clone(),
            }
        };

        // The descriptor write is the commit point under auto-save. If it
        // fails the session is restored and `derived` deletes the store.
        let was_unsaved = self.unsaved;
        if let Err(err) = self.persist() {
            let target = self.session_mut(session)?;
            match replaced {
                Some(previous) => drop(target.put_partition(previous)),
                None => drop(target.remove_partition(&name)?),
            }
            self.unsaved = was_unsaved;
            return Err(err);
        }
        drop(replaced);
        derived.adopt();
        self.notify(&event);
        Ok(name)
    }

    // ------------------------------------------------------------------

    fn session_mut(&mut self, name: &str) -> Result<&mut Session> {
        self.sessions
            .iter_mut()
            .find(|s| s.name() == name)
            .ok_or_else(|| Error::not_found(EntityKind::Session, name))
    }

    fn bind_store(&self, store_name: &str, store_path: &Path, partition_name: &str) -> Result<Partition> {
        let store_path = absolutize(store_path)?;
        let format = Store::format(store_name, &store_path)?;
        Ok(Partition::new(
            partition_name,
            store_name,
            store_path,
            format,
            self.registry.clone(),
        ))
    }

    fn next_session_name(&self) -> String {
        (1..)
            .map(|n| format!("Session {n}"))
            .find(|candidate| !self.contains_session(candidate))
            .unwrap_or_else(|| "Session".to_string())
    }
}

impl std::fmt::Debug for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dataset")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("sessions", &self.sessions)
            .field("auto_save", &self.auto_save)
            .field("unsaved", &self.unsaved)
            .finish()
    }
}

fn descriptor_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
