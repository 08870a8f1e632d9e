use crate::core::{EntityKind, Error, Result, TimeInterval};
use crate::dataset::partition::Partition;

/// Named, ordered collection of partitions.
///
/// Mutations go through the owning [`Dataset`](crate::dataset::Dataset) so
/// that they are auto-saved and announced.
#[derive(Debug)]
pub struct Session {
    name: String,
    partitions: Vec<Partition>,
}

impl Session {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn contains_partition(&self, name: &str) -> bool {
        self.partitions.iter().any(|p| p.name() == name)
    }

    pub fn partition(&self, name: &str) -> Result<&Partition> {
        self.partitions
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| Error::not_found(EntityKind::Partition, name))
    }

    /// Union of the partitions' originating-time intervals.
    pub fn originating_time_interval(&self) -> Result<TimeInterval> {
        let mut interval = TimeInterval::EMPTY;
        for partition in &self.partitions {
            interval = interval.union(&partition.originating_time_interval()?);
        }
        Ok(interval)
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn partitions_mut(&mut self) -> &mut [Partition] {
        &mut self.partitions
    }

    pub(crate) fn add_partition(&mut self, partition: Partition) -> Result<()> {
        if self.contains_partition(partition.name()) {
            return Err(Error::duplicate(EntityKind::Partition, partition.name()));
        }
        self.partitions.push(partition);
        Ok(())
    }

    /// Replaces the partition of the same name in place, or appends.
    /// Returns the replaced partition.
    pub(crate) fn put_partition(&mut self, partition: Partition) -> Option<Partition> {
        match self.partitions.iter().position(|p| p.name() == partition.name()) {
            Some(index) => Some(std::mem::replace(&mut self.partitions[index], partition)),
            None => {
                self.partitions.push(partition);
                None
            }
        }
    }

    pub(crate) fn remove_partition(&mut self, name: &str) -> Result<Partition> {
        let index = self
            .partitions
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| Error::not_found(EntityKind::Partition, name))?;
        Ok(self.partitions.remove(index))
    }

    pub(crate) fn rename_partition(&mut self, name: &str, new_name: &str) -> Result<()> {
        if name != new_name && self.contains_partition(new_name) {
            return Err(Error::duplicate(EntityKind::Partition, new_name));
        }
        let partition = self
            .partitions
            .iter_mut()
            .find(|p| p.name() == name)
            .ok_or_else(|| Error::not_found(EntityKind::Partition, name))?;
        partition.set_name(new_name);
        Ok(())
    }
}
