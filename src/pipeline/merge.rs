//! K-way merge of several readers by originating time.

use crate::core::Result;
use crate::reader::{Record, StreamReader};

/// Merged record with the index of the reader it came from.
pub struct MergedRecord {
    pub source: usize,
    pub record: Record,
}

/// Pulls the record with the smallest originating time across all readers.
/// Ties go to the reader added first, so a single reader keeps its write order.
pub struct FanIn<'a> {
    readers: Vec<&'a mut Box<dyn StreamReader>>,
    pending: Vec<Option<Record>>,
}

impl<'a> FanIn<'a> {
    pub fn new(readers: Vec<&'a mut Box<dyn StreamReader>>) -> Self {
        let pending = readers.iter().map(|_| None).collect();
        Self { readers, pending }
    }

    /// Rewinds every reader to its first record.
    pub fn rewind(&mut self) -> Result<()> {
        for (index, reader) in self.readers.iter_mut().enumerate() {
            reader.rewind()?;
            self.pending[index] = None;
        }
        Ok(())
    }

    pub fn reader(&self, source: usize) -> &dyn StreamReader {
        &**self.readers[source]
    }

    pub fn next(&mut self) -> Result<Option<MergedRecord>> {
        for (index, reader) in self.readers.iter_mut().enumerate() {
            if self.pending[index].is_none() {
                self.pending[index] = reader.next_record()?;
            }
        }

        let mut best: Option<(usize, u64)> = None;
        for (index, pending) in self.pending.iter().enumerate() {
            let Some(record) = pending.as_ref() else {
                continue;
            };
            let timestamp = record.envelope.originating_time;
            match best {
                None => best = Some((index, timestamp)),
                Some((best_index, best_timestamp)) => {
                    if timestamp < best_timestamp
                        || (timestamp == best_timestamp && index < best_index)
                    {
                        best = Some((index, timestamp));
                    }
                }
            }
        }

        let Some((source, _)) = best else {
            return Ok(None);
        };
        Ok(self.pending[source]
            .take()
            .map(|record| MergedRecord { source, record }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Store, StoreWriter, StoreWriterExt, StreamOptions};
    use std::path::Path;
    use tempfile::TempDir;

    fn store_with_times(dir: &Path, name: &str, times: &[u64]) {
        let mut writer = Store::create(name, dir).unwrap();
        let stream = writer.create_stream::<u64>("t", StreamOptions::default()).unwrap();
        for &t in times {
            writer.write(&stream, &t, t).unwrap();
        }
        writer.commit().unwrap();
    }

    #[test]
    fn merges_by_originating_time() {
        let dir = TempDir::new().unwrap();
        store_with_times(dir.path(), "a", &[1, 4, 4, 9]);
        store_with_times(dir.path(), "b", &[2, 4, 10]);
        let mut a = Store::open("a", dir.path()).unwrap();
        let mut b = Store::open("b", dir.path()).unwrap();

        let mut fan_in = FanIn::new(vec![&mut a, &mut b]);
        let mut order = Vec::new();
        while let Some(merged) = fan_in.next().unwrap() {
            order.push((merged.record.envelope.originating_time, merged.source));
        }
        assert_eq!(
            order,
            vec![(1, 0), (2, 1), (4, 0), (4, 0), (4, 1), (9, 0), (10, 1)]
        );
    }
}
