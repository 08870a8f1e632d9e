//! Read side of stores: one [`StreamReader`] implementation per format.
//!
//! A reader is both a pull cursor over the multiplexed records of a store
//! ([`StreamReader::next_record`]) and a subscription hub: callers register
//! per-stream callbacks and drain them with one [`StreamReader::read_all`]
//! pass.

pub mod binary;
pub mod json;
pub mod registry;
pub mod subscription;

use std::path::Path;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;

pub use binary::BinaryStreamReader;
pub use json::JsonStreamReader;
pub use registry::{ReaderLease, ReaderRegistry, SharedReader};
pub use subscription::{DeliveryPolicy, IndexHandler, MessageHandler, Subscriptions};

use crate::core::codec;
use crate::core::{
    CancellationToken, EntityKind, Envelope, Error, Result, StoreFormat, TimeInterval,
};
use crate::store::{Catalog, IndexEntry, StreamMetadata, SupplementalMetadata};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordBody {
    Inline(Vec<u8>),
    /// Record of a large stream; the payload lives in a large segment.
    Indexed(IndexEntry),
}

/// One multiplexed record in write order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub stream_id: u32,
    pub envelope: Envelope,
    pub body: RecordBody,
}

/// Range of originating times a replay delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayDescriptor {
    pub interval: TimeInterval,
}

impl ReplayDescriptor {
    /// The whole store.
    pub const ALL: ReplayDescriptor = ReplayDescriptor {
        interval: TimeInterval::INFINITE,
    };

    pub fn new(interval: TimeInterval) -> Self {
        Self { interval }
    }
}

impl Default for ReplayDescriptor {
    fn default() -> Self {
        Self::ALL
    }
}

/// Statistics for a replay run.
#[derive(Debug, Clone, Default)]
pub struct ReplayStats {
    pub messages_read: u64,
    pub messages_delivered: u64,
    /// Records outside the replay interval.
    pub messages_filtered: u64,
    pub duration: Duration,
}

impl ReplayStats {
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.messages_read as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }
}

pub(crate) const PROGRESS_EVERY: u64 = 100_000;

/// Uniform read access to a store, whatever its format.
pub trait StreamReader: Send {
    fn store_name(&self) -> &str;
    fn store_path(&self) -> &Path;
    fn format(&self) -> StoreFormat;
    fn catalog(&self) -> &Catalog;

    /// Moves the cursor back to the first record.
    fn rewind(&mut self) -> Result<()>;

    /// Next record in write order, `None` once the store is exhausted.
    fn next_record(&mut self) -> Result<Option<Record>>;

    /// Fetches the payload an index entry points at.
    fn read_indexed(&self, entry: &IndexEntry) -> Result<Vec<u8>>;

    fn subscriptions_mut(&mut self) -> &mut Subscriptions;

    fn available_streams(&self) -> std::slice::Iter<'_, StreamMetadata> {
        self.catalog().streams.iter()
    }

    fn stream_metadata(&self, name: &str) -> Result<&StreamMetadata> {
        self.catalog()
            .stream(name)
            .ok_or_else(|| Error::not_found(EntityKind::Stream, name))
    }

    fn supplemental_raw(&self, name: &str) -> Result<Option<&SupplementalMetadata>> {
        Ok(self.stream_metadata(name)?.supplemental.as_ref())
    }

    fn originating_time_interval(&self) -> TimeInterval {
        self.catalog().originating_time_interval()
    }

    fn message_time_interval(&self) -> TimeInterval {
        self.catalog().message_time_interval()
    }

    fn open_stream_raw(&mut self, name: &str, policy: DeliveryPolicy, handler: MessageHandler) -> Result<()> {
        let id = self.stream_metadata(name)?.id;
        self.subscriptions_mut().add_message(id, policy, handler);
        Ok(())
    }

    /// Subscribes to the index entries of a large stream.
    fn open_stream_index(&mut self, name: &str, handler: IndexHandler) -> Result<()> {
        let meta = self.stream_metadata(name)?;
        if !meta.is_indexed {
            return Err(Error::Unsupported("stream is not indexed"));
        }
        let id = meta.id;
        self.subscriptions_mut()
            .add_index(id, DeliveryPolicy::Unlimited, handler);
        Ok(())
    }

    fn read_all(&mut self, replay: ReplayDescriptor) -> Result<ReplayStats> {
        self.read_all_with(replay, &CancellationToken::new())
    }

    /// Delivers every subscribed message with an originating time inside
    /// `replay`, in write order. Subscriptions stay registered afterwards,
    /// whether the pass succeeded or not.
    fn read_all_with(&mut self, replay: ReplayDescriptor, cancel: &CancellationToken) -> Result<ReplayStats> {
        let mut subscriptions = std::mem::take(self.subscriptions_mut());
        let result = replay_into(self, &mut subscriptions, replay, cancel);
        *self.subscriptions_mut() = subscriptions;
        result
    }
}

fn replay_into<R: StreamReader + ?Sized>(
    reader: &mut R,
    subscriptions: &mut Subscriptions,
    replay: ReplayDescriptor,
    cancel: &CancellationToken,
) -> Result<ReplayStats> {
    let start = Instant::now();
    let mut stats = ReplayStats::default();
    reader.rewind()?;
    subscriptions.reset();

    loop {
        cancel.check()?;
        let Some(record) = reader.next_record()? else {
            break;
        };
        stats.messages_read += 1;
        if !replay.interval.contains(record.envelope.originating_time) {
            stats.messages_filtered += 1;
            continue;
        }
        stats.messages_delivered += subscriptions.dispatch(&*reader, &record)?;

        if stats.messages_read % PROGRESS_EVERY == 0 {
            let elapsed = start.elapsed().as_secs_f64();
            log::info!(
                "replayed {} msgs from '{}' ({:.0} msg/sec)",
                stats.messages_read,
                reader.store_name(),
                stats.messages_read as f64 / elapsed
            );
        }
    }

    stats.duration = start.elapsed();
    Ok(stats)
}

/// Typed helpers over [`StreamReader`] using the store's default codec.
pub trait StreamReaderExt: StreamReader {
    fn open_stream<T, F>(&mut self, name: &str, callback: F) -> Result<()>
    where
        T: DeserializeOwned,
        F: FnMut(T, &Envelope) -> anyhow::Result<()> + Send + 'static,
    {
        self.open_stream_with(name, DeliveryPolicy::Unlimited, callback)
    }

    fn open_stream_with<T, F>(&mut self, name: &str, policy: DeliveryPolicy, mut callback: F) -> Result<()>
    where
        T: DeserializeOwned,
        F: FnMut(T, &Envelope) -> anyhow::Result<()> + Send + 'static,
    {
        let format = self.format();
        self.open_stream_raw(
            name,
            policy,
            Box::new(move |payload, envelope| {
                let value = codec::decode::<T>(format, payload)?;
                callback(value, envelope)
            }),
        )
    }

    /// Random access to one message of a large stream.
    fn read<T: DeserializeOwned>(&self, entry: &IndexEntry) -> Result<T> {
        let payload = self.read_indexed(entry)?;
        codec::decode(self.format(), &payload)
    }

    fn supplemental_metadata<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.supplemental_raw(name)? {
            Some(meta) => Ok(Some(serde_json::from_value(meta.value.clone())?)),
            None => Ok(None),
        }
    }
}

impl<R: StreamReader + ?Sized> StreamReaderExt for R {}
