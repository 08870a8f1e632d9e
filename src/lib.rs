//! Multi-stream time-series stores organized into datasets.
//!
//! - [`store`]: catalog-indexed, append-only, multiplexed stores and their writers.
//! - [`reader`]: format-independent readers with per-stream subscriptions.
//! - [`pipeline`]: a small compute context that replays stores into new ones.
//! - [`dataset`]: the dataset / session / partition hierarchy, persistence and
//!   derived partitions.

pub mod core;
pub mod dataset;
pub mod path;
pub mod pipeline;
pub mod reader;
pub mod store;

pub use crate::core::{
    CancellationToken, Clock, EntityKind, Envelope, Error, Result, StoreFormat, SystemClock,
    TimeInterval,
};
pub use dataset::{Dataset, DatasetEvent, DerivedPartitionOptions, Partition, Session};
pub use reader::{ReplayDescriptor, StreamReader, StreamReaderExt};
pub use store::{Store, StoreConfig, StoreWriter, StoreWriterExt, StreamOptions};
