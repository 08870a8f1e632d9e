//! Primitives shared by stores, readers and datasets: errors, time,
//! envelopes, on-disk record layout and segment files.

pub mod cancel;
pub mod clock;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod header;
pub mod interval;
pub mod meta;
pub mod segment;

pub use cancel::CancellationToken;
pub use clock::{Clock, StepClock, SystemClock};
pub use codec::StoreFormat;
pub use envelope::Envelope;
pub use error::{EntityKind, Error, Result};
pub use interval::TimeInterval;
