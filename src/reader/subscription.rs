//! Per-stream subscriptions drained during a replay pass.

use serde::{Deserialize, Serialize};

use crate::core::{Envelope, Error, Result};
use crate::reader::{Record, RecordBody, StreamReader};
use crate::store::IndexEntry;

/// Receives the encoded payload of each delivered message.
pub type MessageHandler = Box<dyn FnMut(&[u8], &Envelope) -> anyhow::Result<()> + Send>;

/// Receives the index entry of each delivered message of a large stream.
pub type IndexHandler = Box<dyn FnMut(IndexEntry, &Envelope) -> anyhow::Result<()> + Send>;

/// Which messages of a stream reach its subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Every message.
    #[default]
    Unlimited,
    /// Every Nth message, starting with the Nth.
    Sample { every: u64 },
    /// Drops messages closer than `min_interval_ns` in originating time to
    /// the last delivered one.
    Throttle { min_interval_ns: u64 },
}

#[derive(Debug)]
struct DeliveryGate {
    policy: DeliveryPolicy,
    seen: u64,
    last_delivered: Option<u64>,
}

impl DeliveryGate {
    fn new(policy: DeliveryPolicy) -> Self {
        Self {
            policy,
            seen: 0,
            last_delivered: None,
        }
    }

    fn reset(&mut self) {
        self.seen = 0;
        self.last_delivered = None;
    }

    fn admit(&mut self, originating_time: u64) -> bool {
        self.seen += 1;
        let admitted = match self.policy {
            DeliveryPolicy::Unlimited => true,
            DeliveryPolicy::Sample { every } => every <= 1 || self.seen % every == 0,
            DeliveryPolicy::Throttle { min_interval_ns } => match self.last_delivered {
                None => true,
                Some(last) => originating_time.saturating_sub(last) >= min_interval_ns,
            },
        };
        if admitted {
            self.last_delivered = Some(originating_time);
        }
        admitted
    }
}

enum Handler {
    Message(MessageHandler),
    Index(IndexHandler),
}

struct Subscription {
    stream_id: u32,
    gate: DeliveryGate,
    handler: Handler,
}

/// Subscriptions registered on one reader.
#[derive(Default)]
pub struct Subscriptions {
    entries: Vec<Subscription>,
}

impl Subscriptions {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_subscribed(&self, stream_id: u32) -> bool {
        self.entries.iter().any(|s| s.stream_id == stream_id)
    }

    pub(crate) fn add_message(&mut self, stream_id: u32, policy: DeliveryPolicy, handler: MessageHandler) {
        self.entries.push(Subscription {
            stream_id,
            gate: DeliveryGate::new(policy),
            handler: Handler::Message(handler),
        });
    }

    pub(crate) fn add_index(&mut self, stream_id: u32, policy: DeliveryPolicy, handler: IndexHandler) {
        self.entries.push(Subscription {
            stream_id,
            gate: DeliveryGate::new(policy),
            handler: Handler::Index(handler),
        });
    }

    /// Restarts delivery policies before a new pass.
    pub(crate) fn reset(&mut self) {
        for entry in &mut self.entries {
            entry.gate.reset();
        }
    }

    /// Hands `record` to every matching subscription. Payloads of indexed
    /// records are fetched from `reader` only if a message handler needs them.
    ///
    /// Returns the number of deliveries.
    pub fn dispatch<R: StreamReader + ?Sized>(&mut self, reader: &R, record: &Record) -> Result<u64> {
        let mut fetched: Option<Vec<u8>> = None;
        let mut delivered = 0;
        for entry in self.entries.iter_mut() {
            if entry.stream_id != record.stream_id {
                continue;
            }
            if !entry.gate.admit(record.envelope.originating_time) {
                continue;
            }
            match (&mut entry.handler, &record.body) {
                (Handler::Message(handler), RecordBody::Inline(payload)) => {
                    handler(payload, &record.envelope).map_err(Error::from_user)?;
                }
                (Handler::Message(handler), RecordBody::Indexed(index)) => {
                    if fetched.is_none() {
                        fetched = Some(reader.read_indexed(index)?);
                    }
                    let payload = fetched.as_deref().unwrap_or_default();
                    handler(payload, &record.envelope).map_err(Error::from_user)?;
                }
                (Handler::Index(handler), RecordBody::Indexed(index)) => {
                    handler(*index, &record.envelope).map_err(Error::from_user)?;
                }
                (Handler::Index(_), RecordBody::Inline(_)) => continue,
            }
            delivered += 1;
        }
        Ok(delivered)
    }
}
