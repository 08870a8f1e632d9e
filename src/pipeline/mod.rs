//! Minimal compute context used by derived partitions.
//!
//! A [`Pipeline`] owns a set of importers (input stores) and replays them as
//! one stream merged by originating time. Importer callbacks typically post
//! derived messages through an [`Emitter`] of an [`Exporter`].

pub mod exporter;
pub mod importer;
pub mod merge;

use std::sync::MutexGuard;
use std::time::Instant;

pub use exporter::{Emitter, Exporter};
pub use importer::Importer;
pub use merge::{FanIn, MergedRecord};

use crate::core::{CancellationToken, Error, Result, TimeInterval};
use crate::reader::{
    ReplayDescriptor, ReplayStats, SharedReader, StreamReader, Subscriptions, PROGRESS_EVERY,
};

type CompletionHandler = Box<dyn FnOnce(&ReplayStats) -> anyhow::Result<()> + Send>;

pub struct Pipeline {
    name: String,
    proposed: TimeInterval,
    sources: Vec<SharedReader>,
    on_completion: Vec<CompletionHandler>,
}

impl Pipeline {
    pub fn create(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            proposed: TimeInterval::EMPTY,
            sources: Vec::new(),
            on_completion: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Widens the range this pipeline will replay.
    pub fn propose_replay_time(&mut self, interval: TimeInterval) {
        self.proposed = self.proposed.union(&interval);
    }

    pub fn proposed_replay_time(&self) -> TimeInterval {
        self.proposed
    }

    /// Registers a reader as an input of the next [`run`](Pipeline::run).
    pub fn attach(&mut self, reader: SharedReader) {
        self.sources.push(reader);
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Runs once after a replay completes without error or cancellation.
    pub fn on_completion<F>(&mut self, handler: F)
    where
        F: FnOnce(&ReplayStats) -> anyhow::Result<()> + Send + 'static,
    {
        self.on_completion.push(Box::new(handler));
    }

    /// Replay range: the requested range clipped to the proposed one. With no
    /// proposals the requested range is used as is.
    pub fn effective_interval(&self, replay: ReplayDescriptor) -> TimeInterval {
        if self.proposed.is_empty() {
            replay.interval
        } else {
            replay.interval.intersect(&self.proposed)
        }
    }

    /// Replays every attached reader, merged by originating time, through the
    /// subscriptions registered on them.
    pub fn run(&mut self, replay: ReplayDescriptor, cancel: &CancellationToken) -> Result<ReplayStats> {
        let interval = self.effective_interval(replay);
        log::debug!(
            "pipeline '{}' replaying {} sources over {}",
            self.name,
            self.sources.len(),
            interval
        );

        let mut guards: Vec<MutexGuard<'_, Box<dyn StreamReader>>> = self
            .sources
            .iter()
            .map(|reader| reader.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
            .collect();
        let mut subscriptions: Vec<Subscriptions> = guards
            .iter_mut()
            .map(|guard| std::mem::take(guard.subscriptions_mut()))
            .collect();

        let result = {
            let readers = guards.iter_mut().map(|guard| &mut **guard).collect();
            replay_merged(&self.name, FanIn::new(readers), &mut subscriptions, interval, cancel)
        };

        for (guard, restored) in guards.iter_mut().zip(subscriptions) {
            *guard.subscriptions_mut() = restored;
        }
        drop(guards);

        let stats = result?;
        for handler in self.on_completion.drain(..) {
            handler(&stats).map_err(Error::from_user)?;
        }
        Ok(stats)
    }
}

fn replay_merged(
    name: &str,
    mut fan_in: FanIn<'_>,
    subscriptions: &mut [Subscriptions],
    interval: TimeInterval,
    cancel: &CancellationToken,
) -> Result<ReplayStats> {
    let start = Instant::now();
    let mut stats = ReplayStats::default();
    fan_in.rewind()?;
    for subs in subscriptions.iter_mut() {
        subs.reset();
    }

    loop {
        cancel.check()?;
        let Some(MergedRecord { source, record }) = fan_in.next()? else {
            break;
        };
        stats.messages_read += 1;
        if !interval.contains(record.envelope.originating_time) {
            stats.messages_filtered += 1;
            continue;
        }
        stats.messages_delivered += subscriptions[source].dispatch(fan_in.reader(source), &record)?;

        if stats.messages_read % PROGRESS_EVERY == 0 {
            let elapsed = start.elapsed().as_secs_f64();
            log::info!(
                "pipeline '{}' processed {} msgs ({:.0} msg/sec)",
                name,
                stats.messages_read,
                stats.messages_read as f64 / elapsed
            );
        }
    }

    stats.duration = start.elapsed();
    Ok(stats)
}
