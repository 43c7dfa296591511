// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Drain-and-count cycle over an [`EventBuffer`].
//!
//! Each call to [`Aggregator::aggregate`] is one independent cycle: drain the buffer once,
//! count the successful events of that snapshot per [`GroupingKey`], and return the counts.
//! No state survives between cycles.

use std::sync::{Arc, Mutex};

use fnv::FnvBuildHasher;
use serde::Serialize;
use tracing::debug;

use crate::buffer::EventBuffer;
use crate::errors::AggregateError;
use crate::event::{Event, GroupingKey};
use crate::reporter::{OutputRecord, ReportSink};

pub type Counts = hashbrown::HashMap<GroupingKey, u64, FnvBuildHasher>;

/// Observations about one cycle. Not part of the counts themselves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    /// Events in the drained snapshot, whatever their severity.
    pub processed: usize,
    /// Events that contributed to a count.
    pub counted: u64,
    /// Buffer length right after the drain. Non-zero when producers kept adding.
    pub buffered: usize,
}

#[derive(Debug)]
pub struct CycleReport {
    pub counts: Counts,
    pub stats: CycleStats,
}

impl CycleReport {
    /// Output records ordered by key.
    pub fn records(&self) -> Vec<OutputRecord> {
        let mut records: Vec<OutputRecord> = self
            .counts
            .iter()
            .map(|(key, count)| OutputRecord::new(key, *count))
            .collect();
        records.sort_unstable();
        records
    }

    pub fn get(&self, key: &GroupingKey) -> Option<u64> {
        self.counts.get(key).copied()
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

/// Result of one cycle. An empty drain is [`Aggregation::NoData`], never an empty mapping.
#[derive(Debug)]
pub enum Aggregation {
    NoData,
    Counted(CycleReport),
}

impl Aggregation {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            Aggregation::NoData => None,
            Aggregation::Counted(report) => Some(report),
        }
    }

    pub fn into_report(self) -> Option<CycleReport> {
        match self {
            Aggregation::NoData => None,
            Aggregation::Counted(report) => Some(report),
        }
    }
}

pub struct Aggregator {
    buffer: Arc<EventBuffer>,
    // Serializes cycles so that reports come out in drain order.
    cycle: Mutex<()>,
}

impl Aggregator {
    pub fn new(buffer: Arc<EventBuffer>) -> Self {
        Aggregator {
            buffer,
            cycle: Mutex::new(()),
        }
    }

    pub fn buffer(&self) -> &Arc<EventBuffer> {
        &self.buffer
    }

    /// Runs one cycle: drain once, then count successful events by key.
    ///
    /// On error the drained snapshot is discarded; the buffer stays usable and the next
    /// cycle starts from whatever was added since.
    pub fn aggregate(&self) -> Result<Aggregation, AggregateError> {
        let _cycle = self.cycle.lock().map_err(|_| AggregateError::Poisoned)?;

        let snapshot = self.buffer.drain()?;
        if snapshot.is_empty() {
            debug!("No events since last cycle");
            return Ok(Aggregation::NoData);
        }

        let counts = count_successes(&snapshot)?;
        let stats = CycleStats {
            processed: snapshot.len(),
            counted: counts.values().sum(),
            buffered: self.buffer.len(),
        };
        debug!(
            "Processed {} events, {} counted under {} keys, buffer size: {}",
            stats.processed,
            stats.counted,
            counts.len(),
            stats.buffered
        );

        Ok(Aggregation::Counted(CycleReport { counts, stats }))
    }

    /// Runs one cycle and emits its records, then its stats, to `sink`.
    /// A cycle without data emits nothing. Errors are returned to the caller, nothing is
    /// reported for a failed cycle.
    pub fn aggregate_and_report(
        &self,
        sink: &dyn ReportSink,
    ) -> Result<Aggregation, AggregateError> {
        let aggregation = self.aggregate()?;
        if let Some(report) = aggregation.report() {
            for record in report.records() {
                sink.emit(&record);
            }
            sink.cycle_stats(report.stats);
        }
        Ok(aggregation)
    }
}

/// Counts [`Severity::Success`](crate::event::Severity::Success) events per key.
/// Every other severity, unknown ones included, is left out.
///
/// Storage grows with the number of distinct keys, not with the number of events.
pub fn count_successes(events: &[Event]) -> Result<Counts, AggregateError> {
    let mut counts = Counts::default();

    for event in events.iter().filter(|e| e.severity.is_success()) {
        let key = event.key();
        if let Some(count) = counts.get_mut(&key) {
            *count += 1;
            continue;
        }
        counts
            .try_reserve(1)
            .map_err(|_| AggregateError::Allocation(counts.len() + 1))?;
        counts.insert(key, 1);
    }
    Ok(counts)
}
