// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sinks that receive the output of aggregation cycles.

use std::io::Write;
use std::sync::Mutex;

use derive_more::Display;
use serde::Serialize;
use tracing::{error, info};

use crate::aggregator::CycleStats;
use crate::event::GroupingKey;

/// One (device, title, country, count) line of a cycle's output.
#[derive(Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[display("device: {device}, title: {title}, country: {country}, count: {count}")]
pub struct OutputRecord {
    pub device: &'static str,
    pub title: &'static str,
    pub country: &'static str,
    pub count: u64,
}

impl OutputRecord {
    pub fn new(key: &GroupingKey, count: u64) -> Self {
        OutputRecord {
            device: key.device.as_str(),
            title: key.title.as_str(),
            country: key.country.as_str(),
            count,
        }
    }
}

/// Destination of aggregation output. Records of a cycle are emitted first, then its stats.
pub trait ReportSink: Send + Sync {
    fn emit(&self, record: &OutputRecord);

    fn cycle_stats(&self, _stats: CycleStats) {}
}

/// Logs every record at info level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn emit(&self, record: &OutputRecord) {
        info!("{}", record);
    }

    fn cycle_stats(&self, stats: CycleStats) {
        info!(
            "Processed events: {}, counted: {}, buffer size: {}",
            stats.processed, stats.counted, stats.buffered
        );
    }
}

/// Writes every record as one JSON object per line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> Option<W> {
        self.writer.into_inner().ok()
    }

    fn write_line(&self, record: &OutputRecord) -> std::io::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| std::io::Error::other("report writer lock poisoned"))?;
        serde_json::to_writer(&mut *writer, record)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl<W: Write + Send> ReportSink for JsonLinesSink<W> {
    fn emit(&self, record: &OutputRecord) {
        if let Err(e) = self.write_line(record) {
            error!("Failed to write record {}: {}", record, e);
        }
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<OutputRecord>>,
    stats: Mutex<Vec<CycleStats>>,
}

impl MemorySink {
    pub fn records(&self) -> Vec<OutputRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> Vec<CycleStats> {
        self.stats
            .lock()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }
}

impl ReportSink for MemorySink {
    fn emit(&self, record: &OutputRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }

    fn cycle_stats(&self, stats: CycleStats) {
        if let Ok(mut all) = self.stats.lock() {
            all.push(stats);
        }
    }
}
