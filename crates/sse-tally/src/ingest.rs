// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Producer side: turns raw lines into events and pushes them into the buffer.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::buffer::EventBuffer;
use crate::errors::{BufferError, ParseError};
use crate::event::parse;

/// What happened to a single line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineOutcome {
    Ingested,
    /// Blank lines, comments and other non-data stream fields.
    Ignored,
    Malformed,
    /// Buffer full with backpressure disabled.
    Rejected,
    /// The buffer no longer accepts events.
    Closed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub ingested: u64,
    pub ignored: u64,
    pub malformed: u64,
    pub rejected: u64,
}

impl IngestStats {
    fn record(&mut self, outcome: LineOutcome) {
        match outcome {
            LineOutcome::Ingested => self.ingested += 1,
            LineOutcome::Ignored => self.ignored += 1,
            LineOutcome::Malformed => self.malformed += 1,
            LineOutcome::Rejected => self.rejected += 1,
            LineOutcome::Closed => {}
        }
    }
}

pub struct Ingestor {
    buffer: Arc<EventBuffer>,
    cancel_token: CancellationToken,
}

impl Ingestor {
    pub fn new(buffer: Arc<EventBuffer>, cancel_token: CancellationToken) -> Self {
        Ingestor {
            buffer,
            cancel_token,
        }
    }

    /// Parses one line and adds the resulting event, waiting for space when the buffer
    /// applies backpressure.
    pub async fn ingest_line(&self, line: &str) -> LineOutcome {
        let event = match parse(line) {
            Ok(event) => event,
            Err(ParseError::NotData) => return LineOutcome::Ignored,
            Err(e) => {
                debug!("Skipping malformed line {}: {}", line, e);
                return LineOutcome::Malformed;
            }
        };

        match self.buffer.add(event).await {
            Ok(()) => LineOutcome::Ingested,
            Err(BufferError::Full(event)) => {
                trace!("Buffer full, dropped event {:?}", event);
                LineOutcome::Rejected
            }
            Err(BufferError::Closed(_)) => LineOutcome::Closed,
            Err(e) => {
                error!("Failed to add event to buffer: {}", e);
                LineOutcome::Closed
            }
        }
    }

    /// Reads `reader` line by line until it ends, the buffer closes, or the cancel token
    /// fires. Lines that are not valid UTF-8 count as malformed; only I/O errors end the
    /// loop early.
    pub async fn consume<R>(&self, mut reader: R) -> std::io::Result<IngestStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut raw = Vec::new();
        let mut stats = IngestStats::default();

        loop {
            raw.clear();
            let read = tokio::select! {
                read = reader.read_until(b'\n', &mut raw) => read?,
                () = self.cancel_token.cancelled() => {
                    debug!("Ingestion cancelled");
                    break;
                }
            };
            if read == 0 {
                debug!("Event source exhausted");
                break;
            }

            // A line that is not UTF-8 cannot be an event; skip it and keep reading
            let line = match std::str::from_utf8(&raw) {
                Ok(line) => line,
                Err(e) => {
                    debug!("Skipping line that is not valid UTF-8: {}", e);
                    stats.record(LineOutcome::Malformed);
                    continue;
                }
            };

            let outcome = tokio::select! {
                outcome = self.ingest_line(line) => outcome,
                () = self.cancel_token.cancelled() => {
                    debug!("Ingestion cancelled while waiting for buffer space");
                    break;
                }
            };
            if outcome == LineOutcome::Closed {
                debug!("Buffer closed, stopping ingestion");
                break;
            }
            stats.record(outcome);
        }

        debug!(
            "Ingested {} events ({} ignored, {} malformed, {} rejected)",
            stats.ingested, stats.ignored, stats.malformed, stats.rejected
        );
        Ok(stats)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::buffer::Capacity;
    use std::time::Duration;

    const STREAM: &str = r#": hello
event: message
data: {"device":"xbox_360","sev":"success","title":"narcos","country":"CA","time":1}

data: {"device":"ps3","sev":"error","title":"dark","country":"DE","time":2}
data: {"device":"ps3","sev":"success","title":"dark"
data: {"device":"roku","sev":"success","title":"ozark","country":"US","time":3}
"#;

    #[tokio::test]
    async fn test_consume_counts_outcomes() {
        let buffer = Arc::new(EventBuffer::unbounded());
        let ingestor = Ingestor::new(Arc::clone(&buffer), CancellationToken::new());

        let stats = ingestor.consume(STREAM.as_bytes()).await.unwrap();

        assert_eq!(
            stats,
            IngestStats {
                ingested: 3,
                ignored: 3,
                malformed: 1,
                rejected: 0,
            }
        );
        assert_eq!(buffer.len(), 3);
    }

    #[tokio::test]
    async fn test_consume_without_backpressure_rejects_overflow() {
        let buffer = Arc::new(EventBuffer::new(Capacity::from_limit(2), false));
        let ingestor = Ingestor::new(Arc::clone(&buffer), CancellationToken::new());

        let stats = ingestor.consume(STREAM.as_bytes()).await.unwrap();

        assert_eq!(stats.ingested, 2);
        assert_eq!(stats.rejected, 1);
        assert_eq!(buffer.rejected(), 1);
        assert_eq!(buffer.len(), 2);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_waiting_ingestor() {
        let buffer = Arc::new(EventBuffer::new(Capacity::from_limit(1), true));
        let cancel_token = CancellationToken::new();
        let ingestor = Ingestor::new(Arc::clone(&buffer), cancel_token.clone());

        let task = tokio::spawn(async move { ingestor.consume(STREAM.as_bytes()).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());

        cancel_token.cancel();
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.ingested, 1);
        assert_eq!(buffer.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_skipped() {
        let buffer = Arc::new(EventBuffer::unbounded());
        let ingestor = Ingestor::new(Arc::clone(&buffer), CancellationToken::new());

        let mut stream = Vec::new();
        stream.extend_from_slice(
            b"data: {\"device\":\"xbox_360\",\"sev\":\"success\",\"title\":\"narcos\",\"country\":\"CA\"}\n",
        );
        stream.extend_from_slice(b"data: \xff\xfe\n");
        stream.extend_from_slice(
            b"data: {\"device\":\"roku\",\"sev\":\"success\",\"title\":\"ozark\",\"country\":\"US\"}",
        );

        let stats = ingestor.consume(stream.as_slice()).await.unwrap();

        assert_eq!(stats.ingested, 2);
        assert_eq!(stats.malformed, 1);
        let devices: Vec<_> = buffer
            .drain()
            .unwrap()
            .iter()
            .map(|e| e.device.as_str())
            .collect();
        assert_eq!(devices, vec!["xbox_360", "roku"]);
    }

    #[tokio::test]
    async fn test_closed_buffer_stops_ingestion() {
        let buffer = Arc::new(EventBuffer::unbounded());
        buffer.close();
        let ingestor = Ingestor::new(Arc::clone(&buffer), CancellationToken::new());

        let stats = ingestor.consume(STREAM.as_bytes()).await.unwrap();
        assert_eq!(stats.ingested, 0);
        assert!(buffer.is_empty());
    }
}
