// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::{
    config::{OutputFormat, ServicesConfig},
    error::ServicesError,
};
use sse_tally::{
    aggregator::Aggregator,
    buffer::{Capacity, EventBuffer},
    ingest::Ingestor,
    reporter::{JsonLinesSink, ReportSink, TracingSink},
    source::{LineReader, Source},
};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

const START_POLL_INTERVAL: Duration = Duration::from_millis(10);
const START_POLL_ATTEMPTS: usize = 500;

/// Status of the tally services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Services are starting up.
    Starting,
    /// Services are running normally.
    Running,
    /// Services are shutting down.
    Stopping,
    /// Services have stopped.
    Stopped,
}

/// Handle to the running tally services.
///
/// This handle allows checking the status and stopping the services.
#[derive(Debug, Clone)]
pub struct ServicesHandle {
    status: Arc<RwLock<ServiceStatus>>,
    status_tx: broadcast::Sender<ServiceStatus>,
    shutdown_tx: broadcast::Sender<()>,
    source_exhausted: CancellationToken,
    stopped: CancellationToken,
}

impl ServicesHandle {
    /// Check if the services are currently running.
    pub async fn is_running(&self) -> bool {
        matches!(*self.status.read().await, ServiceStatus::Running)
    }

    /// Get a receiver for status updates.
    pub fn status_receiver(&self) -> broadcast::Receiver<ServiceStatus> {
        self.status_tx.subscribe()
    }

    /// Resolves once the event source has ended or ingestion has stopped.
    pub async fn source_exhausted(&self) {
        self.source_exhausted.cancelled().await;
    }

    /// Resolves once the final aggregation cycle has been reported.
    pub async fn stopped(&self) {
        self.stopped.cancelled().await;
    }

    /// Stop the services.
    pub async fn stop(&self) -> Result<(), ServicesError> {
        let mut status = self.status.write().await;
        if matches!(*status, ServiceStatus::Stopping | ServiceStatus::Stopped) {
            return Ok(());
        }

        *status = ServiceStatus::Stopping;
        drop(status);

        // Signal shutdown
        let _ = self.shutdown_tx.send(());

        Ok(())
    }
}

/// Ingestion and aggregation services coordinator.
///
/// Owns one event buffer fed by an [`Ingestor`] and drained by an [`Aggregator`] on every
/// flush interval.
pub struct TallyServices {
    config: ServicesConfig,
    sink: Arc<dyn ReportSink>,
}

impl TallyServices {
    /// Create a new TallyServices instance reporting to the sink named by the config.
    pub fn new(config: ServicesConfig) -> Self {
        let sink: Arc<dyn ReportSink> = match config.output {
            OutputFormat::Log => Arc::new(TracingSink),
            OutputFormat::Json => Arc::new(JsonLinesSink::new(std::io::stdout())),
        };
        Self::with_sink(config, sink)
    }

    /// Create a new TallyServices instance reporting to `sink`.
    pub fn with_sink(config: ServicesConfig, sink: Arc<dyn ReportSink>) -> Self {
        Self { config, sink }
    }

    /// Start the services.
    ///
    /// Opens the event source, then spawns ingestion and the flush loop. Returns a handle
    /// that can be used to monitor and control the services.
    pub async fn start(self) -> Result<ServicesHandle, ServicesError> {
        self.config.validate()?;

        let source = Source::parse(&self.config.source);
        let reader = source.open().await?;
        info!("Reading events from {}", source);

        let status = Arc::new(RwLock::new(ServiceStatus::Starting));
        let (status_tx, _status_rx) = broadcast::channel(16);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(16);

        let handle = ServicesHandle {
            status: Arc::clone(&status),
            status_tx: status_tx.clone(),
            shutdown_tx,
            source_exhausted: CancellationToken::new(),
            stopped: CancellationToken::new(),
        };

        // Spawn the main services task
        let status_clone = Arc::clone(&status);
        let source_exhausted = handle.source_exhausted.clone();
        let stopped = handle.stopped.clone();
        let config = self.config;
        let sink = self.sink;
        tokio::spawn(async move {
            run_services(
                config,
                reader,
                sink,
                Arc::clone(&status_clone),
                shutdown_rx,
                status_tx.clone(),
                source_exhausted,
            )
            .await;
            // Ensure we mark as stopped on any exit path
            *status_clone.write().await = ServiceStatus::Stopped;
            let _ = status_tx.send(ServiceStatus::Stopped);
            stopped.cancel();
        });

        // Wait for services to reach Running state
        let mut poll = interval(START_POLL_INTERVAL);
        for _ in 0..START_POLL_ATTEMPTS {
            poll.tick().await;
            if *status.read().await != ServiceStatus::Starting {
                return Ok(handle);
            }
        }

        Err(ServicesError::StartTimeout)
    }
}

async fn run_services(
    config: ServicesConfig,
    reader: LineReader,
    sink: Arc<dyn ReportSink>,
    status: Arc<RwLock<ServiceStatus>>,
    mut shutdown_rx: broadcast::Receiver<()>,
    status_tx: broadcast::Sender<ServiceStatus>,
    source_exhausted: CancellationToken,
) {
    let buffer = Arc::new(EventBuffer::new(
        Capacity::from_limit(config.buffer_capacity),
        config.backpressure,
    ));
    let aggregator = Aggregator::new(Arc::clone(&buffer));

    debug!(
        "Starting ingestion with capacity {:?}, backpressure {}",
        buffer.capacity(),
        buffer.backpressure()
    );
    let ingest_cancel_token = CancellationToken::new();
    let ingestor = Ingestor::new(Arc::clone(&buffer), ingest_cancel_token.clone());
    let ingest_task = tokio::spawn(async move {
        let result = ingestor.consume(reader).await;
        if let Err(e) = &result {
            error!("Event source failed: {}", e);
        }
        source_exhausted.cancel();
        result
    });

    {
        let mut current = status.write().await;
        if *current == ServiceStatus::Starting {
            *current = ServiceStatus::Running;
        }
    }
    let _ = status_tx.send(ServiceStatus::Running);

    // Flush loop
    let mut flush_interval = interval(Duration::from_secs(config.flush_interval_secs));
    flush_interval.tick().await; // discard first tick

    loop {
        tokio::select! {
            _ = flush_interval.tick() => {
                debug!("Running aggregation cycle");
                flush_cycle(&aggregator, sink.as_ref());
            }
            _ = shutdown_rx.recv() => {
                info!("Shutting down services");
                let _ = status_tx.send(ServiceStatus::Stopping);

                ingest_cancel_token.cancel();
                buffer.close();
                match ingest_task.await {
                    Ok(Ok(stats)) => info!(
                        "Ingested {} events ({} malformed, {} rejected)",
                        stats.ingested, stats.malformed, stats.rejected
                    ),
                    Ok(Err(_)) => {}
                    Err(e) => error!("Ingestion task failed: {}", e),
                }

                // Final flush
                debug!("Final aggregation cycle");
                flush_cycle(&aggregator, sink.as_ref());
                break;
            }
        }
    }
}

/// Runs one aggregation cycle. A failed cycle is logged and its snapshot dropped; the
/// buffer stays usable, so the next tick simply retries.
fn flush_cycle(aggregator: &Aggregator, sink: &dyn ReportSink) -> bool {
    match aggregator.aggregate_and_report(sink) {
        Ok(_) => true,
        Err(e) => {
            error!("Aggregation cycle failed, retrying on next flush: {}", e);
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sse_tally::reporter::MemorySink;
    use std::io::Write;

    const LINES: &str = r#"data: {"device":"xbox_360","sev":"success","title":"narcos","country":"CA"}
data: {"device":"xbox_360","sev":"success","title":"narcos","country":"CA"}
data: {"device":"ps3","sev":"error","title":"orange is the new black","country":"IND"}
"#;

    fn file_config(file: &tempfile::NamedTempFile) -> ServicesConfig {
        ServicesConfig {
            source: file.path().display().to_string(),
            flush_interval_secs: 3600,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_final_cycle_on_stop() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LINES.as_bytes()).unwrap();

        let sink = Arc::new(MemorySink::default());
        let services = TallyServices::with_sink(file_config(&file), sink.clone());
        let handle = services.start().await.unwrap();
        assert!(handle.is_running().await);

        handle.source_exhausted().await;
        handle.stop().await.unwrap();
        handle.stopped().await;

        assert!(!handle.is_running().await);
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].device, "xbox_360");
        assert_eq!(records[0].count, 2);
        assert_eq!(sink.stats()[0].processed, 3);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let sink = Arc::new(MemorySink::default());
        let handle = TallyServices::with_sink(file_config(&file), sink.clone())
            .start()
            .await
            .unwrap();

        let mut status_rx = handle.status_receiver();
        handle.stop().await.unwrap();
        handle.stop().await.unwrap();
        handle.stopped().await;

        assert_eq!(status_rx.recv().await.unwrap(), ServiceStatus::Stopping);
        assert_eq!(status_rx.recv().await.unwrap(), ServiceStatus::Stopped);
        assert!(sink.records().is_empty());
        assert!(sink.stats().is_empty());
    }

    #[test]
    fn test_flush_cycle_reports_each_cycle() {
        let buffer = Arc::new(EventBuffer::unbounded());
        let aggregator = Aggregator::new(Arc::clone(&buffer));
        let sink = MemorySink::default();

        assert!(flush_cycle(&aggregator, &sink));
        assert!(sink.stats().is_empty());

        for line in LINES.lines() {
            buffer.try_add(sse_tally::event::parse(line).unwrap()).unwrap();
        }
        assert!(flush_cycle(&aggregator, &sink));
        assert!(flush_cycle(&aggregator, &sink));

        assert_eq!(sink.stats().len(), 1);
        assert_eq!(sink.records()[0].count, 2);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_start_fails_on_missing_source() {
        let config = ServicesConfig {
            source: "/nonexistent/sse-tally/events.txt".to_string(),
            ..Default::default()
        };
        let result = TallyServices::new(config).start().await;
        assert!(matches!(result, Err(ServicesError::Source(_))));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let config = ServicesConfig {
            flush_interval_secs: 0,
            ..Default::default()
        };
        let result = TallyServices::new(config).start().await;
        assert!(matches!(result, Err(ServicesError::InvalidConfig(_))));
    }
}
