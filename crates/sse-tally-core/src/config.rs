// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::ServicesError;
use sse_tally::constants::DEFAULT_FLUSH_INTERVAL_SECS;
use std::env;
use std::str::FromStr;

/// How aggregation cycles are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One info log line per record
    Log,
    /// One JSON object per record on stdout
    Json,
}

impl FromStr for OutputFormat {
    type Err = ServicesError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "log" => Ok(OutputFormat::Log),
            "json" => Ok(OutputFormat::Json),
            other => Err(ServicesError::InvalidConfig(format!(
                "Invalid output '{}'. Must be one of: log, json",
                other
            ))),
        }
    }
}

/// Configuration for the ingestion and aggregation services
#[derive(Debug, Clone)]
pub struct ServicesConfig {
    /// Event source: `-` for stdin, an http(s) URL, or a file path
    pub source: String,
    /// Maximum number of buffered events, 0 for unbounded
    pub buffer_capacity: usize,
    /// Whether producers wait for a drain when the buffer is full
    pub backpressure: bool,
    /// Seconds between two aggregation cycles
    pub flush_interval_secs: u64,
    /// Where cycle output goes
    pub output: OutputFormat,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            source: "-".to_string(),
            buffer_capacity: 0,
            backpressure: true,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            output: OutputFormat::Log,
            log_level: "info".to_string(),
        }
    }
}

impl ServicesConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ServicesError> {
        let source = env::var("SSE_TALLY_SOURCE").unwrap_or_else(|_| "-".to_string());
        // Anything that is not a number, "unbounded" included, leaves the buffer unbounded
        let buffer_capacity = env::var("SSE_TALLY_BUFFER_CAPACITY")
            .ok()
            .and_then(|capacity| capacity.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let backpressure = env::var("SSE_TALLY_BACKPRESSURE")
            .map(|val| val.to_lowercase() != "false")
            .unwrap_or(true);
        let flush_interval_secs = env::var("SSE_TALLY_FLUSH_INTERVAL_SECS")
            .ok()
            .and_then(|secs| secs.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_FLUSH_INTERVAL_SECS);
        let output = match env::var("SSE_TALLY_OUTPUT") {
            Ok(val) => val.parse()?,
            Err(_) => OutputFormat::Log,
        };
        let log_level = env::var("SSE_TALLY_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());

        let config = Self {
            source,
            buffer_capacity,
            backpressure,
            flush_interval_secs,
            output,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ServicesError> {
        if self.source.trim().is_empty() {
            return Err(ServicesError::InvalidConfig(
                "SSE_TALLY_SOURCE cannot be empty".to_string(),
            ));
        }

        if self.flush_interval_secs == 0 {
            return Err(ServicesError::InvalidConfig(
                "Flush interval must be greater than 0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ServicesError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}
