// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for parsing, buffering, aggregation and event sources.

use crate::event::Event;

/// Why a raw line did not produce an [`Event`].
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Blank lines, comments and non-data fields of an event stream.
    #[error("not a data line")]
    NotData,
    #[error("invalid event payload: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to hand an event to the buffer. Rejected events are returned to the caller.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// The buffer is at capacity and backpressure is disabled.
    #[error("buffer full, event rejected")]
    Full(Event),
    /// The buffer was closed before the event could be inserted.
    #[error("buffer closed, event rejected")]
    Closed(Event),
    /// A thread panicked while holding the buffer lock.
    #[error("buffer lock poisoned")]
    Poisoned,
}

impl BufferError {
    /// Returns the event that was not buffered, if any.
    pub fn into_event(self) -> Option<Event> {
        match self {
            BufferError::Full(event) | BufferError::Closed(event) => Some(event),
            BufferError::Poisoned => None,
        }
    }
}

/// Failure of a whole aggregation cycle.
#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("failed to drain buffer: {0}")]
    Buffer(#[from] BufferError),
    #[error("failed to allocate storage for {0} grouping keys")]
    Allocation(usize),
    /// A previous cycle panicked while holding the cycle lock.
    #[error("aggregation cycle lock poisoned")]
    Poisoned,
}

/// Failure to open an event source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to connect to {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}
