// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use sse_tally::errors::SourceError;

/// Errors that can occur when running the tally services
#[derive(Debug, thiserror::Error)]
pub enum ServicesError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to open event source: {0}")]
    Source(#[from] SourceError),

    #[error("Services did not start in time")]
    StartTimeout,
}
