// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Prefix of the data field in a server-sent-events stream.
pub const SSE_DATA_PREFIX: &str = "data:";

/// Media type requested from HTTP event sources.
pub const SSE_CONTENT_TYPE: &str = "text/event-stream";

/// Severity value of events that are counted.
pub const SUCCESS_SEVERITY: &str = "success";

/// Severity value of failed events.
pub const ERROR_SEVERITY: &str = "error";

/// Default period between two aggregation cycles, in seconds.
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 1;
