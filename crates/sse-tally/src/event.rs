// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Event records and the line parser that produces them.
//!
//! A line is either an SSE data field (`data: {...}`) or a bare JSON object:
//!
//! ```text
//! data: {"device":"xbox_360","sev":"success","title":"narcos","country":"CA","time":1515445354000}
//! ```

use std::borrow::Cow;

use derive_more::Display;
use serde::Deserialize;
use ustr::{ustr, Ustr};

use crate::constants::{ERROR_SEVERITY, SSE_DATA_PREFIX, SUCCESS_SEVERITY};
use crate::errors::ParseError;

/// Outcome classification of an event. Only [`Severity::Success`] is counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    Success,
    Error,
    /// Any other value seen on the wire. The value itself is not kept.
    Unknown,
}

impl Severity {
    pub fn from_wire(value: &str) -> Self {
        match value {
            SUCCESS_SEVERITY => Severity::Success,
            ERROR_SEVERITY => Severity::Error,
            _ => Severity::Unknown,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Severity::Success)
    }
}

/// One ingested occurrence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Event {
    pub severity: Severity,
    pub device: Ustr,
    pub title: Ustr,
    pub country: Ustr,
}

impl Event {
    pub fn new(severity: Severity, device: &str, title: &str, country: &str) -> Self {
        Event {
            severity,
            device: ustr(device),
            title: ustr(title),
            country: ustr(country),
        }
    }

    pub fn key(&self) -> GroupingKey {
        GroupingKey {
            device: self.device,
            title: self.title,
            country: self.country,
        }
    }
}

/// Composite (device, title, country) key events are counted under.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[display("{device}/{title}/{country}")]
pub struct GroupingKey {
    pub device: Ustr,
    pub title: Ustr,
    pub country: Ustr,
}

impl GroupingKey {
    pub fn new(device: &str, title: &str, country: &str) -> Self {
        GroupingKey {
            device: ustr(device),
            title: ustr(title),
            country: ustr(country),
        }
    }
}

#[derive(Deserialize)]
struct WireEvent<'a> {
    #[serde(borrow)]
    sev: Cow<'a, str>,
    #[serde(borrow)]
    device: Cow<'a, str>,
    #[serde(borrow)]
    title: Cow<'a, str>,
    #[serde(borrow)]
    country: Cow<'a, str>,
}

/// Parses one raw line into an [`Event`].
///
/// Blank lines, SSE comments (`:`) and SSE fields other than `data` yield
/// [`ParseError::NotData`]. Unknown JSON fields are ignored.
pub fn parse(line: &str) -> Result<Event, ParseError> {
    let line = line.trim();
    let payload = if let Some(rest) = line.strip_prefix(SSE_DATA_PREFIX) {
        rest.trim_start()
    } else if line.starts_with('{') {
        line
    } else {
        return Err(ParseError::NotData);
    };
    if payload.is_empty() {
        return Err(ParseError::NotData);
    }

    let wire: WireEvent<'_> = serde_json::from_str(payload)?;
    Ok(Event::new(
        Severity::from_wire(&wire.sev),
        &wire.device,
        &wire.title,
        &wire.country,
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_data_line() {
        let event = parse(
            r#"data: {"device":"xbox_360","sev":"success","title":"narcos","country":"CA","time":1515445354000}"#,
        )
        .unwrap();
        assert_eq!(event.severity, Severity::Success);
        assert_eq!(event.key(), GroupingKey::new("xbox_360", "narcos", "CA"));
    }

    #[test]
    fn test_parse_bare_json() {
        let event =
            parse(r#"{"device":"ps3","sev":"error","title":"orange is the new black","country":"IND"}"#)
                .unwrap();
        assert_eq!(event.severity, Severity::Error);
        assert_eq!(event.title.as_str(), "orange is the new black");
    }

    #[test]
    fn test_parse_unknown_severity() {
        let event =
            parse(r#"data: {"device":"roku","sev":"warn","title":"ozark","country":"US"}"#).unwrap();
        assert_eq!(event.severity, Severity::Unknown);
        assert!(!event.severity.is_success());
    }

    #[test]
    fn test_unknown_severities_are_not_interned() {
        let wire = "sev-value-that-only-appears-once";
        let line = format!(
            r#"data: {{"device":"roku","sev":"{}","title":"ozark","country":"US"}}"#,
            wire
        );
        let event = parse(&line).unwrap();
        assert_eq!(event.severity, Severity::Unknown);
        assert!(Ustr::from_existing(wire).is_none());
    }

    #[test]
    fn test_parse_escaped_strings() {
        let event = parse(
            r#"data: {"device":"appletv","sev":"success","title":"the \"crown\"","country":"UK"}"#,
        )
        .unwrap();
        assert_eq!(event.title.as_str(), "the \"crown\"");
    }

    #[test]
    fn test_parse_skips_non_data_lines() {
        for line in ["", "   ", ": keep-alive", "event: message", "id: 42", "retry: 1000", "data:"] {
            assert!(
                matches!(parse(line), Err(ParseError::NotData)),
                "line {:?} should not be data",
                line
            );
        }
    }

    #[test]
    fn test_parse_rejects_malformed_payload() {
        assert!(matches!(parse("data: {not json"), Err(ParseError::Json(_))));
        assert!(matches!(
            parse(r#"data: {"device":"ps4","sev":"success","title":"dark"}"#),
            Err(ParseError::Json(_))
        ));
    }

    #[test]
    fn test_grouping_key_equality() {
        let a = GroupingKey::new("ps4", "dark", "DE");
        assert_eq!(a, GroupingKey::new("ps4", "dark", "DE"));
        assert_ne!(a, GroupingKey::new("ps3", "dark", "DE"));
        assert_ne!(a, GroupingKey::new("ps4", "ozark", "DE"));
        assert_ne!(a, GroupingKey::new("ps4", "dark", "FR"));
        assert_eq!(a.to_string(), "ps4/dark/DE");
    }
}
