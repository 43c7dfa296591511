// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory tally of server-sent events.
//!
//! Producers parse raw event lines and push them into a bounded [`buffer::EventBuffer`].
//! A single consumer, the [`aggregator::Aggregator`], periodically drains the buffer and
//! counts successful events per (device, title, country), handing the result to a
//! [`reporter::ReportSink`].

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregator;
pub mod buffer;
pub mod constants;
pub mod errors;
pub mod event;
pub mod ingest;
pub mod reporter;
pub mod source;
