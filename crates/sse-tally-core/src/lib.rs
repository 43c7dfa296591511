// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod config;
pub mod error;
pub mod services;

pub use config::{OutputFormat, ServicesConfig};
pub use error::ServicesError;
pub use services::{ServiceStatus, ServicesHandle, TallyServices};
