// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::process::ExitCode;

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use sse_tally::source::Source;
use sse_tally_core::{ServicesConfig, TallyServices};

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = match ServicesConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error reading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let env_filter = format!("h2=off,hyper=off,rustls=off,reqwest=off,{}", config.log_level);

    let subscriber = match EnvFilter::try_new(env_filter) {
        Ok(filter) => tracing_subscriber::fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_level(true)
            .with_thread_names(false)
            .with_thread_ids(false)
            .with_line_number(false)
            .with_file(false)
            .with_target(true)
            .without_time()
            .finish(),
        Err(e) => {
            eprintln!("Could not parse log level in configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    debug!("Logging subsystem enabled");

    let finite_source = Source::parse(&config.source).is_finite();
    let handle = match TallyServices::new(config).start().await {
        Ok(handle) => handle,
        Err(e) => {
            error!("Error starting tally services: {e}");
            return ExitCode::FAILURE;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {e}");
            }
            info!("Received shutdown signal");
        }
        _ = handle.source_exhausted(), if finite_source => {
            info!("Event source exhausted");
        }
    }

    if let Err(e) = handle.stop().await {
        error!("Error stopping tally services: {e}");
        return ExitCode::FAILURE;
    }
    handle.stopped().await;

    ExitCode::SUCCESS
}
