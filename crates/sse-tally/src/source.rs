// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Where raw event lines come from: stdin, a file, or an HTTP event stream.

use std::path::PathBuf;

use futures_util::TryStreamExt;
use reqwest::header::ACCEPT;
use tokio::io::{AsyncBufRead, BufReader};
use tokio_util::io::StreamReader;
use tracing::debug;

use crate::constants::SSE_CONTENT_TYPE;
use crate::errors::SourceError;

pub type LineReader = Box<dyn AsyncBufRead + Send + Unpin>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Stdin,
    File(PathBuf),
    Http(String),
}

impl Source {
    /// `-` is stdin, `http://` and `https://` are event streams, anything else is a path.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value == "-" {
            Source::Stdin
        } else if value.starts_with("http://") || value.starts_with("https://") {
            Source::Http(value.to_string())
        } else {
            Source::File(PathBuf::from(value))
        }
    }

    /// A file source ends; stdin and event streams are expected to keep going.
    pub fn is_finite(&self) -> bool {
        matches!(self, Source::File(_))
    }

    pub async fn open(&self) -> Result<LineReader, SourceError> {
        match self {
            Source::Stdin => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
            Source::File(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|source| SourceError::Io {
                        path: path.display().to_string(),
                        source,
                    })?;
                Ok(Box::new(BufReader::new(file)))
            }
            Source::Http(url) => {
                let http_error = |source| SourceError::Http {
                    url: url.clone(),
                    source,
                };
                let response = reqwest::Client::new()
                    .get(url)
                    .header(ACCEPT, SSE_CONTENT_TYPE)
                    .send()
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(http_error)?;
                debug!("Connected to event stream {}", url);
                let body = response.bytes_stream().map_err(std::io::Error::other);
                Ok(Box::new(StreamReader::new(Box::pin(body))))
            }
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Stdin => write!(f, "stdin"),
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Http(url) => write!(f, "{}", url),
        }
    }
}
