// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::envelope::EventType;
use reqwest::StatusCode;

/// Failure to deliver a rendered batch to InfluxDB.
///
/// Every variant is recoverable: the flusher keeps the batch and the next flush retries it.
#[derive(Debug, thiserror::Error)]
pub enum ShippingError {
    /// The server answered with a status outside of `200..300`.
    #[error("InfluxDB request returned HTTP response: {status};\n{body}")]
    Status { status: StatusCode, body: String },

    /// The server answered with a non-success status and the body could not be read.
    #[error("Can't read response body: {status}")]
    Body { status: StatusCode },

    /// No response was received at all (connection refused, timeout, TLS failure).
    #[error("InfluxDB request failed: {0}")]
    Transport(String),
}

impl ShippingError {
    /// HTTP status of the failed write, when the server answered.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } | Self::Body { status } => Some(*status),
            Self::Transport(_) => None,
        }
    }
}

/// Failure to build a write client.
#[derive(Debug, thiserror::Error)]
pub enum CreationError {
    #[error("Invalid InfluxDB URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// An envelope that cannot be turned into an aggregatable event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("{0} envelope is missing its typed payload")]
    MissingPayload(EventType),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Unable to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Unable to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
