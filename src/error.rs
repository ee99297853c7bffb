// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for the transport and the journal codec.
//!
//! Errors are split into two families:
//!
//! - [`TransportError`]: faults raised while delivering a [`Command`](crate::Command)
//!   to a peer. These drive the retry/reconnect decisions of
//!   [`FailoverTransport`](crate::FailoverTransport).
//! - [`JournalError`]: faults raised while encoding or decoding a
//!   [`JournalEntry`](crate::JournalEntry).
//!
//! # Transport Error Categories
//!
//! | Error Type | Retryable | Reconnect first | Description |
//! |------------|-----------|-----------------|-------------|
//! | `RequestTimeout` | Yes | No | No response within the attempt timeout |
//! | `Connection` | Yes | Yes | Peer unreachable, connection dropped |
//! | `RequestError` | Yes | Yes | Pre-flight liveness check failed |
//! | `Closed` | Yes | Yes | Transport was stopped |
//! | `RequestInvalid` | No | - | Malformed call arguments |
//!
//! Journal errors are never retried: the caller decides whether to stop
//! scanning or skip the record.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Result type alias for journal codec operations.
pub type JournalResult<T> = std::result::Result<T, JournalError>;

/// Errors raised by a [`Transport`](crate::Transport).
///
/// The classification survives retries: when
/// [`FailoverTransport::sync`](crate::FailoverTransport::sync) gives up, the
/// caller receives the last fault with its original variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No response arrived within the per-attempt timeout.
    ///
    /// Retried on the same connection: a slow peer is not a broken one.
    #[error("Request timeout ({address}) after {}ms", .timeout.as_millis())]
    RequestTimeout { address: SocketAddr, timeout: Duration },

    /// The connection is unreachable or was dropped.
    ///
    /// Triggers reconnect evaluation before the next attempt.
    #[error("Connection error ({address}): {message}")]
    Connection { address: SocketAddr, message: String },

    /// The connection failed its pre-flight liveness check and could not be
    /// replaced. Carries the address of the stale connection.
    #[error("Request error ({address}): connection is not active")]
    RequestError { address: SocketAddr },

    /// Operation attempted on a transport that has been stopped.
    #[error("Transport closed ({address})")]
    Closed { address: SocketAddr },

    /// Malformed call arguments (missing callback, response used as request, ...).
    ///
    /// Reported immediately, never retried.
    #[error("Invalid request: {0}")]
    RequestInvalid(String),
}

impl TransportError {
    /// Create a connection error.
    pub fn connection(address: SocketAddr, message: impl Into<String>) -> Self {
        Self::Connection {
            address,
            message: message.into(),
        }
    }

    /// Create an invalid-request error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::RequestInvalid(message.into())
    }

    /// Whether this fault is an attempt timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }

    /// Whether this fault indicates a broken connection (reconnect candidate).
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::RequestError { .. } | Self::Closed { .. }
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestTimeout { .. } => true,
            Self::Connection { .. } => true,
            Self::RequestError { .. } => true,
            Self::Closed { .. } => true,
            Self::RequestInvalid(_) => false, // Caller bug
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestTimeout { .. } => "timeout",
            Self::Connection { .. } => "connection",
            Self::RequestError { .. } => "request_error",
            Self::Closed { .. } => "closed",
            Self::RequestInvalid(_) => "invalid",
        }
    }
}

/// Errors raised by the [`JournalEntryCodec`](crate::JournalEntryCodec).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JournalError {
    /// The magic marker (or another header field) does not describe a valid
    /// record. When scanning a journal this marks the end of valid data.
    #[error("Corrupt journal entry at offset {offset}: {reason}")]
    Corrupt { offset: usize, reason: String },

    /// Fewer bytes are available than the header declares.
    #[error("Truncated journal entry: expected {expected} bytes, {available} available")]
    Truncated { expected: usize, available: usize },

    /// The entry cannot be represented in the on-disk format.
    #[error("Journal encoding error: {0}")]
    Encoding(String),
}

impl JournalError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Corrupt { .. } => "corrupt",
            Self::Truncated { .. } => "truncated",
            Self::Encoding(_) => "encoding",
        }
    }
}
