//! Bridge error taxonomy.
//!
//! Every failure a caller can observe is a [`BridgeError`]. Its [`ErrorKind`]
//! decides how the HTTP layer reports it and whether a retry makes sense.

use crate::domain::correlation::CorrelationKey;
use std::time::Duration;

/// Error classes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input or a key already in flight. Never retried by the bridge.
    ClientInput,
    /// Too many requests pending.
    Capacity,
    /// The command could not be handed to the transport.
    Dispatch,
    /// The remote plugin reported a failure.
    Upstream,
    /// No result arrived in time.
    Timeout,
    /// The bridge is not accepting traffic.
    Unavailable,
}

/// Failure observed by a prompt caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// Missing or ill-typed request field
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// The key is already pending
    #[error("correlation key already in flight: {0}")]
    DuplicateKey(CorrelationKey),

    /// Pending table is full
    #[error("too many pending requests (limit {0})")]
    CapacityExceeded(usize),

    /// Send to the execution unit failed
    #[error("dispatch failed: {0}")]
    DispatchFailed(String),

    /// Remote execution failed for this key
    #[error("upstream error: {0}")]
    Upstream(String),

    /// No result before the deadline
    #[error("no result after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Traffic acceptance is still closed
    #[error("bridge is not ready")]
    NotReady,

    /// The pending entry was dropped without a result (shutdown)
    #[error("request cancelled before a result arrived")]
    Cancelled,
}

impl BridgeError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedRequest(_) | Self::DuplicateKey(_) => ErrorKind::ClientInput,
            Self::CapacityExceeded(_) => ErrorKind::Capacity,
            Self::DispatchFailed(_) => ErrorKind::Dispatch,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::NotReady | Self::Cancelled => ErrorKind::Unavailable,
        }
    }

    /// HTTP status reported for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MalformedRequest(_) => 400,
            Self::DuplicateKey(_) => 409,
            Self::CapacityExceeded(_) => 429,
            Self::DispatchFailed(_) | Self::Upstream(_) => 502,
            Self::NotReady | Self::Cancelled => 503,
            Self::Timeout(_) => 504,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedRequest(_) => "malformed_request",
            Self::DuplicateKey(_) => "duplicate_key",
            Self::CapacityExceeded(_) => "capacity_exceeded",
            Self::DispatchFailed(_) => "dispatch_failed",
            Self::Upstream(_) => "upstream_error",
            Self::Timeout(_) => "timeout",
            Self::NotReady => "not_ready",
            Self::Cancelled => "cancelled",
        }
    }

    /// JSON body for HTTP responses.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "kind": self.code(),
                "message": self.to_string(),
            }
        })
    }
}

/// Correlation table failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CorrelationError {
    #[error("correlation key already pending: {0}")]
    DuplicateKey(CorrelationKey),
    #[error("no pending request for correlation key: {0}")]
    UnknownKey(CorrelationKey),
    #[error("pending request limit reached ({0})")]
    CapacityExceeded(usize),
}

impl From<CorrelationError> for BridgeError {
    fn from(e: CorrelationError) -> Self {
        match e {
            CorrelationError::DuplicateKey(key) => BridgeError::DuplicateKey(key),
            CorrelationError::CapacityExceeded(limit) => BridgeError::CapacityExceeded(limit),
            // Only reachable if an entry vanished between register and resolve
            CorrelationError::UnknownKey(_) => BridgeError::Cancelled,
        }
    }
}

/// Service-level errors (startup and serving, not per request)
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Server socket bind error
    #[error("server bind error: {0}")]
    Bind(String),

    /// HTTP server terminated with an error
    #[error("server error: {0}")]
    Serve(String),

    /// Background tasks were already spawned
    #[error("bridge already started")]
    AlreadyStarted,
}
