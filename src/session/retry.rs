//! Failure classification and the single-retry policy.

use crate::engine::{EngineError, EngineErrorKind};
use crate::session::{SessionError, TransferId};
use std::time::Duration;

/// A session lineage gets at most this many retries.
pub const MAX_RETRIES: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub backoff: Duration,
    /// Metadata window used for the retried session.
    pub retry_metadata_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff: Duration::from_secs(5),
            retry_metadata_timeout: Duration::from_secs(180),
        }
    }
}

/// Why a session is being torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    MetadataTimeout,
    Engine(EngineError),
}

impl FailureCause {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::MetadataTimeout => true,
            Self::Engine(err) => should_retry(err.kind),
        }
    }

    pub fn into_error(self, id: TransferId) -> SessionError {
        match self {
            Self::MetadataTimeout => SessionError::MetadataTimeout(id),
            Self::Engine(err) => SessionError::Engine(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { after: Duration },
    GiveUp,
}

pub fn should_retry(kind: EngineErrorKind) -> bool {
    matches!(
        kind,
        EngineErrorKind::Metadata
            | EngineErrorKind::Timeout
            | EngineErrorKind::NoPeers
            | EngineErrorKind::Connection
            | EngineErrorKind::Network
    )
}

pub fn decide(retry_count: u8, cause: &FailureCause, policy: &RetryPolicy) -> RetryDecision {
    if retry_count >= MAX_RETRIES || !cause.is_transient() {
        return RetryDecision::GiveUp;
    }
    RetryDecision::Retry {
        after: policy.backoff,
    }
}

/// Keyword fallback for engines that report failures as plain strings.
pub fn classify_message(message: &str) -> EngineErrorKind {
    let msg = message.to_ascii_lowercase();
    if msg.contains("metadata") {
        EngineErrorKind::Metadata
    } else if msg.contains("timeout") || msg.contains("timed out") {
        EngineErrorKind::Timeout
    } else if msg.contains("no peers") || msg.contains("no-peers") {
        EngineErrorKind::NoPeers
    } else if msg.contains("connection") {
        EngineErrorKind::Connection
    } else if msg.contains("network") {
        EngineErrorKind::Network
    } else {
        EngineErrorKind::Other
    }
}
