//! Boundary to the swarm engine that performs the actual peer-to-peer transfer.
//!
//! The session manager only ever talks to the engine through [`SwarmEngine`] and
//! the [`EngineEvent`] channel handed to `start_service`. Engine calls are expected to
//! return quickly (they enqueue work); everything slow happens inside the engine and is
//! reported back as events.

use crate::session::TransferId;
use serde::Serialize;
use std::path::PathBuf;

pub mod memory;

pub use memory::{MemoryEngine, MemoryEngineControl};

/// Options passed to the engine when a transfer is added. Opaque to the manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOptions {
    pub download_dir: PathBuf,
    pub announce: Vec<String>,
    pub max_conns: usize,
    pub max_web_conns: usize,
}

/// Structured failure class reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineErrorKind {
    Metadata,
    Timeout,
    NoPeers,
    Connection,
    Network,
    InvalidTransfer,
    Storage,
    Other,
}

impl EngineErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Timeout => "timeout",
            Self::NoPeers => "no_peers",
            Self::Connection => "connection",
            Self::Network => "network",
            Self::InvalidTransfer => "invalid_transfer",
            Self::Storage => "storage",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub kind: EngineErrorKind,
    pub message: String,
}

impl EngineError {
    pub fn new(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// For engines that only report free-form strings.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: crate::session::retry::classify_message(&message),
            message,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "engine error ({}): {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for EngineError {}

/// What the engine knows about one of its transfers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineTransfer {
    pub id: TransferId,
    pub name: Option<String>,
    pub paused: bool,
    pub done: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    MetadataReady {
        id: TransferId,
        name: String,
        total_bytes: u64,
    },
    Progress {
        id: TransferId,
        downloaded_bytes: u64,
        total_bytes: u64,
        download_rate_bps: u64,
        peer_count: u32,
    },
    Completed {
        id: TransferId,
    },
    Error {
        id: TransferId,
        error: EngineError,
    },
}

impl EngineEvent {
    pub fn id(&self) -> TransferId {
        match self {
            Self::MetadataReady { id, .. }
            | Self::Progress { id, .. }
            | Self::Completed { id }
            | Self::Error { id, .. } => *id,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::MetadataReady { .. } => "metadata_ready",
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Error { .. } => "error",
        }
    }
}

/// Capability interface of the swarm engine.
///
/// The engine's transfer table is the source of truth for whether a transfer exists;
/// the session manager consults [`SwarmEngine::get`] before every add.
pub trait SwarmEngine: Send + 'static {
    fn add(&mut self, source_uri: &str, opts: &AddOptions) -> Result<(), EngineError>;
    fn remove(&mut self, id: TransferId) -> Result<(), EngineError>;
    fn get(&self, id: TransferId) -> Option<EngineTransfer>;
    fn pause(&mut self, id: TransferId) -> Result<(), EngineError>;
    fn resume(&mut self, id: TransferId) -> Result<(), EngineError>;
    fn transfer_count(&self) -> usize;
    /// Release all engine resources. Called once at shutdown.
    fn destroy(&mut self);
}
