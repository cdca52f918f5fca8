use crate::engine::EngineError;
use crate::session::TransferId;
use std::path::PathBuf;

#[derive(Debug)]
pub enum PersistError {
    EnsureDir {
        path: PathBuf,
        source: std::io::Error,
    },
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    RemoveFile {
        path: PathBuf,
        source: std::io::Error,
    },
    Serialize {
        source: serde_json::Error,
    },
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl std::fmt::Display for PersistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EnsureDir { path, source } => {
                write!(f, "failed to ensure directory '{}': {source}", path.display())
            }
            Self::ReadFile { path, source } => {
                write!(f, "failed to read '{}': {source}", path.display())
            }
            Self::WriteFile { path, source } => {
                write!(f, "failed to write '{}': {source}", path.display())
            }
            Self::Rename { from, to, source } => write!(
                f,
                "failed to rename '{}' to '{}': {source}",
                from.display(),
                to.display()
            ),
            Self::RemoveFile { path, source } => {
                write!(f, "failed to remove '{}': {source}", path.display())
            }
            Self::Serialize { source } => write!(f, "failed to serialize session state: {source}"),
            Self::Parse { path, source } => {
                write!(f, "invalid session state in '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for PersistError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::EnsureDir { source, .. }
            | Self::ReadFile { source, .. }
            | Self::WriteFile { source, .. }
            | Self::Rename { source, .. }
            | Self::RemoveFile { source, .. } => Some(source),
            Self::Serialize { source } | Self::Parse { source, .. } => Some(source),
        }
    }
}

#[derive(Debug)]
pub enum SessionError {
    InvalidSource(String),
    Duplicate(TransferId),
    MetadataTimeout(TransferId),
    Engine(EngineError),
    NotFound(String),
    InvalidArtifactName(String),
    Persist(PersistError),
    ChannelClosed,
    ServiceJoin(tokio::task::JoinError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSource(reason) => write!(f, "invalid magnet link: {reason}"),
            Self::Duplicate(id) => {
                write!(f, "transfer {id} is already being downloaded or has been downloaded")
            }
            Self::MetadataTimeout(id) => write!(f, "metadata fetch timed out for transfer {id}"),
            Self::Engine(source) => write!(f, "{source}"),
            Self::NotFound(what) => write!(f, "{what} not found"),
            Self::InvalidArtifactName(name) => write!(f, "invalid artifact name '{name}'"),
            Self::Persist(source) => write!(f, "{source}"),
            Self::ChannelClosed => write!(f, "session service channel closed"),
            Self::ServiceJoin(source) => write!(f, "session service task join error: {source}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Engine(source) => Some(source),
            Self::Persist(source) => Some(source),
            Self::ServiceJoin(source) => Some(source),
            Self::InvalidSource(_)
            | Self::Duplicate(_)
            | Self::MetadataTimeout(_)
            | Self::NotFound(_)
            | Self::InvalidArtifactName(_)
            | Self::ChannelClosed => None,
        }
    }
}

impl From<EngineError> for SessionError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl From<PersistError> for SessionError {
    fn from(value: PersistError) -> Self {
        Self::Persist(value)
    }
}

impl From<tokio::task::JoinError> for SessionError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::ServiceJoin(value)
    }
}
