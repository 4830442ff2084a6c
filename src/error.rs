use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UglError {
    #[error("error loading registry document {}: {reason}", path.display())]
    LoadFailure { path: PathBuf, reason: String },
    #[error("environment already exists: {0}")]
    AlreadyExists(String),
    #[error("environment not found: {0}")]
    NotFound(String),
    #[error("environment folder does not exist: {}", .0.display())]
    PathMissing(PathBuf),
    #[error("invalid environment name '{0}': it must contain at least one letter, digit or hyphen")]
    InvalidName(String),
    #[error("could not parse command: {0}")]
    CommandParse(String),
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to {action} {}: {source}", path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("config error: {0}")]
    Config(String),
    #[error("process error: {0}")]
    Process(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
}

impl UglError {
    pub(crate) fn fs(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = UglError> = std::result::Result<T, E>;
