//! Error types for dbdock

use thiserror::Error;

/// Result type for dbdock operations
pub type Result<T> = std::result::Result<T, DbdockError>;

/// dbdock error types
#[derive(Error, Debug)]
pub enum DbdockError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid image reference '{reference}': {message}")]
    InvalidReference { reference: String, message: String },

    #[error("Container engine error: {0}")]
    Engine(String),

    #[error("Container engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Image not found: {0}")]
    ImageNotFound(String),

    #[error("Image pull failed: {0}")]
    ImagePull(String),

    #[error("Container error: {0}")]
    Container(String),

    #[error("Container not found: {0}")]
    ContainerNotFound(String),

    #[error("Container already running: {0}")]
    ContainerAlreadyRunning(String),

    #[error("Container not running: {0}")]
    ContainerNotRunning(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User already exists: {0}")]
    DuplicateUser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse failure class, used by the CLI to pick an exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    EngineFailure,
    Timeout,
    ValidationFailure,
    Config,
}

impl DbdockError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbdockError::InvalidArgument(_) | DbdockError::InvalidReference { .. } => {
                ErrorKind::InvalidArgument
            }
            DbdockError::Engine(_)
            | DbdockError::EngineUnavailable(_)
            | DbdockError::ImageNotFound(_)
            | DbdockError::ImagePull(_)
            | DbdockError::Container(_)
            | DbdockError::ContainerNotFound(_)
            | DbdockError::ContainerAlreadyRunning(_)
            | DbdockError::ContainerNotRunning(_)
            | DbdockError::Network(_) => ErrorKind::EngineFailure,
            DbdockError::Timeout(_) => ErrorKind::Timeout,
            DbdockError::Validation(_)
            | DbdockError::UserNotFound(_)
            | DbdockError::DuplicateUser(_) => ErrorKind::ValidationFailure,
            DbdockError::Io(_) | DbdockError::Yaml(_) | DbdockError::InvalidConfig(_) => {
                ErrorKind::Config
            }
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self.kind() {
            ErrorKind::InvalidArgument => 2,
            ErrorKind::EngineFailure => 3,
            ErrorKind::Timeout => 4,
            ErrorKind::ValidationFailure => 5,
            ErrorKind::Config => 6,
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        DbdockError::InvalidArgument(message.into())
    }
}

/// Reject an empty argument
pub(crate) fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(DbdockError::invalid_argument(format!("{} must not be empty", what)));
    }
    Ok(())
}
