use thiserror::Error;

/// Failure of a snapshot run, tagged with the stage that produced it.
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Remote command failed: {0}")]
    RemoteCommand(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Restore failed: {0}")]
    Restore(String),

    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    #[error("Interrupted: {0}")]
    Interrupted(String),
}

impl SnapshotError {
    /// True when the run never got past loading its configuration.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SnapshotError::Configuration(_))
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, SnapshotError::Interrupted(_))
    }
}

pub type Result<T> = std::result::Result<T, SnapshotError>;
