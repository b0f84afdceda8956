pub mod shell;

use std::path::PathBuf;
use which::which;

use crate::session::TransportError;

/// Finds a client executable (ssh, scp, sshpass) in the system PATH.
pub fn find_executable(name: &str) -> Result<PathBuf, TransportError> {
    which(name).map_err(|_| TransportError::MissingTool(name.to_string()))
}
