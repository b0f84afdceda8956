//! Handles to the two machines a run talks to: the remote host (shell
//! commands plus file downloads) and the local MySQL server.

pub(crate) mod mysql;
pub(crate) mod ssh;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

use crate::config::{LocalDatabaseConfig, SshConfig};
use crate::utils::shell::quote;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} executable not found in PATH. Please ensure the OpenSSH client tools are installed.")]
    MissingTool(String),

    #[error("Authentication failed for {0}")]
    Auth(String),

    #[error("Could not connect to {host}: {detail}")]
    Connect { host: String, detail: String },

    #[error("Remote file not found: {0}")]
    NotFound(String),

    #[error("Transport failure: {0}")]
    Failed(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Timed out after {secs}s connecting to {host}")]
    Timeout { host: String, secs: u64 },

    #[error("Statement batch failed: {0}")]
    Statement(String),

    #[error("Connection already closed")]
    Closed,
}

/// Result of one remote command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

#[async_trait]
pub trait RemoteSession: Send {
    async fn execute(&mut self, command: &str) -> Result<CommandOutput, TransportError>;

    async fn open_file_channel(&mut self) -> Result<Box<dyn FileChannel>, TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;

    /// Structured existence check: `test -e` exits 0 when the path exists
    /// and 1 when it does not. Anything else is a transport failure.
    async fn exists(&mut self, path: &str) -> Result<bool, TransportError> {
        let output = self.execute(&format!("test -e {}", quote(path))).await?;
        match output.exit_status {
            0 => Ok(true),
            1 => Ok(false),
            code => Err(TransportError::Failed(format!(
                "existence check for {} exited with status {}: {}",
                path,
                code,
                output.stderr.trim()
            ))),
        }
    }
}

#[async_trait]
pub trait FileChannel: Send {
    async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait LocalStore: Send {
    /// Runs `sql` as one multi-statement batch.
    async fn execute_batch(&mut self, sql: &str) -> Result<(), StoreError>;

    async fn database_exists(&mut self, name: &str) -> Result<bool, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn close(&mut self) -> Result<(), StoreError>;
}

/// Opens the handles a run needs.
#[async_trait]
pub trait Connector: Sync {
    async fn open_remote(&self, config: &SshConfig) -> Result<Box<dyn RemoteSession>, TransportError>;

    async fn open_local(&self, config: &LocalDatabaseConfig) -> Result<Box<dyn LocalStore>, StoreError>;
}

/// Production connector: system OpenSSH client and a sqlx MySQL connection.
pub struct SystemConnector;

#[async_trait]
impl Connector for SystemConnector {
    async fn open_remote(&self, config: &SshConfig) -> Result<Box<dyn RemoteSession>, TransportError> {
        let session = ssh::OpenSshSession::connect(config).await?;
        Ok(Box::new(session))
    }

    async fn open_local(&self, config: &LocalDatabaseConfig) -> Result<Box<dyn LocalStore>, StoreError> {
        let store = mysql::MySqlStore::connect(config).await?;
        Ok(Box::new(store))
    }
}

/// Every handle a run holds. Owned by the pipeline; each slot is emptied
/// when its handle is closed so nothing is closed twice.
#[derive(Default)]
pub struct SessionHandles {
    pub(crate) session: Option<Box<dyn RemoteSession>>,
    pub(crate) channel: Option<Box<dyn FileChannel>>,
    pub(crate) store: Option<Box<dyn LocalStore>>,
}

impl SessionHandles {
    pub fn is_empty(&self) -> bool {
        self.session.is_none() && self.channel.is_none() && self.store.is_none()
    }
}
