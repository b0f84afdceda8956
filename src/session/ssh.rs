// sitecopy/src/session/ssh.rs
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info};

use super::{CommandOutput, FileChannel, RemoteSession, TransportError};
use crate::config::SshConfig;
use crate::utils::find_executable;

// sshpass exit status for a rejected password
const SSHPASS_BAD_PASSWORD: i32 = 5;
// ssh reserves 255 for its own failures
const SSH_TRANSPORT_FAILURE: i32 = 255;
// Idle seconds before an orphaned master exits on its own
const MASTER_IDLE_SECS: u64 = 3600;

/// A remote session backed by the system OpenSSH client.
///
/// `connect` authenticates once and leaves a multiplexing master running on
/// a private control socket; every later command and download rides on that
/// master, so credentials are presented exactly once per run.
pub struct OpenSshSession {
    ssh_path: PathBuf,
    scp_path: PathBuf,
    destination: String,
    port: u16,
    client_options: Vec<OsString>,
    control_dir: Option<TempDir>,
}

impl OpenSshSession {
    pub async fn connect(config: &SshConfig) -> Result<Self, TransportError> {
        let ssh_path = find_executable("ssh")?;
        let scp_path = find_executable("scp")?;
        let destination = format!("{}@{}", config.user, config.host);

        let control_dir = tempfile::Builder::new()
            .prefix("sitecopy-ssh-")
            .tempdir()?;
        let control_path = control_dir.path().join("master.sock");
        let master_log = control_dir.path().join("master.log");

        let mut client_options: Vec<OsString> = vec![
            "-o".into(),
            format!("ConnectTimeout={}", config.connect_timeout.as_secs()).into(),
            "-o".into(),
            "StrictHostKeyChecking=accept-new".into(),
            "-o".into(),
            format!("ControlPath={}", control_path.display()).into(),
        ];
        if let Some(identity) = &config.identity_file {
            client_options.push("-i".into());
            client_options.push(identity.clone().into_os_string());
        }

        info!("🔐 Connecting to {} (port {})", destination, config.port);

        let mut master = match &config.password {
            Some(password) => {
                let sshpass = find_executable("sshpass")?;
                let mut cmd = Command::new(sshpass);
                cmd.arg("-e").env("SSHPASS", password).arg(&ssh_path);
                cmd
            }
            None => {
                let mut cmd = Command::new(&ssh_path);
                cmd.args(["-o", "BatchMode=yes"]);
                cmd
            }
        };
        master
            .args(["-M", "-N", "-f"])
            .args(["-o", "ControlMaster=yes", "-o"])
            .arg(format!("ControlPersist={}", MASTER_IDLE_SECS))
            .arg("-E")
            .arg(&master_log)
            .arg("-p")
            .arg(config.port.to_string())
            .args(&client_options)
            .arg(&destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let status = master.status().await?;
        if !status.success() {
            let log = std::fs::read_to_string(&master_log).unwrap_or_default();
            let detail = log.trim().to_string();
            if status.code() == Some(SSHPASS_BAD_PASSWORD) || detail.contains("Permission denied") {
                return Err(TransportError::Auth(destination));
            }
            return Err(TransportError::Connect {
                host: config.host.clone(),
                detail: if detail.is_empty() { status.to_string() } else { detail },
            });
        }

        // Clients only ever talk to the master; never fall back to prompting.
        for option in ["ControlMaster=no", "BatchMode=yes"] {
            client_options.push("-o".into());
            client_options.push(option.into());
        }

        info!("✅ SSH session established with {}", destination);
        Ok(OpenSshSession {
            ssh_path,
            scp_path,
            destination,
            port: config.port,
            client_options,
            control_dir: Some(control_dir),
        })
    }

    fn control_path(&self) -> Option<PathBuf> {
        self.control_dir.as_ref().map(|dir| dir.path().join("master.sock"))
    }
}

#[async_trait]
impl RemoteSession for OpenSshSession {
    async fn execute(&mut self, command: &str) -> Result<CommandOutput, TransportError> {
        if self.control_dir.is_none() {
            return Err(TransportError::Failed("session already closed".to_string()));
        }

        let output = Command::new(&self.ssh_path)
            .arg("-p")
            .arg(self.port.to_string())
            .args(&self.client_options)
            .arg(&self.destination)
            .arg("--")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let exit_status = match output.status.code() {
            Some(SSH_TRANSPORT_FAILURE) | None => {
                return Err(TransportError::Failed(format!(
                    "ssh to {} failed ({}): {}",
                    self.destination,
                    output.status,
                    stderr.trim()
                )));
            }
            Some(code) => code,
        };

        Ok(CommandOutput {
            exit_status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        })
    }

    async fn open_file_channel(&mut self) -> Result<Box<dyn FileChannel>, TransportError> {
        if self.control_dir.is_none() {
            return Err(TransportError::Failed("session already closed".to_string()));
        }
        Ok(Box::new(ScpChannel {
            scp_path: self.scp_path.clone(),
            destination: self.destination.clone(),
            port: self.port,
            client_options: self.client_options.clone(),
            open: true,
        }))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let Some(control_path) = self.control_path() else {
            return Ok(());
        };

        let output = Command::new(&self.ssh_path)
            .args(["-O", "exit"])
            .arg("-o")
            .arg(format!("ControlPath={}", control_path.display()))
            .arg(&self.destination)
            .stdin(Stdio::null())
            .output()
            .await;
        // The control directory goes away even if the master did not answer.
        self.control_dir = None;

        let output = output?;
        if !output.status.success() {
            return Err(TransportError::Failed(format!(
                "failed to stop ssh master for {}: {}",
                self.destination,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!("SSH master for {} stopped", self.destination);
        Ok(())
    }
}

/// File downloads over `scp`, sharing the session's master connection.
pub struct ScpChannel {
    scp_path: PathBuf,
    destination: String,
    port: u16,
    client_options: Vec<OsString>,
    open: bool,
}

#[async_trait]
impl FileChannel for ScpChannel {
    async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Failed("file channel already closed".to_string()));
        }

        let output = Command::new(&self.scp_path)
            .arg("-q")
            .arg("-P")
            .arg(self.port.to_string())
            .args(&self.client_options)
            .arg(format!("{}:{}", self.destination, remote_path))
            .arg(local_path)
            .stdin(Stdio::null())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.contains("No such file") {
                return Err(TransportError::NotFound(remote_path.to_string()));
            }
            return Err(TransportError::Failed(format!(
                "scp of {} failed ({}): {}",
                remote_path, output.status, stderr
            )));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.open = false;
        Ok(())
    }
}
