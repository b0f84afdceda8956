// sitecopy/src/cleanup/mod.rs
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::capture::command::remove_files_command;
use crate::capture::logic::run_checked;
use crate::errors::{Result, SnapshotError};
use crate::session::{RemoteSession, SessionHandles};
use crate::snapshot::{ArtifactKind, ArtifactSet};

/// Deletes the run's remote dumps, and the remote file archive too unless
/// `keep_archive` is set.
pub async fn purge_remote(
    artifacts: &ArtifactSet,
    archive_dir: &str,
    keep_archive: bool,
    session: &mut dyn RemoteSession,
) -> Result<()> {
    let doomed: Vec<String> = artifacts
        .iter()
        .filter(|a| !(keep_archive && a.kind == ArtifactKind::FileArchive))
        .map(|a| a.remote_path(archive_dir))
        .collect();

    info!("🧹 Clearing remote artifacts: {:?}", doomed);
    let command = remove_files_command(doomed.iter().map(String::as_str));
    run_checked(session, &command, "cleanup")
        .await
        .map_err(|e| SnapshotError::Cleanup(e.to_string()))?;

    if keep_archive {
        if let Some(archive) = artifacts.get(ArtifactKind::FileArchive) {
            info!("Keeping remote archive {}", archive.remote_path(archive_dir));
        }
    }
    Ok(())
}

/// Deletes local copies of every artifact, compressed and decompressed.
/// Does nothing unless the decompressed data dump is present, which only
/// happens once the full artifact set arrived.
pub fn purge_local(artifacts: &ArtifactSet, local_tmp: &Path) -> Result<()> {
    let sentinel = artifacts
        .get(ArtifactKind::DataDump)
        .and_then(|a| a.plain_local_path(local_tmp));
    match &sentinel {
        Some(path) if path.is_file() => {}
        _ => {
            info!(
                "Local temp directory {} holds no complete artifact set; leaving it alone",
                local_tmp.display()
            );
            return Ok(());
        }
    }

    info!("🧹 Clearing local artifacts in {}", local_tmp.display());
    let mut candidates: Vec<PathBuf> = Vec::new();
    for artifact in artifacts.iter() {
        candidates.push(artifact.local_path(local_tmp));
        candidates.extend(artifact.plain_local_path(local_tmp));
    }

    let mut failures = Vec::new();
    for path in candidates {
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => failures.push(format!("{}: {}", path.display(), e)),
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(SnapshotError::Cleanup(format!(
            "Failed to delete local artifacts: {}",
            failures.join("; ")
        )))
    }
}

/// Closes every handle still held. Each slot is emptied before its close
/// runs, so a handle is never closed twice. All handles are attempted even
/// when one fails to close.
pub async fn release(handles: &mut SessionHandles) -> Result<()> {
    if handles.is_empty() {
        return Ok(());
    }
    let mut failures = Vec::new();

    if let Some(mut channel) = handles.channel.take() {
        if let Err(e) = channel.close().await {
            failures.push(format!("file channel: {}", e));
        }
    }
    if let Some(mut session) = handles.session.take() {
        if let Err(e) = session.close().await {
            failures.push(format!("remote session: {}", e));
        }
    }
    if let Some(mut store) = handles.store.take() {
        if let Err(e) = store.close().await {
            failures.push(format!("local database: {}", e));
        }
    }

    if failures.is_empty() {
        info!("Handles released");
        Ok(())
    } else {
        let message = failures.join("; ");
        warn!("Some handles failed to close: {}", message);
        Err(SnapshotError::Cleanup(message))
    }
}
