// sitecopy/src/transfer/mod.rs
use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::{Result, SnapshotError};
use crate::session::{FileChannel, RemoteSession, TransportError};
use crate::snapshot::ArtifactSet;

/// Downloads every artifact of the run from `archive_dir` into `local_tmp`,
/// keeping file names. Each file is staged under a temporary name and only
/// renamed into place once its download completed; a failed download leaves
/// nothing behind.
pub async fn fetch(
    artifacts: &ArtifactSet,
    archive_dir: &str,
    session: &mut dyn RemoteSession,
    channel: &mut dyn FileChannel,
    local_tmp: &Path,
) -> Result<Vec<PathBuf>> {
    info!("🚚 Transferring artifacts to {}", local_tmp.display());
    tokio::fs::create_dir_all(local_tmp).await.map_err(|e| {
        SnapshotError::Transfer(format!(
            "Failed to create local temp directory {}: {}",
            local_tmp.display(),
            e
        ))
    })?;

    let mut fetched = Vec::new();
    for artifact in artifacts.iter() {
        let remote = artifact.remote_path(archive_dir);
        let present = session.exists(&remote).await.map_err(|e| {
            SnapshotError::Transfer(format!("Failed to check remote artifact {}: {}", remote, e))
        })?;
        if !present {
            return Err(SnapshotError::Transfer(format!(
                "Remote artifact {} is missing",
                remote
            )));
        }

        let destination = artifact.local_path(local_tmp);
        download_atomically(channel, &remote, &destination, local_tmp).await?;
        info!("✓ Downloaded {} to {}", remote, destination.display());
        fetched.push(destination);
    }

    info!("✅ Transfer complete ({} files)", fetched.len());
    Ok(fetched)
}

async fn download_atomically(
    channel: &mut dyn FileChannel,
    remote: &str,
    destination: &Path,
    staging_dir: &Path,
) -> Result<()> {
    let file_name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    // Dropping the TempPath on any early return removes the partial file.
    let staged = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".part")
        .tempfile_in(staging_dir)
        .map_err(|e| {
            SnapshotError::Transfer(format!(
                "Failed to create staging file in {}: {}",
                staging_dir.display(),
                e
            ))
        })?
        .into_temp_path();

    channel.download(remote, &staged).await.map_err(|e| match e {
        TransportError::NotFound(path) => {
            SnapshotError::Transfer(format!("Remote artifact {} is missing", path))
        }
        other => SnapshotError::Transfer(format!("Failed to download {}: {}", remote, other)),
    })?;

    staged.persist(destination).map_err(|e| {
        SnapshotError::Transfer(format!(
            "Failed to move downloaded file into {}: {}",
            destination.display(),
            e
        ))
    })?;
    Ok(())
}
