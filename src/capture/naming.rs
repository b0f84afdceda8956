// sitecopy/src/capture/naming.rs
use chrono::NaiveDate;
use tracing::info;

use crate::config::FilesConfig;
use crate::errors::{Result, SnapshotError};
use crate::session::RemoteSession;
use crate::snapshot::{remote_path, ARCHIVE_EXTENSION};

const MAX_SUFFIX_INDEX: u32 = 9999;

/// Picks the base name for today's snapshot: `{YYYYMMDD}-{filemask}`, or
/// `{YYYYMMDD}-{filemask}-{n}` with the smallest `n >= 1` whose archive does
/// not already exist in the remote archive directory.
pub async fn resolve_base_name(
    files: &FilesConfig,
    session: &mut dyn RemoteSession,
    date: NaiveDate,
) -> Result<String> {
    let stem = format!("{}-{}", date.format("%Y%m%d"), files.filemask);

    let mut candidate = stem.clone();
    let mut index = 0;
    loop {
        let archive = remote_path(
            &files.remote_archive_dir,
            &format!("{}.{}", candidate, ARCHIVE_EXTENSION),
        );
        let taken = session.exists(&archive).await.map_err(|e| {
            SnapshotError::RemoteCommand(format!("Failed to probe {}: {}", archive, e))
        })?;
        if !taken {
            info!("🏷  Snapshot name: {}", candidate);
            return Ok(candidate);
        }

        index += 1;
        if index > MAX_SUFFIX_INDEX {
            return Err(SnapshotError::RemoteCommand(format!(
                "No free snapshot name for {} in {} after {} attempts",
                stem, files.remote_archive_dir, MAX_SUFFIX_INDEX
            )));
        }
        info!("File {} exists, trying next index: {}", archive, index);
        candidate = format!("{}-{}", stem, index);
    }
}
