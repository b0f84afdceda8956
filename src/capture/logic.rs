// sitecopy/src/capture/logic.rs
use tracing::{debug, info};

use super::command::{archive_files_command, data_dump_command, schema_dump_command, RemoteCommand};
use crate::config::RunConfiguration;
use crate::errors::{Result, SnapshotError};
use crate::session::{CommandOutput, RemoteSession};
use crate::snapshot::{remote_path, SnapshotIdentity};

/// Runs a remote command and treats any non-zero exit as fatal.
pub(crate) async fn run_checked(
    session: &mut dyn RemoteSession,
    command: &RemoteCommand,
    log_context: &str,
) -> Result<CommandOutput> {
    debug!("Remote {}: {}", log_context, command.display());

    let output = session.execute(&command.render()).await.map_err(|e| {
        SnapshotError::RemoteCommand(format!("Failed to run remote {}: {}", log_context, e))
    })?;

    if !output.success() {
        return Err(SnapshotError::RemoteCommand(format!(
            "Remote {} failed with exit status {}.\nStdout: {}\nStderr: {}",
            log_context,
            output.exit_status,
            output.stdout.trim(),
            output.stderr.trim()
        )));
    }
    Ok(output)
}

/// Packs the remote file tree into the run's archive, skipping excluded folders.
pub async fn capture_files(
    config: &RunConfiguration,
    identity: &SnapshotIdentity,
    session: &mut dyn RemoteSession,
) -> Result<()> {
    let files = &config.files;
    let archive = remote_path(&files.remote_archive_dir, &identity.archive_file);
    info!("📦 Packing {} into {}", files.remote_root, archive);
    if !files.excluded_folders.is_empty() {
        info!("Excluding folders: {:?}", files.excluded_folders);
    }

    run_checked(session, &archive_files_command(files, &archive), "file archive").await?;

    info!("✓ All files are packed into {}", archive);
    Ok(())
}

/// Dumps the remote database: schema only (when enabled) and the data dump
/// without excluded tables, each gzipped straight into the archive directory.
pub async fn capture_database(
    config: &RunConfiguration,
    identity: &SnapshotIdentity,
    session: &mut dyn RemoteSession,
) -> Result<()> {
    let db = &config.remote_database;
    let archive_dir = &config.files.remote_archive_dir;

    if config.options.include_schema_dump {
        let target = remote_path(archive_dir, &identity.schema_dump_file);
        info!("🗄  Dumping schema of {} to {}", db.name, target);
        run_checked(session, &schema_dump_command(db, &target), "schema dump").await?;
        info!("✓ Schema dump written");
    }

    let target = remote_path(archive_dir, &identity.data_dump_file);
    info!("🗄  Dumping data of {} to {}", db.name, target);
    if !db.excluded_tables.is_empty() {
        info!("Excluding tables: {:?}", db.excluded_tables);
    }
    run_checked(session, &data_dump_command(db, &target), "data dump").await?;
    info!("✓ Data dump written");
    Ok(())
}
