//! The snapshot run: one forward pass through naming, capture, transfer,
//! restore and cleanup, with handle release guaranteed on every exit path.

use chrono::{Local, NaiveDate};
use std::fmt;
use tracing::{error, info, warn};

use crate::capture::{capture_database, capture_files, resolve_base_name};
use crate::cleanup::{purge_local, purge_remote, release};
use crate::config::RunConfiguration;
use crate::errors::{Result, SnapshotError};
use crate::restore::{decompress, ensure_replace_allowed, extract_files, reimport};
use crate::session::{Connector, LocalStore, SessionHandles};
use crate::snapshot::{ArtifactKind, ArtifactSet, SnapshotIdentity};
use crate::transfer::fetch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Configuring,
    Connecting,
    Naming,
    Capturing,
    Transferring,
    Restoring,
    CleaningUp,
    Failed,
    Closed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Configuring => "configuring",
            PipelineState::Connecting => "connecting",
            PipelineState::Naming => "naming",
            PipelineState::Capturing => "capturing",
            PipelineState::Transferring => "transferring",
            PipelineState::Restoring => "restoring",
            PipelineState::CleaningUp => "cleaning up",
            PipelineState::Failed => "failed",
            PipelineState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// One snapshot run. Built from an already loaded configuration; after
/// [`run`](Pipeline::run) returns the pipeline is `Closed` for good.
pub struct Pipeline {
    config: RunConfiguration,
    run_date: NaiveDate,
    state: PipelineState,
    history: Vec<PipelineState>,
    identity: Option<SnapshotIdentity>,
}

impl Pipeline {
    pub fn new(config: RunConfiguration) -> Self {
        Pipeline {
            config,
            run_date: Local::now().date_naive(),
            state: PipelineState::Configuring,
            history: vec![PipelineState::Configuring],
            identity: None,
        }
    }

    /// Overrides the date stamped into the snapshot name.
    #[cfg(test)]
    pub fn with_run_date(mut self, run_date: NaiveDate) -> Self {
        self.run_date = run_date;
        self
    }

    /// Every state entered so far, in order.
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    pub fn identity(&self) -> Option<&SnapshotIdentity> {
        self.identity.as_ref()
    }

    fn enter(&mut self, next: PipelineState) {
        self.state = next;
        self.history.push(next);
    }

    /// Runs the whole snapshot, stopping early on Ctrl-C. Handles opened
    /// along the way are released before this returns, whatever the outcome.
    pub async fn run(&mut self, connector: &dyn Connector) -> Result<()> {
        self.run_until(connector, interrupt_signal()).await
    }

    /// Like [`run`](Pipeline::run), but abandons the current stage as soon as
    /// `shutdown` completes. Release still runs.
    pub async fn run_until<S>(&mut self, connector: &dyn Connector, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        if self.state != PipelineState::Configuring {
            return Err(SnapshotError::Configuration(format!(
                "pipeline is {}; start a new run with a fresh configuration",
                self.state
            )));
        }

        let mut handles = SessionHandles::default();
        let outcome = tokio::select! {
            outcome = self.drive(connector, &mut handles) => outcome,
            _ = shutdown => Err(SnapshotError::Interrupted(
                "run cancelled before completion".to_string(),
            )),
        };

        if let Err(e) = &outcome {
            error!("❌ Snapshot failed while {}: {}", self.state, e);
            self.enter(PipelineState::Failed);
        }

        // Release problems never change the outcome of the run.
        if let Err(e) = release(&mut handles).await {
            warn!("{}", e);
        }
        self.enter(PipelineState::Closed);
        outcome
    }

    async fn drive(&mut self, connector: &dyn Connector, handles: &mut SessionHandles) -> Result<()> {
        prepare_local_dirs(&self.config)?;

        self.enter(PipelineState::Connecting);
        self.connect(connector, handles).await?;
        let (Some(session), Some(channel), Some(store)) = (
            handles.session.as_deref_mut(),
            handles.channel.as_deref_mut(),
            handles.store.as_deref_mut(),
        ) else {
            return Err(SnapshotError::Connection("handles missing after connect".to_string()));
        };

        // Fail before the long remote work if the restore would be refused anyway.
        let local_db = &self.config.local_database;
        ensure_replace_allowed(store, &local_db.name, local_db.drop_existing_database).await?;

        self.enter(PipelineState::Naming);
        let base_name = resolve_base_name(&self.config.files, session, self.run_date).await?;
        let identity = SnapshotIdentity::new(base_name);
        self.identity = Some(identity.clone());
        let artifacts = ArtifactSet::for_run(&identity, self.config.options.include_schema_dump);

        self.enter(PipelineState::Capturing);
        capture_files(&self.config, &identity, session).await?;
        capture_database(&self.config, &identity, session).await?;

        self.enter(PipelineState::Transferring);
        let files = &self.config.files;
        fetch(&artifacts, &files.remote_archive_dir, session, channel, &files.local_tmp_path).await?;

        self.enter(PipelineState::Restoring);
        self.restore(&artifacts, store).await?;

        self.enter(PipelineState::CleaningUp);
        let files = &self.config.files;
        if let Err(e) = purge_remote(
            &artifacts,
            &files.remote_archive_dir,
            self.config.options.keep_remote_archive,
            session,
        )
        .await
        {
            warn!("⚠️  {}", e);
        }
        if let Err(e) = purge_local(&artifacts, &files.local_tmp_path) {
            warn!("⚠️  {}", e);
        }

        info!("🎉 Snapshot {} restored locally", identity.base_name);
        Ok(())
    }

    async fn connect(&self, connector: &dyn Connector, handles: &mut SessionHandles) -> Result<()> {
        let ssh = &self.config.ssh;
        let session = connector.open_remote(ssh).await.map_err(|e| {
            SnapshotError::Connection(format!("SSH connection to {}@{} failed: {}", ssh.user, ssh.host, e))
        })?;
        let session = handles.session.insert(session);

        let channel = session.open_file_channel().await.map_err(|e| {
            SnapshotError::Connection(format!("Failed to open file transfer channel: {}", e))
        })?;
        handles.channel = Some(channel);

        let local_db = &self.config.local_database;
        let store = connector.open_local(local_db).await.map_err(|e| {
            SnapshotError::Connection(format!(
                "Local MySQL connection to {}:{} failed: {}",
                local_db.host, local_db.port, e
            ))
        })?;
        handles.store = Some(store);
        Ok(())
    }

    async fn restore(&self, artifacts: &ArtifactSet, store: &mut dyn LocalStore) -> Result<()> {
        let files = &self.config.files;
        let tmp = &files.local_tmp_path;

        if let Some(archive) = artifacts.get(ArtifactKind::FileArchive) {
            extract_files(&archive.local_path(tmp), &files.local_files_path)?;
        }

        let schema_sql = match artifacts.get(ArtifactKind::SchemaDump) {
            Some(schema) => Some(decompress(&schema.local_path(tmp))?),
            None => None,
        };
        let data = artifacts.get(ArtifactKind::DataDump).ok_or_else(|| {
            SnapshotError::Restore("artifact set has no data dump".to_string())
        })?;
        let data_sql = decompress(&data.local_path(tmp))?;

        let local_db = &self.config.local_database;
        reimport(
            store,
            schema_sql.as_deref(),
            &data_sql,
            &local_db.name,
            local_db.drop_existing_database,
        )
        .await
    }
}

/// Completes on Ctrl-C. If the handler cannot be installed, never completes.
async fn interrupt_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Ctrl-C handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
    warn!("⚠️  Interrupted, releasing connections...");
}

fn prepare_local_dirs(config: &RunConfiguration) -> Result<()> {
    for dir in [&config.files.local_files_path, &config.files.local_tmp_path] {
        std::fs::create_dir_all(dir).map_err(|e| {
            SnapshotError::Configuration(format!("Failed to create local directory {}: {}", dir.display(), e))
        })?;
    }
    Ok(())
}
