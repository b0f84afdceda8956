// sitecopy/src/snapshot.rs
use std::path::{Path, PathBuf};

pub const ARCHIVE_EXTENSION: &str = "tar.gz";
pub const DATA_DUMP_EXTENSION: &str = "sql.gz";
pub const SCHEMA_DUMP_EXTENSION: &str = "schema.sql.gz";

/// Names of everything a run produces, derived from one base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotIdentity {
    pub base_name: String,
    pub archive_file: String,
    pub data_dump_file: String,
    pub schema_dump_file: String,
}

impl SnapshotIdentity {
    pub fn new(base_name: impl Into<String>) -> Self {
        let base_name = base_name.into();
        SnapshotIdentity {
            archive_file: format!("{}.{}", base_name, ARCHIVE_EXTENSION),
            data_dump_file: format!("{}.{}", base_name, DATA_DUMP_EXTENSION),
            schema_dump_file: format!("{}.{}", base_name, SCHEMA_DUMP_EXTENSION),
            base_name,
        }
    }
}

/// Joins a file name onto a remote directory.
pub fn remote_path(dir: &str, file_name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), file_name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    FileArchive,
    DataDump,
    SchemaDump,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub file_name: String,
}

impl Artifact {
    pub fn remote_path(&self, archive_dir: &str) -> String {
        remote_path(archive_dir, &self.file_name)
    }

    pub fn local_path(&self, local_tmp: &Path) -> PathBuf {
        local_tmp.join(&self.file_name)
    }

    /// Where the decompressed SQL lands. `None` for the file archive,
    /// which is unpacked rather than decompressed.
    pub fn plain_local_path(&self, local_tmp: &Path) -> Option<PathBuf> {
        match self.kind {
            ArtifactKind::FileArchive => None,
            ArtifactKind::DataDump | ArtifactKind::SchemaDump => {
                let plain = self.file_name.strip_suffix(".gz").unwrap_or(&self.file_name);
                Some(local_tmp.join(plain))
            }
        }
    }
}

/// The artifacts one run moves from the remote archive directory to the
/// local temp directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    artifacts: Vec<Artifact>,
}

impl ArtifactSet {
    pub fn for_run(identity: &SnapshotIdentity, include_schema_dump: bool) -> Self {
        let mut artifacts = vec![
            Artifact {
                kind: ArtifactKind::FileArchive,
                file_name: identity.archive_file.clone(),
            },
            Artifact {
                kind: ArtifactKind::DataDump,
                file_name: identity.data_dump_file.clone(),
            },
        ];
        if include_schema_dump {
            artifacts.push(Artifact {
                kind: ArtifactKind::SchemaDump,
                file_name: identity.schema_dump_file.clone(),
            });
        }
        ArtifactSet { artifacts }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter()
    }

    pub fn get(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }
}
