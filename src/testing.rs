//! In-memory stand-ins for the remote host and the local MySQL server,
//! plus fixture helpers shared by the unit tests.

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use walkdir::WalkDir;

use crate::config::{
    FilesConfig, LocalDatabaseConfig, RemoteDatabaseConfig, RunConfiguration, RunOptions,
    SshConfig,
};
use crate::session::{
    CommandOutput, Connector, FileChannel, LocalStore, RemoteSession, StoreError, TransportError,
};
use crate::utils::shell::quote;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn sample_config() -> RunConfiguration {
    RunConfiguration {
        files: FilesConfig {
            remote_root: "/srv/www".to_string(),
            remote_archive_dir: "/srv/backups".to_string(),
            filemask: "site".to_string(),
            local_files_path: PathBuf::from("/home/dev/www"),
            local_tmp_path: PathBuf::from("/home/dev/tmp"),
            excluded_folders: vec!["cache".to_string()],
        },
        ssh: SshConfig {
            host: "example.org".to_string(),
            port: 22,
            user: "deploy".to_string(),
            password: None,
            identity_file: None,
            connect_timeout: Duration::from_secs(30),
        },
        remote_database: RemoteDatabaseConfig {
            host: "localhost".to_string(),
            port: 3306,
            user: "prod".to_string(),
            password: Some("s3cret".to_string()),
            name: "shop".to_string(),
            excluded_tables: vec!["sessions".to_string()],
        },
        local_database: LocalDatabaseConfig {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: None,
            name: "shop_dev".to_string(),
            drop_existing_database: false,
            connect_timeout: Duration::from_secs(30),
        },
        options: RunOptions::default(),
    }
}

/// [`sample_config`] with both local paths inside `root`.
pub fn sample_config_in(root: &Path) -> RunConfiguration {
    let mut config = sample_config();
    config.files.local_files_path = root.join("www");
    config.files.local_tmp_path = root.join("tmp");
    config
}

fn unquote(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace(r"'\''", "'"))
}

// ---------------------------------------------------------------------------
// Remote host

#[derive(Default)]
pub struct RemoteState {
    files: BTreeMap<String, Vec<u8>>,
    pub commands: Vec<String>,
    pub downloads: Vec<String>,
    pub session_closes: usize,
    pub channel_closes: usize,
    pub fail_close: bool,
    failures: Vec<(String, i32)>,
    outputs: Vec<(String, Vec<u8>)>,
    archives: Vec<(String, PathBuf)>,
    broken_downloads: Vec<String>,
    stalls: Vec<String>,
}

impl RemoteState {
    pub fn put_file(&mut self, path: &str, bytes: &[u8]) {
        self.files.insert(path.to_string(), bytes.to_vec());
    }

    pub fn remove_file(&mut self, path: &str) {
        self.files.remove(path);
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.keys().cloned().collect()
    }

    /// Any command containing `needle` exits with `exit_status`.
    pub fn fail_commands_containing(&mut self, needle: &str, exit_status: i32) {
        self.failures.push((needle.to_string(), exit_status));
    }

    /// A command naming `path` (quoted) writes `bytes` there, the way a
    /// `tar czf` or `mysqldump | gzip >` would.
    pub fn produce_on_command(&mut self, path: &str, bytes: Vec<u8>) {
        self.outputs.push((path.to_string(), bytes));
    }

    /// A command naming `archive_path` (quoted) packs `source_dir` there,
    /// honouring the command's own `--exclude='…'` words the way `tar` would.
    pub fn archive_on_command(&mut self, archive_path: &str, source_dir: &Path) {
        self.archives.push((archive_path.to_string(), source_dir.to_path_buf()));
    }

    /// Any command containing `needle` never returns.
    pub fn stall_commands_containing(&mut self, needle: &str) {
        self.stalls.push(needle.to_string());
    }

    /// Downloads of `path` write a few bytes and then fail.
    pub fn break_download(&mut self, path: &str) {
        self.broken_downloads.push(path.to_string());
    }

    fn run(&mut self, command: &str) -> CommandOutput {
        self.commands.push(command.to_string());

        if let Some((_, code)) = self.failures.iter().find(|(needle, _)| command.contains(needle.as_str())) {
            return CommandOutput {
                exit_status: *code,
                stdout: String::new(),
                stderr: "simulated failure".to_string(),
            };
        }

        if let Some(rest) = command.strip_prefix("test -e ") {
            let exists = unquote(rest).is_some_and(|path| self.files.contains_key(&path));
            return CommandOutput {
                exit_status: if exists { 0 } else { 1 },
                ..CommandOutput::default()
            };
        }

        if let Some(rest) = command.strip_prefix("rm -f ") {
            for path in rest.split_whitespace().filter_map(unquote) {
                self.files.remove(&path);
            }
            return CommandOutput::default();
        }

        let mut produced: Vec<(String, Vec<u8>)> = self
            .outputs
            .iter()
            .filter(|(path, _)| command.contains(&quote(path)))
            .cloned()
            .collect();
        for (path, source) in &self.archives {
            if command.contains(&quote(path)) {
                let excluded: Vec<String> = command
                    .split_whitespace()
                    .filter_map(|word| word.strip_prefix("--exclude="))
                    .filter_map(unquote)
                    .collect();
                let excluded: Vec<&str> = excluded.iter().map(String::as_str).collect();
                produced.push((path.clone(), tar_gz_dir(source, &excluded)));
            }
        }
        self.files.extend(produced);
        CommandOutput::default()
    }
}

pub struct FakeRemote {
    state: Shared<RemoteState>,
}

impl FakeRemote {
    pub fn new() -> (Self, Shared<RemoteState>) {
        let state: Shared<RemoteState> = Arc::default();
        (FakeRemote { state: state.clone() }, state)
    }

    pub fn channel(&self) -> FakeChannel {
        FakeChannel {
            state: self.state.clone(),
        }
    }
}

#[async_trait]
impl RemoteSession for FakeRemote {
    async fn execute(&mut self, command: &str) -> Result<CommandOutput, TransportError> {
        let (output, stalled) = {
            let mut state = self.state.lock().unwrap();
            let stalled = state.stalls.iter().any(|n| command.contains(n.as_str()));
            (state.run(command), stalled)
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(output)
    }

    async fn open_file_channel(&mut self) -> Result<Box<dyn FileChannel>, TransportError> {
        Ok(Box::new(self.channel()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.session_closes += 1;
        if state.fail_close {
            return Err(TransportError::Failed("master did not answer".to_string()));
        }
        Ok(())
    }
}

pub struct FakeChannel {
    state: Shared<RemoteState>,
}

#[async_trait]
impl FileChannel for FakeChannel {
    async fn download(&mut self, remote_path: &str, local_path: &Path) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state.downloads.push(remote_path.to_string());

        if state.broken_downloads.iter().any(|p| p == remote_path) {
            std::fs::write(local_path, b"partial")?;
            return Err(TransportError::Failed("connection reset".to_string()));
        }
        match state.files.get(remote_path) {
            Some(bytes) => {
                std::fs::write(local_path, bytes)?;
                Ok(())
            }
            None => Err(TransportError::NotFound(remote_path.to_string())),
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.state.lock().unwrap().channel_closes += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Local database

/// Tracks databases and their table names; understands just enough SQL to
/// follow a dump replay.
#[derive(Default)]
pub struct StoreState {
    databases: BTreeMap<String, BTreeSet<String>>,
    current: Option<String>,
    pub executed: Vec<String>,
    pub commits: usize,
    pub closes: usize,
    failures: Vec<String>,
}

fn identifier(word: &str) -> String {
    word.split('(').next().unwrap_or(word).trim_matches('`').replace("``", "`")
}

impl StoreState {
    pub fn seed_database(&mut self, name: &str, tables: &[&str]) {
        self.databases
            .insert(name.to_string(), tables.iter().map(|t| t.to_string()).collect());
    }

    pub fn tables(&self, db: &str) -> Option<Vec<String>> {
        self.databases.get(db).map(|t| t.iter().cloned().collect())
    }

    pub fn fail_batches_containing(&mut self, needle: &str) {
        self.failures.push(needle.to_string());
    }

    fn current_tables(&mut self) -> Result<&mut BTreeSet<String>, StoreError> {
        let db = self
            .current
            .clone()
            .ok_or_else(|| StoreError::Statement("No database selected".to_string()))?;
        self.databases
            .get_mut(&db)
            .ok_or_else(|| StoreError::Statement(format!("Unknown database '{}'", db)))
    }

    fn apply(&mut self, batch: &str) -> Result<(), StoreError> {
        self.executed.push(batch.to_string());
        if let Some(needle) = self.failures.iter().find(|n| batch.contains(n.as_str())) {
            return Err(StoreError::Statement(format!("simulated failure at '{}'", needle)));
        }

        for statement in batch.split(';') {
            let text: Vec<&str> = statement
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect();
            let text = text.join(" ");
            let words: Vec<&str> = text.split_whitespace().collect();
            let upper: Vec<String> = words.iter().map(|w| w.to_ascii_uppercase()).collect();
            let upper: Vec<&str> = upper.iter().map(String::as_str).collect();

            match upper.as_slice() {
                [] => {}
                ["DROP", "DATABASE", "IF", "EXISTS", ..] => {
                    self.databases.remove(&identifier(words[4]));
                }
                ["CREATE", "DATABASE", ..] => {
                    let name = identifier(words[2]);
                    if self.databases.contains_key(&name) {
                        return Err(StoreError::Statement(format!("Database '{}' exists", name)));
                    }
                    self.databases.insert(name, BTreeSet::new());
                }
                ["USE", ..] => {
                    let name = identifier(words[1]);
                    if !self.databases.contains_key(&name) {
                        return Err(StoreError::Statement(format!("Unknown database '{}'", name)));
                    }
                    self.current = Some(name);
                }
                ["CREATE", "TABLE", "IF", "NOT", "EXISTS", ..] => {
                    let name = identifier(words[5]);
                    self.current_tables()?.insert(name);
                }
                ["CREATE", "TABLE", ..] => {
                    let name = identifier(words[2]);
                    self.current_tables()?.insert(name);
                }
                ["DROP", "TABLE", "IF", "EXISTS", ..] => {
                    let name = identifier(words[4]);
                    self.current_tables()?.remove(&name);
                }
                _ => {
                    self.current_tables()?;
                }
            }
        }
        Ok(())
    }
}

pub struct FakeStore {
    state: Shared<StoreState>,
}

impl FakeStore {
    pub fn new() -> (Self, Shared<StoreState>) {
        let state: Shared<StoreState> = Arc::default();
        (FakeStore { state: state.clone() }, state)
    }
}

#[async_trait]
impl LocalStore for FakeStore {
    async fn execute_batch(&mut self, sql: &str) -> Result<(), StoreError> {
        self.state.lock().unwrap().apply(sql)
    }

    async fn database_exists(&mut self, name: &str) -> Result<bool, StoreError> {
        Ok(self.state.lock().unwrap().databases.contains_key(name))
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.state.lock().unwrap().commits += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.state.lock().unwrap().closes += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Connector

pub struct FakeConnector {
    pub remote: Shared<RemoteState>,
    pub store: Shared<StoreState>,
    pub refuse_remote: bool,
    pub refuse_local: bool,
}

impl FakeConnector {
    pub fn new() -> Self {
        FakeConnector {
            remote: Arc::default(),
            store: Arc::default(),
            refuse_remote: false,
            refuse_local: false,
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open_remote(&self, config: &SshConfig) -> Result<Box<dyn RemoteSession>, TransportError> {
        if self.refuse_remote {
            return Err(TransportError::Auth(format!("{}@{}", config.user, config.host)));
        }
        Ok(Box::new(FakeRemote {
            state: self.remote.clone(),
        }))
    }

    async fn open_local(&self, config: &LocalDatabaseConfig) -> Result<Box<dyn LocalStore>, StoreError> {
        if self.refuse_local {
            return Err(StoreError::Timeout {
                host: config.host.clone(),
                secs: config.connect_timeout.as_secs(),
            });
        }
        Ok(Box::new(FakeStore {
            state: self.store.clone(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Fixtures

pub fn gzip_bytes(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Writes `(relative path, contents)` pairs under `root`.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, contents) in files {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
}

/// Relative path -> contents for every file under `root`.
pub fn read_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_string_lossy().into_owned();
            (rel, std::fs::read(e.path()).unwrap())
        })
        .collect()
}

/// Builds a `.tar.gz` of `source_dir` the way `tar czf - -C dir --exclude=x .`
/// would: paths relative to `source_dir`, any entry named in `excluded`
/// skipped together with its subtree.
pub fn tar_gz_dir(source_dir: &Path, excluded: &[&str]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let walker = WalkDir::new(source_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !excluded.iter().any(|x| e.file_name() == *x));
    for entry in walker {
        let entry = entry.unwrap();
        let name = entry.path().strip_prefix(source_dir).unwrap();
        if entry.file_type().is_dir() {
            builder.append_dir(name, entry.path()).unwrap();
        } else {
            builder.append_path_with_name(entry.path(), name).unwrap();
        }
    }

    builder.into_inner().unwrap().finish().unwrap()
}
