// sitecopy/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SSH_PASSWORD_ENV: &str = "SITECOPY_SSH_PASSWORD";
pub const REMOTE_DB_PASSWORD_ENV: &str = "SITECOPY_REMOTE_DB_PASSWORD";
pub const LOCAL_DB_PASSWORD_ENV: &str = "SITECOPY_LOCAL_DB_PASSWORD";

const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_MYSQL_PORT: u16 = 3306;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct JsonFilesConfig {
    pub remote_root: Option<String>,
    pub remote_archive_dir: Option<String>,
    pub filemask: Option<String>,
    pub local_files_path: Option<PathBuf>,
    pub local_tmp_path: Option<PathBuf>,
    #[serde(default)]
    pub excluded_folders: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonSshConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonDatabaseConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub excluded_tables: Vec<String>,
    #[serde(default)]
    pub drop_existing_database: bool,
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonRunOptions {
    pub include_schema_dump: Option<bool>,
    pub keep_remote_archive: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub files: Option<JsonFilesConfig>,
    pub ssh: Option<JsonSshConfig>,
    pub remote_database: Option<JsonDatabaseConfig>,
    pub local_database: Option<JsonDatabaseConfig>,
    #[serde(default)]
    pub options: JsonRunOptions,
}

// Validated run configuration
#[derive(Debug, Clone)]
pub struct FilesConfig {
    pub remote_root: String,
    pub remote_archive_dir: String,
    pub filemask: String,
    pub local_files_path: PathBuf,
    pub local_tmp_path: PathBuf,
    pub excluded_folders: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RemoteDatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub name: String,
    pub excluded_tables: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LocalDatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub name: String,
    /// Opt-in for discarding an existing local database of the same name.
    pub drop_existing_database: bool,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub include_schema_dump: bool,
    pub keep_remote_archive: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            include_schema_dump: true,
            keep_remote_archive: false,
        }
    }
}

/// Everything a snapshot run needs, loaded once and never mutated.
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub files: FilesConfig,
    pub ssh: SshConfig,
    pub remote_database: RemoteDatabaseConfig,
    pub local_database: LocalDatabaseConfig,
    pub options: RunOptions,
}

impl RunConfiguration {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;

        Self::from_raw(raw_json_config, |key| std::env::var(key).ok())
    }

    /// Validates a parsed config. `env` supplies secrets missing from the file.
    pub fn from_raw<F>(raw: RawJsonConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let files = raw.files.context("'files' section must be set in config.json")?;
        let ssh = raw.ssh.context("'ssh' section must be set in config.json")?;
        let remote_db = raw
            .remote_database
            .context("'remote_database' section must be set in config.json")?;
        let local_db = raw
            .local_database
            .context("'local_database' section must be set in config.json")?;

        let files = load_files_config(files)?;

        let ssh = SshConfig {
            host: required(ssh.host, "ssh.host")?,
            port: ssh.port.unwrap_or(DEFAULT_SSH_PORT),
            user: required(ssh.user, "ssh.user")?,
            password: secret(ssh.password, SSH_PASSWORD_ENV, &env),
            identity_file: ssh.identity_file,
            connect_timeout: Duration::from_secs(
                ssh.connect_timeout_secs.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
        };

        let remote_database = RemoteDatabaseConfig {
            host: remote_db.host.unwrap_or_else(|| "localhost".to_string()),
            port: remote_db.port.unwrap_or(DEFAULT_MYSQL_PORT),
            user: required(remote_db.user, "remote_database.user")?,
            password: secret(remote_db.password, REMOTE_DB_PASSWORD_ENV, &env),
            name: required(remote_db.name, "remote_database.name")?,
            excluded_tables: normalize_names(remote_db.excluded_tables, "remote_database.excluded_tables")?,
        };

        if !local_db.excluded_tables.is_empty() {
            anyhow::bail!("local_database.excluded_tables is not supported; exclude tables on remote_database");
        }
        let local_database = LocalDatabaseConfig {
            host: local_db.host.unwrap_or_else(|| "localhost".to_string()),
            port: local_db.port.unwrap_or(DEFAULT_MYSQL_PORT),
            user: required(local_db.user, "local_database.user")?,
            password: secret(local_db.password, LOCAL_DB_PASSWORD_ENV, &env),
            name: required(local_db.name, "local_database.name")?,
            drop_existing_database: local_db.drop_existing_database,
            connect_timeout: Duration::from_secs(
                local_db.connect_timeout_secs.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
            ),
        };

        let defaults = RunOptions::default();
        let options = RunOptions {
            include_schema_dump: raw
                .options
                .include_schema_dump
                .unwrap_or(defaults.include_schema_dump),
            keep_remote_archive: raw
                .options
                .keep_remote_archive
                .unwrap_or(defaults.keep_remote_archive),
        };

        Ok(RunConfiguration {
            files,
            ssh,
            remote_database,
            local_database,
            options,
        })
    }
}

fn load_files_config(files: JsonFilesConfig) -> Result<FilesConfig> {
    let remote_root = required(files.remote_root, "files.remote_root")?;
    let remote_archive_dir = required(files.remote_archive_dir, "files.remote_archive_dir")?;
    for (key, path) in [
        ("files.remote_root", &remote_root),
        ("files.remote_archive_dir", &remote_archive_dir),
    ] {
        if !path.starts_with('/') {
            anyhow::bail!("{} must be an absolute path on the remote host, got '{}'", key, path);
        }
    }

    let filemask = required(files.filemask, "files.filemask")?;
    if filemask.contains('/') {
        anyhow::bail!("files.filemask must not contain '/', got '{}'", filemask);
    }

    let local_files_path = resolve_local(files.local_files_path, "files.local_files_path")?;
    let local_tmp_path = resolve_local(files.local_tmp_path, "files.local_tmp_path")?;

    Ok(FilesConfig {
        remote_root: trim_remote_dir(&remote_root),
        remote_archive_dir: trim_remote_dir(&remote_archive_dir),
        filemask,
        local_files_path,
        local_tmp_path,
        excluded_folders: normalize_names(files.excluded_folders, "files.excluded_folders")?,
    })
}

fn trim_remote_dir(path: &str) -> String {
    match path.trim_end_matches('/') {
        "" => "/".to_string(),
        trimmed => trimmed.to_string(),
    }
}

fn required(value: Option<String>, key: &str) -> Result<String> {
    let value = value.with_context(|| format!("{} must be set in config.json", key))?;
    if value.trim().is_empty() {
        anyhow::bail!("{} cannot be empty in config.json.", key);
    }
    Ok(value.trim().to_string())
}

fn resolve_local(path: Option<PathBuf>, key: &str) -> Result<PathBuf> {
    let path = path.with_context(|| format!("{} must be set in config.json", key))?;
    if path.as_os_str().is_empty() {
        anyhow::bail!("{} cannot be empty in config.json.", key);
    }
    std::path::absolute(&path).with_context(|| format!("Failed to resolve {} ({})", key, path.display()))
}

fn secret<F>(value: Option<String>, env_key: &str, env: &F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    value.or_else(|| env(env_key)).filter(|s| !s.is_empty())
}

/// Trims entries, drops blanks and duplicates while keeping the configured order.
fn normalize_names(names: Vec<String>, key: &str) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim().to_string();
        if name.is_empty() {
            continue;
        }
        if name.contains('\0') {
            anyhow::bail!("{} entry contains a NUL byte", key);
        }
        if !out.contains(&name) {
            out.push(name);
        }
    }
    Ok(out)
}
