// sitecopy/src/restore/db_restore.rs
use std::path::Path;
use tracing::{info, warn};

use crate::errors::{Result, SnapshotError};
use crate::session::LocalStore;

pub const DATABASE_CHARSET: &str = "utf8";
pub const DATABASE_COLLATION: &str = "utf8_general_ci";

/// Schemas the MySQL server itself owns. Never dropped or replaced.
const SYSTEM_SCHEMAS: [&str; 4] = ["mysql", "information_schema", "performance_schema", "sys"];

/// Backtick-quotes a MySQL identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Fails when `db_name` is a server system schema, or exists locally and
/// dropping it was not opted into.
pub async fn ensure_replace_allowed(
    store: &mut dyn LocalStore,
    db_name: &str,
    drop_existing: bool,
) -> Result<()> {
    if SYSTEM_SCHEMAS.iter().any(|s| db_name.eq_ignore_ascii_case(s)) {
        return Err(SnapshotError::Restore(format!(
            "Local database '{}' is a critical system database. Restoring into it is not allowed.",
            db_name
        )));
    }

    let exists = store.database_exists(db_name).await.map_err(|e| {
        SnapshotError::Restore(format!("Failed to check existence of database '{}': {}", db_name, e))
    })?;

    if exists && !drop_existing {
        return Err(SnapshotError::Restore(format!(
            "Local database '{}' already exists and 'drop_existing_database' is false. \
             Set it to true in the local_database section to replace it.",
            db_name
        )));
    }
    if exists {
        warn!("⚠️  Local database '{}' exists and will be DROPPED and recreated", db_name);
    }
    Ok(())
}

async fn read_sql_file(path: &Path, log_context: &str) -> Result<String> {
    if !path.exists() {
        return Err(SnapshotError::Restore(format!(
            "SQL file for {} restoration not found: {}",
            log_context,
            path.display()
        )));
    }
    tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::InvalidData => SnapshotError::Restore(format!(
            "{} SQL file {} is not valid UTF-8; binary column data must be dumped as hex (mysqldump --hex-blob)",
            log_context,
            path.display()
        )),
        _ => SnapshotError::Restore(format!(
            "Failed to read {} SQL file {}: {}",
            log_context,
            path.display(),
            e
        )),
    })
}

async fn execute(store: &mut dyn LocalStore, sql: &str, log_context: &str) -> Result<()> {
    store.execute_batch(sql).await.map_err(|e| {
        SnapshotError::Restore(format!("Executing {} failed: {}", log_context, e))
    })
}

/// Replaces the local database with the downloaded dump: drop, recreate with
/// a fixed charset, select it, replay the schema batch (when there is one),
/// replay the data batch, commit.
pub async fn reimport(
    store: &mut dyn LocalStore,
    schema_sql_path: Option<&Path>,
    data_sql_path: &Path,
    db_name: &str,
    drop_existing: bool,
) -> Result<()> {
    // Read both files before touching the database.
    let schema_sql = match schema_sql_path {
        Some(path) => Some(read_sql_file(path, "schema").await?),
        None => None,
    };
    let data_sql = read_sql_file(data_sql_path, "data").await?;

    ensure_replace_allowed(store, db_name, drop_existing).await?;

    let quoted = quote_identifier(db_name);
    info!("Recreating local database {}", quoted);
    execute(store, &format!("DROP DATABASE IF EXISTS {}", quoted), "drop database").await?;
    execute(
        store,
        &format!(
            "CREATE DATABASE {} CHARACTER SET {} COLLATE {}",
            quoted, DATABASE_CHARSET, DATABASE_COLLATION
        ),
        "create database",
    )
    .await?;
    execute(store, &format!("USE {}", quoted), "select database").await?;

    if let Some(sql) = schema_sql {
        info!("Restoring schema into {}", quoted);
        execute(store, &sql, "schema batch").await?;
        info!("✓ Schema restored");
    }

    info!("Restoring data into {}", quoted);
    execute(store, &data_sql, "data batch").await?;
    store.commit().await.map_err(|e| {
        SnapshotError::Restore(format!("Commit of restored data failed: {}", e))
    })?;

    info!("✅ Database {} restored", quoted);
    Ok(())
}
