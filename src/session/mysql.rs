// sitecopy/src/session/mysql.rs
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Executor};
use tokio::time::timeout;
use tracing::info;

use super::{LocalStore, StoreError};
use crate::config::LocalDatabaseConfig;

/// Local MySQL server connection. Connects without selecting a database,
/// since the restore creates its target database itself.
pub struct MySqlStore {
    conn: Option<MySqlConnection>,
}

impl MySqlStore {
    pub async fn connect(config: &LocalDatabaseConfig) -> Result<Self, StoreError> {
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .charset("utf8mb4");
        if let Some(password) = &config.password {
            options = options.password(password);
        }

        info!("🔌 Connecting to local MySQL at {}:{}", config.host, config.port);
        let mut conn = timeout(config.connect_timeout, MySqlConnection::connect_with(&options))
            .await
            .map_err(|_| StoreError::Timeout {
                host: config.host.clone(),
                secs: config.connect_timeout.as_secs(),
            })??;

        // Keep data statements inside one transaction closed by `commit`.
        conn.execute("SET autocommit = 0").await?;

        Ok(MySqlStore { conn: Some(conn) })
    }

    fn conn(&mut self) -> Result<&mut MySqlConnection, StoreError> {
        self.conn.as_mut().ok_or(StoreError::Closed)
    }
}

#[async_trait]
impl LocalStore for MySqlStore {
    async fn execute_batch(&mut self, sql: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        // A plain &str goes over the text protocol, which accepts several
        // statements in one round trip.
        conn.execute(sql)
            .await
            .map_err(|e| StoreError::Statement(e.to_string()))?;
        Ok(())
    }

    async fn database_exists(&mut self, name: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?",
        )
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
        Ok(count > 0)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.execute("COMMIT").await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        if let Some(conn) = self.conn.take() {
            conn.close().await?;
        }
        Ok(())
    }
}
