use crate::query::{BmiDistributionRow, BmiQuery};
use crate::secrets::DbCredentials;
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("connection to database timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("connection already closed")]
    Closed,
    #[error(transparent)]
    Driver(#[from] sqlx::Error),
}

/// Opens one private connection per request.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError>;
}

#[async_trait]
pub trait StoreConnection: Send {
    /// Runs the query and drains its cursor. The cursor is released before
    /// this returns, on success and on error.
    async fn fetch_distribution(
        &mut self,
        query: &BmiQuery,
    ) -> Result<Vec<BmiDistributionRow>, StoreError>;

    /// Closes the connection. Calling it more than once is a no-op.
    async fn close(&mut self) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct ConnectSettings {
    pub host: String,
    pub user: String,
    pub password: String,
    pub database: String,
    // Defaults to 3306 when unset.
    pub port: Option<u16>,
    pub connect_timeout: Duration,
}

impl ConnectSettings {
    pub fn new(creds: &DbCredentials, connect_timeout: Duration) -> Self {
        ConnectSettings {
            host: creds.host.clone(),
            user: creds.username.clone(),
            password: creds.password.clone(),
            database: creds.dbname.clone(),
            port: None,
            connect_timeout,
        }
    }

    fn options(&self) -> MySqlConnectOptions {
        let opts = MySqlConnectOptions::new()
            .host(&self.host)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database);
        match self.port {
            Some(port) => opts.port(port),
            None => opts,
        }
    }
}

pub struct MySqlConnector {
    settings: ConnectSettings,
}

impl MySqlConnector {
    pub fn new(settings: ConnectSettings) -> Self {
        MySqlConnector { settings }
    }
}

#[async_trait]
impl Connector for MySqlConnector {
    async fn connect(&self) -> Result<Box<dyn StoreConnection>, StoreError> {
        let timeout = self.settings.connect_timeout;
        let conn = tokio::time::timeout(
            timeout,
            MySqlConnection::connect_with(&self.settings.options()),
        )
        .await
        .map_err(|_| StoreError::ConnectTimeout(timeout))??;
        debug!(host = %self.settings.host, "Opened database connection");
        Ok(Box::new(MySqlStoreConnection { conn: Some(conn) }))
    }
}

struct MySqlStoreConnection {
    // Taken on close; dropping the socket unclosed is the fallback when the
    // request future is cancelled.
    conn: Option<MySqlConnection>,
}

#[async_trait]
impl StoreConnection for MySqlStoreConnection {
    async fn fetch_distribution(
        &mut self,
        query: &BmiQuery,
    ) -> Result<Vec<BmiDistributionRow>, StoreError> {
        let conn = self.conn.as_mut().ok_or(StoreError::Closed)?;

        let mut statement = sqlx::query_as::<_, BmiDistributionRow>(&query.sql);
        for param in &query.params {
            statement = statement.bind(*param);
        }

        let mut rows = Vec::new();
        let mut cursor = statement.fetch(&mut *conn);
        while let Some(row) = cursor.try_next().await? {
            rows.push(row);
        }
        drop(cursor);
        debug!(rows = rows.len(), "Fetched distribution rows");
        Ok(rows)
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        match self.conn.take() {
            Some(conn) => Ok(conn.close().await?),
            None => Ok(()),
        }
    }
}
