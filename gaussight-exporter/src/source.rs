//! The database seam: anything that can run SQL and return decoded rows.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use gaussight_common::{Charset, DbValue};

use crate::version::DatabaseVersion;

/// Errors talking to the database.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Cannot decode column {column}: {message}")]
    Decode { column: String, message: String },
}

/// Rows returned by one statement, with the statement's column names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<DbValue>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<DbValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Static facts about the monitored server.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServerInfo {
    /// Full `version()` string.
    pub raw_version: String,
    /// Parsed version, when recognized.
    pub version: Option<DatabaseVersion>,
    pub client_encoding: String,
    pub in_recovery: bool,
    /// Database the exporter is connected to.
    pub database: String,
    /// Server-side encoding of each database.
    #[serde(skip)]
    pub charsets: Vec<(String, Charset)>,
}

/// A database the exporter can scrape.
#[async_trait]
pub trait QuerySource: Send + Sync + 'static {
    /// `host:port` of the target, used as the `server` label.
    fn address(&self) -> &str;

    /// Run one statement and return all of its rows.
    async fn query(&self, sql: &str) -> Result<ResultSet, SourceError>;

    /// Check that the target is reachable.
    async fn ping(&self) -> Result<(), SourceError>;

    /// Discover version, recovery state and database encodings.
    async fn server_info(&self) -> Result<ServerInfo, SourceError>;
}
