//! Database connection management.

use surrealdb::Surreal;
use surrealdb::engine::any::{Any, connect as connect_any};
use surrealdb::opt::auth::Root;
use thiserror::Error;

use crate::schema::init_schema;

/// Database connection wrapper.
pub type Database = Surreal<Any>;

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Connection endpoint: "mem://", "file://path", "rocksdb://path" or a remote "ws://host:port"
    pub endpoint: String,
    /// Namespace to use
    pub namespace: String,
    /// Database name to use
    pub database: String,
    /// Optional root credentials for authentication
    pub credentials: Option<(String, String)>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".to_string(),
            namespace: "raster".to_string(),
            database: "jobs".to_string(),
            credentials: None,
        }
    }
}

impl DbConfig {
    /// Create a config for in-memory testing.
    pub fn memory() -> Self {
        Self::default()
    }

    /// Create a config for file-based persistence.
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            endpoint: format!("file://{}", path.into()),
            ..Default::default()
        }
    }

    /// Create a config for RocksDB persistence (requires rocksdb feature).
    pub fn rocksdb(path: impl Into<String>) -> Self {
        Self {
            endpoint: format!("rocksdb://{}", path.into()),
            ..Default::default()
        }
    }

    /// Build a config from environment variables.
    ///
    /// - `SURREAL_ENDPOINT` (default: `mem://`)
    /// - `SURREAL_NAMESPACE` (default: `raster`)
    /// - `SURREAL_DATABASE` (default: `jobs`)
    /// - `SURREAL_USER` / `SURREAL_PASS` (optional; both or neither)
    pub fn from_env() -> Result<Self, DbError> {
        let defaults = Self::default();
        let var = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let credentials = match (var("SURREAL_USER"), var("SURREAL_PASS")) {
            (Some(user), Some(pass)) => Some((user, pass)),
            (None, None) => None,
            _ => {
                return Err(DbError::InvalidConfig(
                    "SURREAL_USER and SURREAL_PASS must be set together".into(),
                ));
            }
        };

        Ok(Self {
            endpoint: var("SURREAL_ENDPOINT").unwrap_or(defaults.endpoint),
            namespace: var("SURREAL_NAMESPACE").unwrap_or(defaults.namespace),
            database: var("SURREAL_DATABASE").unwrap_or(defaults.database),
            credentials,
        })
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set root credentials for authentication.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }
}

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("invalid database config: {0}")]
    InvalidConfig(String),
    #[error("Connection error: {0}")]
    Connection(#[from] surrealdb::Error),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DbError {
    /// Whether the error may clear up on its own, so the operation is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Unavailable(_) => true,
            DbError::Connection(surrealdb::Error::Api(_)) => true,
            _ => false,
        }
    }
}

/// Open a connection and make sure the schema exists.
pub async fn connect(config: &DbConfig) -> Result<Database, DbError> {
    tracing::info!("Connecting to database: {}", config.endpoint);

    let db = connect_any(config.endpoint.as_str()).await?;

    // Authenticate if credentials provided
    if let Some((username, password)) = &config.credentials {
        db.signin(Root { username, password }).await?;
    }

    // Select namespace and database
    db.use_ns(config.namespace.as_str())
        .use_db(config.database.as_str())
        .await?;

    init_schema(&db).await?;

    tracing::info!(
        "Connected to database: {}/{}",
        config.namespace,
        config.database
    );

    Ok(db)
}
