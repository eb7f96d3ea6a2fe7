//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Table holding one record per crop job, keyed by job id.
pub const JOB_TABLE: &str = "crop_job";

/// Initialize the database schema.
///
/// This creates all necessary tables and indexes.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(JOB_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job table schema.
///
/// Schemaless because `status` is a tagged union whose fields depend on its variant.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS crop_job SCHEMALESS;

-- Indexes for operational queries over job state
DEFINE INDEX IF NOT EXISTS crop_job_status ON crop_job FIELDS status.status;
DEFINE INDEX IF NOT EXISTS crop_job_created ON crop_job FIELDS created_at;
"#;
