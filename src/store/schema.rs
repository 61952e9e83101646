//! Table DDL for local databases.
//!
//! Production tables belong to the web application. These definitions only
//! mirror the columns the worker touches, for tests and local runs.

use libsql::Connection;

use crate::error::DatabaseError;
use crate::pipeline::types::Domain;

/// DDL for one domain's data and inspection tables.
pub fn domain_ddl(domain: Domain) -> String {
    let tables = domain.tables();
    format!(
        "CREATE TABLE IF NOT EXISTS {data} (
            id INTEGER PRIMARY KEY,
            title TEXT,
            detail TEXT
        );
        CREATE TABLE IF NOT EXISTS {inspection} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            {fk} INTEGER NOT NULL UNIQUE,
            ai BOOLEAN NOT NULL DEFAULT false,
            inspected BOOLEAN NOT NULL DEFAULT false,
            deleted BOOLEAN NOT NULL DEFAULT false
        );",
        data = tables.data,
        inspection = tables.inspection,
        fk = tables.foreign_key,
    )
}

/// Create every domain's tables if they are missing.
pub async fn ensure_schema(conn: &Connection) -> Result<(), DatabaseError> {
    let ddl: String = Domain::ALL.iter().map(|d| domain_ddl(*d)).collect();
    conn.execute_batch(&ddl)
        .await
        .map_err(|e| DatabaseError::Schema(format!("Failed to create domain tables: {e}")))?;

    tracing::info!(domains = Domain::ALL.len(), "Domain tables ensured");
    Ok(())
}
