//! libSQL backend for the inspection store.
//!
//! Works against a local SQLite file, a remote libSQL server, or an
//! in-memory database for tests. File and remote databases get a fresh
//! connection per session; an in-memory database only exists on the
//! connection that created it, so that one connection is shared.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::pipeline::types::{Domain, Outcome, Record};
use crate::store::schema;
use crate::store::traits::{InspectionSession, InspectionStore};

/// libSQL-backed inspection store.
pub struct LibSqlStore {
    db: Arc<LibSqlDatabase>,
    shared: Option<Connection>,
}

impl LibSqlStore {
    /// Open a store from a `DATABASE_URL`-style location.
    ///
    /// `libsql://`, `http://`, `https://`, `ws://` and `wss://` URLs are
    /// remote; anything else is a local file path.
    pub async fn open(url: &str, auth_token: Option<&str>) -> Result<Self, DatabaseError> {
        if is_remote_url(url) {
            Self::new_remote(url, auth_token.unwrap_or_default()).await
        } else {
            let path = url.strip_prefix("file:").unwrap_or(url);
            Self::new_local(Path::new(path)).await
        }
    }

    /// Open (or create) a local database file.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open libSQL database: {e}")))?;

        info!(path = %path.display(), "Database opened");
        Ok(Self {
            db: Arc::new(db),
            shared: None,
        })
    }

    /// Connect to a remote libSQL server.
    pub async fn new_remote(url: &str, auth_token: &str) -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_remote(url.to_string(), auth_token.to_string())
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to open remote libSQL database: {e}"))
            })?;

        info!(url = %url, "Remote database opened");
        Ok(Self {
            db: Arc::new(db),
            shared: None,
        })
    }

    /// Create an in-memory database with all domain tables (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            shared: Some(conn),
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create missing domain tables.
    pub async fn ensure_schema(&self) -> Result<(), DatabaseError> {
        let conn = self.connect()?;
        schema::ensure_schema(&conn).await
    }

    /// Shared connection for in-memory databases, a new one otherwise.
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        match &self.shared {
            Some(conn) => Ok(conn.clone()),
            None => self
                .db
                .connect()
                .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}"))),
        }
    }
}

#[cfg(test)]
impl LibSqlStore {
    /// Read the moderation flags for a record, if an inspection row exists.
    pub async fn inspection_row(
        &self,
        domain: Domain,
        item_id: &str,
    ) -> Result<Option<crate::store::InspectionRow>, DatabaseError> {
        let tables = domain.tables();
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT ai, inspected, deleted FROM {} WHERE {} = ?1",
                    tables.inspection, tables.foreign_key
                ),
                params![item_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("inspection_row: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(crate::store::InspectionRow {
                ai: row.get::<i64>(0).unwrap_or(0) != 0,
                inspected: row.get::<i64>(1).unwrap_or(0) != 0,
                deleted: row.get::<i64>(2).unwrap_or(0) != 0,
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("inspection_row: {e}"))),
        }
    }
}

fn is_remote_url(url: &str) -> bool {
    ["libsql://", "http://", "https://", "ws://", "wss://"]
        .iter()
        .any(|scheme| url.starts_with(scheme))
}

/// Build the UPDATE for an outcome. Identifiers come from the domain's
/// static table mapping only.
fn update_sql(domain: Domain, outcome: Outcome) -> String {
    let tables = domain.tables();
    let assignments = match outcome {
        Outcome::Approved => "ai = true, inspected = true",
        Outcome::Rejected => "ai = true, deleted = true",
        Outcome::Pending => "ai = true",
    };
    format!(
        "UPDATE {} SET {} WHERE {} = ?1",
        tables.inspection, assignments, tables.foreign_key
    )
}

#[async_trait]
impl InspectionStore for LibSqlStore {
    async fn session(&self) -> Result<Box<dyn InspectionSession>, DatabaseError> {
        Ok(Box::new(LibSqlSession {
            conn: self.connect()?,
        }))
    }
}

/// One job's connection.
pub struct LibSqlSession {
    conn: Connection,
}

#[async_trait]
impl InspectionSession for LibSqlSession {
    async fn fetch_record(
        &self,
        domain: Domain,
        item_id: &str,
    ) -> Result<Option<Record>, DatabaseError> {
        let tables = domain.tables();
        let mut rows = self
            .conn
            .query(
                &format!("SELECT title, detail FROM {} WHERE id = ?1 LIMIT 1", tables.data),
                params![item_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("fetch_record: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let title: String = row.get(0).unwrap_or_default();
                let detail: String = row.get(1).unwrap_or_default();
                debug!(domain = %domain, item_id, "Record fetched");
                Ok(Some(Record { title, detail }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("fetch_record: {e}"))),
        }
    }

    async fn apply_outcome(
        &self,
        domain: Domain,
        item_id: &str,
        outcome: Outcome,
    ) -> Result<u64, DatabaseError> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DatabaseError::Transaction(format!("begin: {e}")))?;

        let updated = tx
            .execute(&update_sql(domain, outcome), params![item_id])
            .await
            .map_err(|e| DatabaseError::Query(format!("apply_outcome: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| DatabaseError::Transaction(format!("commit: {e}")))?;

        debug!(domain = %domain, item_id, outcome = outcome.as_str(), updated, "Outcome committed");
        Ok(updated)
    }
}
