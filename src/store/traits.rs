//! Storage traits used by the inspector.
//!
//! A store hands out one session per job. The session owns a single
//! connection that is released when it is dropped, on every exit path.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::pipeline::types::{Domain, Outcome, Record};

/// Moderation flags for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InspectionRow {
    pub ai: bool,
    pub inspected: bool,
    pub deleted: bool,
}

/// Factory for per-job sessions.
#[async_trait]
pub trait InspectionStore: Send + Sync {
    /// Open a session backed by its own connection.
    async fn session(&self) -> Result<Box<dyn InspectionSession>, DatabaseError>;
}

/// Reads and writes for a single job.
#[async_trait]
pub trait InspectionSession: Send + Sync {
    /// Load title and detail from the domain's data table.
    /// `None` when no row has this id.
    async fn fetch_record(
        &self,
        domain: Domain,
        item_id: &str,
    ) -> Result<Option<Record>, DatabaseError>;

    /// Record the outcome in the domain's inspection table inside one
    /// transaction. Returns the number of rows updated.
    async fn apply_outcome(
        &self,
        domain: Domain,
        item_id: &str,
        outcome: Outcome,
    ) -> Result<u64, DatabaseError>;
}
