//! Persistence of domain data and inspection tables over libSQL.

pub mod libsql_backend;
pub mod schema;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::{InspectionRow, InspectionSession, InspectionStore};
