//! Error types for the inspection worker.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Schema setup failed: {0}")]
    Schema(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Reviewer notification errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Failed to publish notification: {0}")]
    SendFailed(String),
}

/// Errors decoding a queue message into a job.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("Malformed job descriptor {body:?}: expected 3 comma-separated fields, got {fields}")]
    Malformed { body: String, fields: usize },

    #[error("Invalid table name: {0}")]
    InvalidDomain(String),
}

/// Errors that abort a single inspection job.
#[derive(Debug, thiserror::Error)]
pub enum InspectionError {
    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
