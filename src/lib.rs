//! Denpa Inspector: AI moderation worker for festival listings.

pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod server;
pub mod store;
