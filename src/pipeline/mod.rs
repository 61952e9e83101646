//! Moderation pipeline.
//!
//! Every queued message flows through:
//! 1. `Job::parse()`: decode `<domain>,<id>,<allow_approve>`
//! 2. `InspectionSession::fetch_record()`: load title and detail
//! 3. `Classifier::classify()`: LLM judge, failures hold as pending
//! 4. `InspectionSession::apply_outcome()`: commit the moderation flags
//! 5. `Notifier::publish()`: alert reviewers unless approved
//!
//! **Nothing is auto-approved unless the job allows it.**

pub mod classifier;
pub mod inspector;
pub mod types;

pub use classifier::{Classification, Classifier, ClassifyFailure};
pub use inspector::{BatchReport, Inspector, JobReport};
pub use types::{Domain, Job, Outcome, QueueEvent, Record, Verdict};
