//! Inspector: runs one queue message through fetch, judge, write and notify.
//!
//! Flow per message:
//! 1. Decode the job (`Job::parse`)
//! 2. Load the record; a missing row ends the job quietly
//! 3. Ask the classifier for a verdict (failures hold as pending)
//! 4. Commit the inspection flags
//! 5. Alert reviewers unless the content was approved

use std::sync::Arc;

use serde::Serialize;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::InspectionError;
use crate::notify::{Notification, Notifier, ReviewStatus};
use crate::pipeline::classifier::{Classification, Classifier};
use crate::pipeline::types::{
    BatchItemFailure, BatchResponse, Job, Outcome, QueueEvent, Verdict,
};
use crate::store::InspectionStore;

/// How one job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum JobReport {
    /// The record no longer exists. Nothing written, nobody alerted.
    Skipped,
    /// Flags committed.
    Applied {
        verdict: Verdict,
        outcome: Outcome,
        /// The judge call failed and the verdict defaulted to pending.
        classification_failed: bool,
        /// Rows matched in the inspection table.
        rows_updated: u64,
        /// A reviewer alert was published successfully.
        notified: bool,
    },
}

/// Per-message results for one delivery.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub entries: Vec<BatchEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchEntry {
    pub message_id: String,
    #[serde(flatten)]
    pub status: EntryStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryStatus {
    Done { report: JobReport },
    Failed { reason: String },
}

impl BatchReport {
    /// Failed messages, in the shape the queue uses for redelivery.
    pub fn to_response(&self) -> BatchResponse {
        BatchResponse {
            batch_item_failures: self
                .entries
                .iter()
                .filter(|e| matches!(e.status, EntryStatus::Failed { .. }))
                .map(|e| BatchItemFailure {
                    item_identifier: e.message_id.clone(),
                })
                .collect(),
        }
    }

    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, EntryStatus::Failed { .. }))
            .count()
    }
}

/// The moderation pipeline. Holds the process-wide service handles.
pub struct Inspector {
    store: Arc<dyn InspectionStore>,
    classifier: Classifier,
    notifier: Arc<dyn Notifier>,
    review_base_url: String,
}

impl Inspector {
    pub fn new(
        store: Arc<dyn InspectionStore>,
        classifier: Classifier,
        notifier: Arc<dyn Notifier>,
        review_base_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            classifier,
            notifier,
            review_base_url: review_base_url.into(),
        }
    }

    /// Decode and inspect one raw message body.
    pub async fn handle_message(&self, body: &str) -> Result<JobReport, InspectionError> {
        let job = Job::parse(body)?;
        self.inspect(&job).await
    }

    /// Inspect one job.
    pub async fn inspect(&self, job: &Job) -> Result<JobReport, InspectionError> {
        info!(
            domain = %job.domain,
            item_id = %job.item_id,
            allow_approve = job.allow_approve,
            "Inspecting record"
        );

        // Connection lives until the end of this job.
        let session = self.store.session().await?;

        let Some(record) = session.fetch_record(job.domain, &job.item_id).await? else {
            info!(domain = %job.domain, item_id = %job.item_id, "Record not found, skipping");
            return Ok(JobReport::Skipped);
        };

        let classification = self.classifier.classify(&record).await;
        let verdict = classification.verdict();
        let outcome = Outcome::resolve(verdict, job.allow_approve);

        let rows_updated = session
            .apply_outcome(job.domain, &job.item_id, outcome)
            .await?;
        if rows_updated == 0 {
            warn!(
                domain = %job.domain,
                item_id = %job.item_id,
                "No inspection row matched; flags not recorded"
            );
        }

        let notified = match ReviewStatus::for_outcome(outcome) {
            Some(status) => {
                let notification = Notification::new(
                    status,
                    job.domain,
                    &job.item_id,
                    &record.title,
                    &record.detail,
                    &self.review_base_url,
                );
                match self.notifier.publish(&notification).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(
                            notifier = self.notifier.name(),
                            domain = %job.domain,
                            item_id = %job.item_id,
                            error = %e,
                            "Failed to publish review alert"
                        );
                        false
                    }
                }
            }
            None => false,
        };

        info!(
            domain = %job.domain,
            item_id = %job.item_id,
            verdict = %verdict,
            outcome = outcome.as_str(),
            notified,
            "Inspection complete"
        );

        Ok(JobReport::Applied {
            verdict,
            outcome,
            classification_failed: matches!(classification, Classification::Failed(_)),
            rows_updated,
            notified,
        })
    }

    /// Process every message of a delivery in order.
    ///
    /// A failing message is recorded and the rest still run; the caller
    /// hands the failures back to the queue for redelivery.
    pub async fn process_event(&self, event: QueueEvent) -> BatchReport {
        let batch_id = Uuid::new_v4();
        let span = info_span!("batch", %batch_id, messages = event.records.len());

        async move {
            let mut report = BatchReport::default();
            for (index, record) in event.records.into_iter().enumerate() {
                let message_id = if record.message_id.is_empty() {
                    format!("{batch_id}-{index}")
                } else {
                    record.message_id
                };

                let status = match self.handle_message(&record.body).await {
                    Ok(job_report) => EntryStatus::Done { report: job_report },
                    Err(e) => {
                        error!(message_id = %message_id, error = %e, "Failed to inspect message");
                        EntryStatus::Failed {
                            reason: e.to_string(),
                        }
                    }
                };
                report.entries.push(BatchEntry { message_id, status });
            }

            info!(
                processed = report.entries.len(),
                failed = report.failed(),
                "Batch complete"
            );
            report
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DatabaseError, JobError, LlmError, NotifyError};
    use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};
    use crate::pipeline::types::{Domain, QueueRecord};
    use crate::store::{InspectionRow, InspectionSession, LibSqlStore};
    use async_trait::async_trait;
    use libsql::params;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ── Test doubles ────────────────────────────────────────────────

    /// Mock LLM returning a fixed reply (or a transport error).
    struct MockJudge {
        reply: Result<String, String>,
        calls: AtomicUsize,
    }

    impl MockJudge {
        fn says(judge: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(format!(r#"{{"judge": "{judge}"}}"#)),
                calls: AtomicUsize::new(0),
            })
        }

        fn broken() -> Arc<Self> {
            Arc::new(Self {
                reply: Err("connection refused".into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for MockJudge {
        fn model_name(&self) -> &str {
            "mock-judge"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.reply {
                Ok(text) => Ok(CompletionResponse {
                    content: text.clone(),
                    input_tokens: 100,
                    output_tokens: 10,
                }),
                Err(reason) => Err(LlmError::RequestFailed {
                    provider: "mock".into(),
                    reason: reason.clone(),
                }),
            }
        }
    }

    /// Notifier that remembers what it was asked to send.
    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        fn name(&self) -> &str {
            "recording"
        }

        async fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(notification.clone());
            if self.fail {
                Err(NotifyError::SendFailed("relay down".into()))
            } else {
                Ok(())
            }
        }
    }

    /// Store that must never be touched.
    struct UnreachableStore {
        opened: AtomicUsize,
    }

    #[async_trait]
    impl InspectionStore for UnreachableStore {
        async fn session(&self) -> Result<Box<dyn InspectionSession>, DatabaseError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Err(DatabaseError::Connection("unreachable".into()))
        }
    }

    struct Harness {
        store: Arc<LibSqlStore>,
        llm: Arc<MockJudge>,
        notifier: Arc<RecordingNotifier>,
        inspector: Inspector,
    }

    async fn harness(llm: Arc<MockJudge>, notifier: RecordingNotifier) -> Harness {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let notifier = Arc::new(notifier);
        let inspector = Inspector::new(
            store.clone(),
            Classifier::new(llm.clone()),
            notifier.clone(),
            "https://review.test/inspection",
        );
        Harness {
            store,
            llm,
            notifier,
            inspector,
        }
    }

    async fn seed(store: &LibSqlStore, domain: Domain, id: i64, title: &str, detail: &str) {
        let tables = domain.tables();
        let conn = store.connect().unwrap();
        conn.execute(
            &format!("INSERT INTO {} (id, title, detail) VALUES (?1, ?2, ?3)", tables.data),
            params![id, title, detail],
        )
        .await
        .unwrap();
        conn.execute(
            &format!("INSERT INTO {} ({}) VALUES (?1)", tables.inspection, tables.foreign_key),
            params![id],
        )
        .await
        .unwrap();
    }

    fn row(ai: bool, inspected: bool, deleted: bool) -> Option<InspectionRow> {
        Some(InspectionRow {
            ai,
            inspected,
            deleted,
        })
    }

    // ── Scenarios ───────────────────────────────────────────────────

    #[tokio::test]
    async fn approve_with_allow_marks_inspected_without_alert() {
        let h = harness(MockJudge::says("approve"), RecordingNotifier::default()).await;
        seed(&h.store, Domain::Shop, 7, "Crepe Stand", "Fresh crepes").await;

        let report = h.inspector.handle_message("shop,7,True").await.unwrap();
        assert!(matches!(
            report,
            JobReport::Applied {
                outcome: Outcome::Approved,
                notified: false,
                ..
            }
        ));
        assert_eq!(
            h.store.inspection_row(Domain::Shop, "7").await.unwrap(),
            row(true, true, false)
        );
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reject_marks_deleted_and_alerts_once() {
        let h = harness(MockJudge::says("reject"), RecordingNotifier::default()).await;
        seed(&h.store, Domain::News, 42, "Free money", "Click here").await;

        h.inspector.handle_message("news,42,True").await.unwrap();

        assert_eq!(
            h.store.inspection_row(Domain::News, "42").await.unwrap(),
            row(true, false, true)
        );
        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, ReviewStatus::Reject);
        assert_eq!(sent[0].domain, Domain::News);
        assert_eq!(sent[0].item_id, "42");
        assert_eq!(sent[0].review_url, "https://review.test/inspection/news/42");
    }

    #[tokio::test]
    async fn pending_marks_ai_only_and_alerts() {
        let h = harness(MockJudge::says("pending"), RecordingNotifier::default()).await;
        seed(&h.store, Domain::Band, 3, "The Resistors", "Live at 14:00").await;

        h.inspector.handle_message("band,3,True").await.unwrap();

        assert_eq!(
            h.store.inspection_row(Domain::Band, "3").await.unwrap(),
            row(true, false, false)
        );
        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, ReviewStatus::Pending);
    }

    #[tokio::test]
    async fn approve_without_allow_is_held_as_pending() {
        let h = harness(MockJudge::says("approve"), RecordingNotifier::default()).await;
        seed(&h.store, Domain::Menu, 12, "Curry", "Mild").await;

        let report = h.inspector.handle_message("menu,12,false").await.unwrap();
        assert!(matches!(
            report,
            JobReport::Applied {
                verdict: Verdict::Approve,
                outcome: Outcome::Pending,
                ..
            }
        ));
        assert_eq!(
            h.store.inspection_row(Domain::Menu, "12").await.unwrap(),
            row(true, false, false)
        );
        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, ReviewStatus::Pending);
    }

    #[tokio::test]
    async fn transport_fault_holds_as_pending_with_record_text() {
        let h = harness(MockJudge::broken(), RecordingNotifier::default()).await;
        seed(&h.store, Domain::Post, 99, "Lost umbrella", "Blue, room 3").await;

        let report = h.inspector.handle_message("post,99,True").await.unwrap();
        assert!(matches!(
            report,
            JobReport::Applied {
                verdict: Verdict::Pending,
                outcome: Outcome::Pending,
                classification_failed: true,
                notified: true,
                ..
            }
        ));
        assert_eq!(
            h.store.inspection_row(Domain::Post, "99").await.unwrap(),
            row(true, false, false)
        );
        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, ReviewStatus::Pending);
        assert_eq!(sent[0].title, "Lost umbrella");
        assert_eq!(sent[0].detail, "Blue, room 3");
    }

    #[tokio::test]
    async fn missing_record_is_a_quiet_no_op() {
        let h = harness(MockJudge::says("reject"), RecordingNotifier::default()).await;

        let report = h.inspector.handle_message("event,5,True").await.unwrap();
        assert_eq!(report, JobReport::Skipped);
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
        assert!(h.notifier.sent.lock().unwrap().is_empty());
        assert!(h.store.inspection_row(Domain::Event, "5").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn notify_failure_keeps_committed_write() {
        let notifier = RecordingNotifier {
            fail: true,
            ..Default::default()
        };
        let h = harness(MockJudge::says("reject"), notifier).await;
        seed(&h.store, Domain::Karaoke, 8, "Song", "Lyrics").await;

        let report = h.inspector.handle_message("karaoke,8,True").await.unwrap();
        assert!(matches!(report, JobReport::Applied { notified: false, .. }));
        assert_eq!(
            h.store.inspection_row(Domain::Karaoke, "8").await.unwrap(),
            row(true, false, true)
        );
    }

    #[tokio::test]
    async fn missing_inspection_row_still_alerts_reviewers() {
        let h = harness(MockJudge::says("reject"), RecordingNotifier::default()).await;
        let conn = h.store.connect().unwrap();
        conn.execute(
            "INSERT INTO api_postdata (id, title, detail) VALUES (?1, ?2, ?3)",
            params![5, "Bake sale", "Room 2"],
        )
        .await
        .unwrap();

        let report = h.inspector.handle_message("post,5,True").await.unwrap();
        assert_eq!(
            report,
            JobReport::Applied {
                verdict: Verdict::Reject,
                outcome: Outcome::Rejected,
                classification_failed: false,
                rows_updated: 0,
                notified: true,
            }
        );
        assert!(h.store.inspection_row(Domain::Post, "5").await.unwrap().is_none());
        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].status, ReviewStatus::Reject);
        assert_eq!(sent[0].title, "Bake sale");
    }

    #[tokio::test]
    async fn invalid_domain_fails_before_any_io() {
        let store = Arc::new(UnreachableStore {
            opened: AtomicUsize::new(0),
        });
        let llm = MockJudge::says("approve");
        let notifier = Arc::new(RecordingNotifier::default());
        let inspector = Inspector::new(
            store.clone(),
            Classifier::new(llm.clone()),
            notifier.clone(),
            "https://review.test/inspection",
        );

        let err = inspector.handle_message("users,1,True").await.unwrap_err();
        assert!(matches!(
            err,
            InspectionError::Job(JobError::InvalidDomain(ref d)) if d == "users"
        ));
        assert_eq!(store.opened.load(Ordering::SeqCst), 0);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn database_failure_propagates() {
        let inspector = Inspector::new(
            Arc::new(UnreachableStore {
                opened: AtomicUsize::new(0),
            }),
            Classifier::new(MockJudge::says("approve")),
            Arc::new(RecordingNotifier::default()),
            "https://review.test/inspection",
        );
        let err = inspector.handle_message("news,1,True").await.unwrap_err();
        assert!(matches!(err, InspectionError::Database(_)));
    }

    #[tokio::test]
    async fn batch_continues_past_failures() {
        let h = harness(MockJudge::says("approve"), RecordingNotifier::default()).await;
        seed(&h.store, Domain::Shop, 7, "Crepe Stand", "Fresh crepes").await;
        seed(&h.store, Domain::News, 1, "Opening", "Doors at 9").await;

        let event = QueueEvent {
            records: vec![
                QueueRecord {
                    message_id: "m-1".into(),
                    body: "shop,7,True".into(),
                },
                QueueRecord {
                    message_id: "m-2".into(),
                    body: "broken".into(),
                },
                QueueRecord {
                    message_id: "m-3".into(),
                    body: "news,1,True".into(),
                },
            ],
        };

        let report = h.inspector.process_event(event).await;
        assert_eq!(report.entries.len(), 3);
        assert_eq!(report.failed(), 1);
        assert_eq!(
            report.to_response().batch_item_failures,
            vec![BatchItemFailure {
                item_identifier: "m-2".into()
            }]
        );
        assert_eq!(
            h.store.inspection_row(Domain::News, "1").await.unwrap(),
            row(true, true, false)
        );
    }

    #[tokio::test]
    async fn batch_generates_ids_for_anonymous_messages() {
        let h = harness(MockJudge::says("approve"), RecordingNotifier::default()).await;
        let event = QueueEvent {
            records: vec![QueueRecord {
                message_id: String::new(),
                body: "nope".into(),
            }],
        };
        let report = h.inspector.process_event(event).await;
        assert!(report.entries[0].message_id.ends_with("-0"));
        assert_eq!(report.to_response().batch_item_failures.len(), 1);
    }
}
