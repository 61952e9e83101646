//! Reviewer notifications.
//!
//! Sent after the inspection write has committed, for every outcome other
//! than a clean approval. Delivery is fire-and-forget: the inspector logs a
//! failed publish and moves on.

pub mod email;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::NotifyError;
use crate::pipeline::types::{Domain, Outcome};

pub use email::{EmailConfig, SmtpNotifier};

/// The festival's local time zone. Timestamps in alerts are shown in it.
pub const LOCAL_TZ: Tz = chrono_tz::Asia::Tokyo;

/// Default base for review links.
pub const DEFAULT_REVIEW_BASE_URL: &str = "https://denpafest.com/inspection";

/// Status shown to reviewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Reject,
    Pending,
}

impl ReviewStatus {
    /// Approvals never notify. Approve-without-allow already resolved to
    /// `Outcome::Pending` and uses the pending wording.
    pub fn for_outcome(outcome: Outcome) -> Option<Self> {
        match outcome {
            Outcome::Approved => None,
            Outcome::Rejected => Some(Self::Reject),
            Outcome::Pending => Some(Self::Pending),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Pending => "pending",
        }
    }
}

/// One reviewer alert.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub status: ReviewStatus,
    pub domain: Domain,
    pub item_id: String,
    pub title: String,
    pub detail: String,
    pub inspected_at: DateTime<Tz>,
    pub review_url: String,
}

impl Notification {
    pub fn new(
        status: ReviewStatus,
        domain: Domain,
        item_id: &str,
        title: &str,
        detail: &str,
        review_base_url: &str,
    ) -> Self {
        Self {
            status,
            domain,
            item_id: item_id.to_string(),
            title: title.to_string(),
            detail: detail.to_string(),
            inspected_at: local_now(),
            review_url: review_url(review_base_url, domain, item_id),
        }
    }

    #[cfg(test)]
    pub fn with_inspected_at(mut self, at: DateTime<Tz>) -> Self {
        self.inspected_at = at;
        self
    }

    pub fn subject(&self) -> String {
        let subject = format!("AI inspection result: {}", self.status.as_str());
        match self.status {
            ReviewStatus::Reject => subject,
            ReviewStatus::Pending => format!("[Action required] {subject}"),
        }
    }

    pub fn body(&self) -> String {
        let comment = match self.status {
            ReviewStatus::Reject => {
                "If this result looks wrong, please handle it at the URL below."
            }
            ReviewStatus::Pending => "Please review it at the URL below.",
        };

        format!(
            "A user submission was marked {status} by the automated AI inspection.\n\
             \n\
             Inspected at:\n  {at}\n\
             \n\
             Data type:\n  {domain}\n\
             \n\
             ID:\n  {item_id}\n\
             \n\
             Title:\n  {title}\n\
             \n\
             Detail:\n  {detail}\n\
             \n\
             {comment}\n\
             {url}\n",
            status = self.status.as_str(),
            at = self.inspected_at.format("%Y/%m/%d %H:%M:%S"),
            domain = self.domain,
            item_id = self.item_id,
            title = self.title,
            detail = self.detail,
            url = self.review_url,
        )
    }
}

/// Current time in the festival's time zone.
pub fn local_now() -> DateTime<Tz> {
    Utc::now().with_timezone(&LOCAL_TZ)
}

/// `<base>/<domain>/<item_id>`.
pub fn review_url(base: &str, domain: Domain, item_id: &str) -> String {
    format!("{}/{}/{}", base.trim_end_matches('/'), domain, item_id)
}

/// Publishes reviewer alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes alerts to the log. Used when no SMTP relay is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn publish(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::warn!(
            status = notification.status.as_str(),
            domain = %notification.domain,
            item_id = %notification.item_id,
            review_url = %notification.review_url,
            subject = %notification.subject(),
            body = %notification.body(),
            "Review required (no SMTP relay configured)"
        );
        Ok(())
    }
}
