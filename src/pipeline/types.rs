//! Shared types for the inspection pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::JobError;

/// Literal that marks a job as allowed to auto-approve.
pub const ALLOW_APPROVE_TOKEN: &str = "True";

// ── Domain ──────────────────────────────────────────────────────────

/// Kind of user submission. Each domain owns a data table and an
/// inspection table in the web application's database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    News,
    Event,
    Shop,
    Menu,
    Post,
    Band,
    BandSong,
    Karaoke,
}

/// Fixed table names for one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainTables {
    /// Table holding `id, title, detail`.
    pub data: &'static str,
    /// Table holding `ai, inspected, deleted` keyed by `foreign_key`.
    pub inspection: &'static str,
    pub foreign_key: &'static str,
}

impl Domain {
    pub const ALL: [Domain; 8] = [
        Domain::News,
        Domain::Event,
        Domain::Shop,
        Domain::Menu,
        Domain::Post,
        Domain::Band,
        Domain::BandSong,
        Domain::Karaoke,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Event => "event",
            Self::Shop => "shop",
            Self::Menu => "menu",
            Self::Post => "post",
            Self::Band => "band",
            Self::BandSong => "bandsong",
            Self::Karaoke => "karaoke",
        }
    }

    /// Table names for this domain. The only source of identifiers that
    /// ever reach SQL text.
    pub fn tables(&self) -> DomainTables {
        match self {
            Self::News => DomainTables {
                data: "api_newsdata",
                inspection: "api_newsinspectiondata",
                foreign_key: "news_id",
            },
            Self::Event => DomainTables {
                data: "api_eventdata",
                inspection: "api_eventinspectiondata",
                foreign_key: "event_id",
            },
            Self::Shop => DomainTables {
                data: "api_shopdata",
                inspection: "api_shopinspectiondata",
                foreign_key: "shop_id",
            },
            Self::Menu => DomainTables {
                data: "api_menudata",
                inspection: "api_menuinspectiondata",
                foreign_key: "menu_id",
            },
            Self::Post => DomainTables {
                data: "api_postdata",
                inspection: "api_postinspectiondata",
                foreign_key: "post_id",
            },
            Self::Band => DomainTables {
                data: "api_banddata",
                inspection: "api_bandinspectiondata",
                foreign_key: "band_id",
            },
            Self::BandSong => DomainTables {
                data: "api_bandsongdata",
                inspection: "api_bandsonginspectiondata",
                foreign_key: "bandsong_id",
            },
            Self::Karaoke => DomainTables {
                data: "api_karaokedata",
                inspection: "api_karaokeinspectiondata",
                foreign_key: "karaoke_id",
            },
        }
    }
}

impl FromStr for Domain {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == lower)
            .ok_or_else(|| JobError::InvalidDomain(s.to_string()))
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Job ─────────────────────────────────────────────────────────────

/// One decoded queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub domain: Domain,
    pub item_id: String,
    pub allow_approve: bool,
}

impl Job {
    /// Decode `<domain>,<item_id>,<allow_approve>`.
    ///
    /// The flag is true only for the exact literal `True`. The item id is
    /// passed through untouched; a bad id shows up as a missing record.
    pub fn parse(body: &str) -> Result<Self, JobError> {
        let fields: Vec<&str> = body.split(',').collect();
        let [domain, item_id, flag] = fields.as_slice() else {
            return Err(JobError::Malformed {
                body: body.to_string(),
                fields: fields.len(),
            });
        };

        Ok(Self {
            domain: domain.parse()?,
            item_id: (*item_id).to_string(),
            allow_approve: *flag == ALLOW_APPROVE_TOKEN,
        })
    }
}

// ── Record ──────────────────────────────────────────────────────────

/// Title and body of a submission, read from the domain's data table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub title: String,
    pub detail: String,
}

// ── Verdict / outcome ───────────────────────────────────────────────

/// Classifier decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approve,
    Pending,
    Reject,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Pending => "pending",
            Self::Reject => "reject",
        }
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approve" => Ok(Self::Approve),
            "pending" => Ok(Self::Pending),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown verdict '{other}'")),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What actually gets recorded once the job's approval flag is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// `ai = true, inspected = true`. No reviewer notification.
    Approved,
    /// `ai = true, deleted = true`.
    Rejected,
    /// `ai = true` only; a human decides.
    Pending,
}

impl Outcome {
    pub fn resolve(verdict: Verdict, allow_approve: bool) -> Self {
        match verdict {
            Verdict::Approve if allow_approve => Self::Approved,
            Verdict::Reject => Self::Rejected,
            Verdict::Approve | Verdict::Pending => Self::Pending,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approve",
            Self::Rejected => "reject",
            Self::Pending => "pending",
        }
    }

    pub fn needs_review(&self) -> bool {
        !matches!(self, Self::Approved)
    }
}

// ── Queue event ─────────────────────────────────────────────────────

/// A delivery from the queue: one or more messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<QueueRecord>,
}

/// A single queued message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRecord {
    #[serde(rename = "messageId", default)]
    pub message_id: String,
    pub body: String,
}

/// Messages the queue should redeliver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    #[serde(rename = "batchItemFailures")]
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemFailure {
    #[serde(rename = "itemIdentifier")]
    pub item_identifier: String,
}
