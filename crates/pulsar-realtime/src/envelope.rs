//! Wire envelope and event categories.
//!
//! Every server push is a JSON object:
//!
//! ```json
//! {"type": "pr_opened", "project_id": "p1", "data": {...}, "timestamp": 1000}
//! ```
//!
//! The payload stays as raw JSON until a consumer asks for a typed view via
//! [`Envelope::payload`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{RealtimeError, Result};
use crate::payload::Payload;

/// The only frame this client ever sends.
pub const PING_FRAME: &str = r#"{"type":"ping"}"#;

/// Category of a server-pushed event.
///
/// Unknown wire values decode to [`EventCategory::Other`] so newer servers
/// do not break older clients.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventCategory {
    /// A pull request was opened.
    PrOpened,
    /// A pull request was closed without merging.
    PrClosed,
    /// A pull request was merged.
    PrMerged,
    /// A pull request changed.
    PrUpdated,
    /// A CI workflow run started.
    WorkflowStarted,
    /// A CI workflow run completed.
    WorkflowCompleted,
    /// A CI workflow run failed.
    WorkflowFailed,
    /// Project metrics changed.
    MetricUpdate,
    /// An integration finished syncing.
    IntegrationSynced,
    /// A category this client does not know about.
    Other(String),
}

impl EventCategory {
    /// Every known category, in wire order.
    pub const KNOWN: [EventCategory; 9] = [
        Self::PrOpened,
        Self::PrClosed,
        Self::PrMerged,
        Self::PrUpdated,
        Self::WorkflowStarted,
        Self::WorkflowCompleted,
        Self::WorkflowFailed,
        Self::MetricUpdate,
        Self::IntegrationSynced,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::PrOpened => "pr_opened",
            Self::PrClosed => "pr_closed",
            Self::PrMerged => "pr_merged",
            Self::PrUpdated => "pr_updated",
            Self::WorkflowStarted => "workflow_started",
            Self::WorkflowCompleted => "workflow_completed",
            Self::WorkflowFailed => "workflow_failed",
            Self::MetricUpdate => "metric_update",
            Self::IntegrationSynced => "integration_synced",
            Self::Other(s) => s,
        }
    }

    /// Whether this is one of the [`KNOWN`](Self::KNOWN) categories.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl From<&str> for EventCategory {
    fn from(s: &str) -> Self {
        match s {
            "pr_opened" => Self::PrOpened,
            "pr_closed" => Self::PrClosed,
            "pr_merged" => Self::PrMerged,
            "pr_updated" => Self::PrUpdated,
            "workflow_started" => Self::WorkflowStarted,
            "workflow_completed" => Self::WorkflowCompleted,
            "workflow_failed" => Self::WorkflowFailed,
            "metric_update" => Self::MetricUpdate,
            "integration_synced" => Self::IntegrationSynced,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EventCategory {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<EventCategory> for String {
    fn from(c: EventCategory) -> Self {
        match c {
            EventCategory::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded server push. Immutable once decoded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    category: EventCategory,
    project_id: String,
    data: Value,
    timestamp: i64,
}

impl Envelope {
    /// Build an envelope, e.g. for a producer or a test.
    pub fn new(
        category: EventCategory,
        project_id: impl Into<String>,
        data: Value,
        timestamp: i64,
    ) -> Self {
        Self {
            category,
            project_id: project_id.into(),
            data,
            timestamp,
        }
    }

    /// Decode one text frame.
    ///
    /// All four fields are required; anything that is not an object with
    /// that shape is a [`RealtimeError::Decode`].
    pub fn decode(frame: &str) -> Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Serialize back to the wire form.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Event category.
    pub fn category(&self) -> &EventCategory {
        &self.category
    }

    /// Project the event belongs to.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Raw payload.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Server timestamp in milliseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Server timestamp as a UTC time, if representable.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }

    /// Decode the payload as `T`, checking that `T` accepts this category.
    pub fn payload<T: Payload>(&self) -> Result<T> {
        if !T::accepts(&self.category) {
            return Err(RealtimeError::CategoryMismatch {
                payload: T::NAME,
                actual: self.category.clone(),
            });
        }
        Ok(T::deserialize(&self.data)?)
    }
}
