//! Typed views over envelope payloads.
//!
//! Payloads are decoded on demand with [`Envelope::payload`](crate::Envelope::payload).
//! Only the fields the dashboard reads are modelled; unknown fields are
//! ignored.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::EventCategory;

/// A payload type that can be decoded from an envelope.
pub trait Payload: DeserializeOwned {
    /// Type name used in error messages.
    const NAME: &'static str;

    /// Whether envelopes of `category` carry this payload.
    fn accepts(category: &EventCategory) -> bool;
}

/// Pull request state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullRequestState {
    /// Open for review.
    Open,
    /// Closed without merge.
    Closed,
    /// Merged.
    Merged,
}

/// Payload of the `pr_*` categories.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Record ID.
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Number on the forge.
    pub pr_number: u64,
    /// Title.
    pub title: String,
    /// Current state.
    pub state: PullRequestState,
    /// Author login.
    pub author: String,
    /// Web URL.
    pub url: String,
    /// Merge time, if merged.
    #[serde(default)]
    pub merged_at: Option<String>,
}

impl Payload for PullRequest {
    const NAME: &'static str = "PullRequest";

    fn accepts(category: &EventCategory) -> bool {
        matches!(
            category,
            EventCategory::PrOpened
                | EventCategory::PrClosed
                | EventCategory::PrMerged
                | EventCategory::PrUpdated
        )
    }
}

/// Workflow run status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Waiting for a runner.
    Queued,
    /// Running.
    InProgress,
    /// Finished; see the conclusion.
    Completed,
}

/// Workflow run conclusion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowConclusion {
    /// Passed.
    Success,
    /// Failed.
    Failure,
    /// Cancelled before finishing.
    Cancelled,
}

/// Payload of the `workflow_*` categories.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Record ID.
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Run number on the CI provider.
    pub run_id: u64,
    /// Workflow name.
    pub workflow_name: String,
    /// Status.
    pub status: WorkflowStatus,
    /// Conclusion once completed.
    #[serde(default)]
    pub conclusion: Option<WorkflowConclusion>,
    /// Branch, if known.
    #[serde(default)]
    pub branch: Option<String>,
    /// Web URL.
    pub url: String,
}

impl Payload for WorkflowRun {
    const NAME: &'static str = "WorkflowRun";

    fn accepts(category: &EventCategory) -> bool {
        matches!(
            category,
            EventCategory::WorkflowStarted
                | EventCategory::WorkflowCompleted
                | EventCategory::WorkflowFailed
        )
    }
}

/// Integration provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationKind {
    /// GitHub.
    Github,
    /// Vercel.
    Vercel,
    /// Railway.
    Railway,
}

/// Payload of `integration_synced`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    /// Record ID.
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Provider.
    #[serde(rename = "type")]
    pub kind: IntegrationKind,
    /// Whether syncing is enabled.
    pub enabled: bool,
    /// Last successful sync.
    #[serde(default)]
    pub last_synced_at: Option<String>,
}

impl Payload for Integration {
    const NAME: &'static str = "Integration";

    fn accepts(category: &EventCategory) -> bool {
        matches!(category, EventCategory::IntegrationSynced)
    }
}

/// Payload of `metric_update`: free-form metric name to value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricUpdate(pub BTreeMap<String, Value>);

impl MetricUpdate {
    /// Numeric value of a metric, if present and numeric.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(Value::as_f64)
    }
}

impl Payload for MetricUpdate {
    const NAME: &'static str = "MetricUpdate";

    fn accepts(category: &EventCategory) -> bool {
        matches!(category, EventCategory::MetricUpdate)
    }
}
