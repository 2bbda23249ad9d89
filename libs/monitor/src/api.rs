//! Wire records returned by the orchestrator's HTTP API.
//!
//! The API speaks PascalCase JSON with `ID` suffixes and is loose about
//! empty values: maps and strings may come back as `null`. Every optional
//! field here therefore deserializes `null` to its default.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Status Enums
// =============================================================================

/// Evaluation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalStatus {
    Blocked,
    Pending,
    Complete,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

impl EvalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::Unknown => "unknown",
        }
    }

    /// Returns true once the scheduler will do no more work on the evaluation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Canceled)
    }
}

impl fmt::Display for EvalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status the scheduler wants an allocation to be in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredStatus {
    Run,
    Stop,
    Evict,
    /// The scheduler could not place the allocation.
    Failed,
    #[serde(other)]
    Unknown,
}

impl DesiredStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Stop => "stop",
            Self::Evict => "evict",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DesiredStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status reported by the client node running the allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Pending,
    Running,
    Complete,
    Dead,
    Failed,
    Lost,
    #[serde(other)]
    Unknown,
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Complete => "complete",
            Self::Dead => "dead",
            Self::Failed => "failed",
            Self::Lost => "lost",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Evaluations
// =============================================================================

/// What caused an evaluation to be created.
///
/// Node-update evaluations carry the job id as well, so the node wins when
/// both are set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Trigger {
    Job(String),
    Node(String),
    None,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Job(job) => write!(f, "job \"{}\"", job),
            Self::Node(node) => write!(f, "node \"{}\"", node),
            Self::None => f.write_str("nothing"),
        }
    }
}

/// Evaluation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Evaluation {
    #[serde(rename = "ID")]
    pub id: String,

    pub status: EvalStatus,

    #[serde(default, deserialize_with = "null_as_default")]
    pub status_description: String,

    /// Why the evaluation exists (job-register, node-update, ...).
    #[serde(default, deserialize_with = "null_as_default")]
    pub triggered_by: String,

    #[serde(rename = "JobID", default, deserialize_with = "null_as_default")]
    pub job_id: String,

    #[serde(rename = "NodeID", default, deserialize_with = "null_as_default")]
    pub node_id: String,

    /// Follow-up evaluation created when this one was split or re-queued.
    #[serde(default, deserialize_with = "null_as_default")]
    pub next_eval: String,

    /// Evaluation created to hold placements that did not fit.
    #[serde(default, deserialize_with = "null_as_default")]
    pub blocked_eval: String,

    #[serde(default)]
    pub create_index: u64,

    #[serde(default)]
    pub modify_index: u64,
}

impl Evaluation {
    pub fn trigger(&self) -> Trigger {
        if !self.node_id.is_empty() {
            Trigger::Node(self.node_id.clone())
        } else if !self.job_id.is_empty() {
            Trigger::Job(self.job_id.clone())
        } else {
            Trigger::None
        }
    }

    /// Follow-up evaluation to keep watching, if any.
    pub fn follow_up(&self) -> Option<&str> {
        (!self.next_eval.is_empty()).then_some(self.next_eval.as_str())
    }
}

// =============================================================================
// Allocations
// =============================================================================

/// Allocation as listed under an evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AllocationStub {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "EvalID", default, deserialize_with = "null_as_default")]
    pub eval_id: String,

    #[serde(rename = "JobID", default, deserialize_with = "null_as_default")]
    pub job_id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub task_group: String,

    #[serde(rename = "NodeID", default, deserialize_with = "null_as_default")]
    pub node_id: String,

    pub desired_status: DesiredStatus,

    #[serde(default, deserialize_with = "null_as_default")]
    pub desired_description: String,

    pub client_status: ClientStatus,

    #[serde(default, deserialize_with = "null_as_default")]
    pub client_description: String,

    #[serde(default)]
    pub create_index: u64,

    #[serde(default)]
    pub modify_index: u64,
}

/// Full allocation record, including placement metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Allocation {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "EvalID", default, deserialize_with = "null_as_default")]
    pub eval_id: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub task_group: String,

    #[serde(rename = "NodeID", default, deserialize_with = "null_as_default")]
    pub node_id: String,

    pub desired_status: DesiredStatus,

    #[serde(default, deserialize_with = "null_as_default")]
    pub desired_description: String,

    pub client_status: ClientStatus,

    #[serde(default, deserialize_with = "null_as_default")]
    pub client_description: String,

    #[serde(default)]
    pub create_index: u64,

    #[serde(default)]
    pub metrics: Option<AllocationMetric>,
}

/// Placement metrics recorded by the scheduler for one allocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AllocationMetric {
    pub nodes_evaluated: u64,
    pub nodes_filtered: u64,

    #[serde(deserialize_with = "null_as_default")]
    pub class_filtered: BTreeMap<String, u64>,

    #[serde(deserialize_with = "null_as_default")]
    pub constraint_filtered: BTreeMap<String, u64>,

    pub nodes_exhausted: u64,

    #[serde(deserialize_with = "null_as_default")]
    pub class_exhausted: BTreeMap<String, u64>,

    #[serde(deserialize_with = "null_as_default")]
    pub dimension_exhausted: BTreeMap<String, u64>,

    #[serde(deserialize_with = "null_as_default")]
    pub scores: BTreeMap<String, f64>,

    /// Time spent placing the allocation, in nanoseconds.
    pub allocation_time: u64,
}

// =============================================================================
// Queries
// =============================================================================

/// Blocking-query parameters.
///
/// A zero `wait_index` means "answer immediately".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Return once the resource's index moves past this value.
    pub wait_index: u64,

    /// Upper bound on how long the server may hold the request.
    pub wait_time: Option<Duration>,
}

impl QueryOptions {
    pub fn blocking(wait_index: u64, wait_time: Duration) -> Self {
        Self {
            wait_index,
            wait_time: Some(wait_time),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.wait_index > 0
    }
}

/// Metadata returned alongside a query result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryMeta {
    /// Index of the data that answered the query; zero when the server
    /// reported none, in which case blocking queries are unavailable.
    pub last_index: u64,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_deserialization() {
        let json = r#"{
            "ID": "5456bd7a-9fc0-c0dd-6131-cbee77f57577",
            "Priority": 50,
            "Type": "service",
            "TriggeredBy": "job-register",
            "JobID": "example",
            "NodeID": "",
            "Status": "complete",
            "StatusDescription": null,
            "NextEval": "",
            "BlockedEval": "",
            "CreateIndex": 62,
            "ModifyIndex": 64
        }"#;

        let eval: Evaluation = serde_json::from_str(json).unwrap();
        assert_eq!(eval.status, EvalStatus::Complete);
        assert_eq!(eval.trigger(), Trigger::Job("example".to_string()));
        assert_eq!(eval.create_index, 62);
        assert_eq!(eval.follow_up(), None);
        assert!(eval.status_description.is_empty());
    }

    #[test]
    fn test_node_trigger_wins_over_job() {
        let eval = Evaluation {
            id: "eval1".to_string(),
            status: EvalStatus::Pending,
            status_description: String::new(),
            triggered_by: "node-update".to_string(),
            job_id: "job1".to_string(),
            node_id: "node1".to_string(),
            next_eval: "eval2".to_string(),
            blocked_eval: String::new(),
            create_index: 1,
            modify_index: 1,
        };

        assert_eq!(eval.trigger(), Trigger::Node("node1".to_string()));
        assert_eq!(eval.follow_up(), Some("eval2"));
    }

    #[test]
    fn test_unknown_status_literal() {
        let status: EvalStatus = serde_json::from_str("\"reticulating\"").unwrap();
        assert_eq!(status, EvalStatus::Unknown);
        assert!(!status.is_terminal());
    }

    #[test]
    fn test_allocation_metrics_tolerate_nulls() {
        let json = r#"{
            "ID": "alloc1",
            "EvalID": "eval1",
            "TaskGroup": "cache",
            "NodeID": "",
            "DesiredStatus": "failed",
            "DesiredDescription": "failed to find a node for placement",
            "ClientStatus": "failed",
            "ClientDescription": "",
            "CreateIndex": 9,
            "Metrics": {
                "NodesEvaluated": 3,
                "NodesFiltered": 3,
                "ClassFiltered": null,
                "ConstraintFiltered": {"$attr.kernel.name = linux": 3},
                "NodesExhausted": 0,
                "ClassExhausted": null,
                "DimensionExhausted": null,
                "Scores": null,
                "AllocationTime": 1520
            }
        }"#;

        let alloc: Allocation = serde_json::from_str(json).unwrap();
        assert_eq!(alloc.desired_status, DesiredStatus::Failed);
        let metrics = alloc.metrics.unwrap();
        assert_eq!(metrics.nodes_filtered, 3);
        assert!(metrics.class_filtered.is_empty());
        assert_eq!(metrics.constraint_filtered["$attr.kernel.name = linux"], 3);
    }

    #[test]
    fn test_query_options() {
        assert!(!QueryOptions::default().is_blocking());
        let query = QueryOptions::blocking(12, Duration::from_secs(5));
        assert!(query.is_blocking());
        assert_eq!(query.wait_time, Some(Duration::from_secs(5)));
    }
}
