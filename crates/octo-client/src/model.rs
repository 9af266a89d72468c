//! Resource capabilities and the payloads the core itself interprets.
//!
//! # Design
//!
//! - Resources are opaque to the core beyond an identifier and a link map; see [`Resource`].
//! - Only the root document and server tasks are modelled here, because session establishment
//!   and the deployment watcher read their fields.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Named relations from a resource to related resource paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Links(BTreeMap<String, String>);

impl Links {
    /// Look up a relation by name.
    #[must_use]
    pub fn get(&self, relation: &str) -> Option<&str> {
        self.0.get(relation).map(String::as_str)
    }

    /// Add or replace a relation.
    pub fn insert(&mut self, relation: impl Into<String>, path: impl Into<String>) {
        self.0.insert(relation.into(), path.into());
    }

    /// Whether no relations are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Links {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(relation, path)| (relation.into(), path.into()))
                .collect(),
        )
    }
}

/// Capability set every server resource exposes: an identifier and links.
pub trait Resource: Serialize + DeserializeOwned + Send + Sync {
    /// Server-assigned identifier; `None` before creation.
    fn id(&self) -> Option<&str>;

    /// Links to related resources.
    fn links(&self) -> &Links;

    /// Resolve a named link or fail with [`ClientError::MissingLink`].
    ///
    /// # Errors
    ///
    /// Returns an error when the relation is absent.
    fn link(&self, relation: &str) -> ClientResult<&str> {
        self.links()
            .get(relation)
            .ok_or_else(|| ClientError::MissingLink {
                resource: self.id().unwrap_or("<unsaved>").to_string(),
                relation: relation.to_string(),
            })
    }
}

/// Server capability and version manifest served from `/api`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RootDocument {
    /// Product name reported by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    /// Server build version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// API schema version negotiated against the supported range.
    #[serde(default)]
    pub api_version: String,
    /// Entry points into the resource graph.
    #[serde(default)]
    pub links: Links,
}

impl Resource for RootDocument {
    fn id(&self) -> Option<&str> {
        None
    }

    fn links(&self) -> &Links {
        &self.links
    }

    fn link(&self, relation: &str) -> ClientResult<&str> {
        self.links
            .get(relation)
            .ok_or_else(|| ClientError::MissingLink {
                resource: "root document".to_string(),
                relation: relation.to_string(),
            })
    }
}

/// One page of a resource listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceCollection<T> {
    /// Resources on this page.
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    /// Total number of matching resources on the server.
    #[serde(default)]
    pub total_results: u64,
    /// Page size used by the server.
    #[serde(default)]
    pub items_per_page: u64,
    /// Paging links such as `Page.Next`.
    #[serde(default)]
    pub links: Links,
}

/// Server-reported state of a long-running task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Waiting for a worker.
    Queued,
    /// Running.
    Executing,
    /// Cancellation requested but not yet finished.
    Cancelling,
    /// Finished successfully.
    Success,
    /// Finished with an error.
    Failed,
    /// Stopped by the server after exceeding its own time limit.
    TimedOut,
    /// Cancelled before completion.
    Canceled,
    /// Not yet observed by the watcher, or a state this client does not know.
    #[default]
    #[serde(other)]
    Unknown,
}

impl TaskState {
    /// Whether the task will not change state again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::TimedOut | Self::Canceled
        )
    }

    /// Whether the task finished successfully.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Watcher-level phase: `Pending`, `Running`, `Succeeded`, `Failed`, or `Canceled`.
    #[must_use]
    pub const fn phase(self) -> &'static str {
        match self {
            Self::Unknown | Self::Queued => "Pending",
            Self::Executing | Self::Cancelling => "Running",
            Self::Success => "Succeeded",
            Self::Failed | Self::TimedOut => "Failed",
            Self::Canceled => "Canceled",
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Queued => "Queued",
            Self::Executing => "Executing",
            Self::Cancelling => "Cancelling",
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::TimedOut => "TimedOut",
            Self::Canceled => "Canceled",
        }
    }
}

impl Display for TaskState {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Server-side task as returned by a task link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskResource {
    /// Task identifier.
    pub id: String,
    /// Task kind, e.g. `Deploy`.
    #[serde(default)]
    pub name: Option<String>,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Current state.
    #[serde(default)]
    pub state: TaskState,
    /// Server-side completion flag.
    #[serde(default)]
    pub is_completed: bool,
    /// Failure summary, when the task failed.
    #[serde(default)]
    pub error_message: Option<String>,
    /// When the task started executing.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    #[serde(default)]
    pub completed_time: Option<DateTime<Utc>>,
    /// Related resources.
    #[serde(default)]
    pub links: Links,
}

impl Resource for TaskResource {
    fn id(&self) -> Option<&str> {
        Some(&self.id)
    }

    fn links(&self) -> &Links {
        &self.links
    }
}

/// In-flight task tracked by the deployment watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReference {
    /// Server task identifier.
    pub id: String,
    /// Display label, typically the target environment.
    pub label: String,
    /// Link to the task resource.
    pub link: String,
    /// Last known state.
    pub state: TaskState,
}

impl TaskReference {
    /// Reference a task whose state has not been observed yet.
    pub fn new(id: impl Into<String>, label: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            link: link.into(),
            state: TaskState::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn root_document_reads_pascal_case_payload() {
        let root: RootDocument = serde_json::from_value(json!({
            "Application": "Octopus Deploy",
            "Version": "2.6.5",
            "ApiVersion": "3.0.0",
            "Links": { "Projects": "/api/projects{/id}{?skip}" }
        }))
        .expect("root document");
        assert_eq!(root.api_version, "3.0.0");
        assert_eq!(root.link("Projects").ok(), Some("/api/projects{/id}{?skip}"));
        let err = root.link("Missing").expect_err("missing link");
        assert!(err.to_string().contains("root document"));
    }

    #[test]
    fn root_document_tolerates_missing_version() {
        let root: RootDocument = serde_json::from_value(json!({ "Links": {} })).expect("root");
        assert!(root.api_version.is_empty());
        assert!(root.links.is_empty());
    }

    #[test]
    fn task_state_maps_unknown_values() {
        let task: TaskResource = serde_json::from_value(json!({
            "Id": "ServerTasks-1",
            "State": "Paused",
            "Links": { "Self": "/api/tasks/ServerTasks-1" }
        }))
        .expect("task");
        assert_eq!(task.state, TaskState::Unknown);
        assert_eq!(task.link("Self").ok(), Some("/api/tasks/ServerTasks-1"));
    }

    #[test]
    fn task_state_reads_known_values_and_defaults_to_unknown() {
        let executing: TaskState = serde_json::from_value(json!("Executing")).expect("state");
        assert_eq!(executing, TaskState::Executing);
        let canceled: TaskState = serde_json::from_value(json!("Canceled")).expect("state");
        assert_eq!(canceled, TaskState::Canceled);
        assert_eq!(serde_json::to_value(TaskState::Success).expect("state"), json!("Success"));
        assert_eq!(TaskState::default(), TaskState::Unknown);

        let task: TaskResource =
            serde_json::from_value(json!({ "Id": "ServerTasks-2" })).expect("task");
        assert_eq!(task.state, TaskState::Unknown);
    }

    #[test]
    fn task_state_phases() {
        assert_eq!(TaskState::Queued.phase(), "Pending");
        assert_eq!(TaskState::Executing.phase(), "Running");
        assert_eq!(TaskState::Success.phase(), "Succeeded");
        assert_eq!(TaskState::TimedOut.phase(), "Failed");
        assert!(TaskState::Canceled.is_terminal());
        assert!(!TaskState::Cancelling.is_terminal());
        assert!(!TaskState::Failed.is_success());
    }

    #[test]
    fn collection_defaults_missing_fields() {
        let page: ResourceCollection<TaskResource> =
            serde_json::from_value(json!({ "TotalResults": 0 })).expect("collection");
        assert!(page.items.is_empty());
        assert_eq!(page.items_per_page, 0);
    }
}
