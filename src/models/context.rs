use super::message::MessageType;
use super::payloads::{
    DependencyKind, DirectoryChangeType, DocumentationChange, TestType,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecord {
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub version: String,
    #[serde(rename = "type")]
    pub kind: DependencyKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentationRecord {
    pub change: DocumentationChange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecord {
    pub test_type: TestType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
}

/// Latest performance sample for a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSample {
    pub render_time: f64,
    pub mount_time: f64,
    pub update_time: f64,
    /// Epoch millis of the message that carried the sample
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChangeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub changes: Vec<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryChangeRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_type: Option<DirectoryChangeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_path: Option<String>,
    pub timestamp: i64,
}

/// Repository-level activity, latest record per path.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryActivity {
    pub modified_files: BTreeMap<String, FileChangeRecord>,
    pub directory_changes: BTreeMap<String, DirectoryChangeRecord>,
}

/// The server's aggregate model of the observed project.
///
/// Owned by the engine actor; everything outside it works on clones.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    pub components: BTreeMap<String, ComponentRecord>,
    pub dependencies: BTreeMap<String, DependencyRecord>,
    pub documentation: BTreeMap<String, DocumentationRecord>,
    pub tests: BTreeMap<String, TestRecord>,
    pub config: BTreeMap<String, Map<String, Value>>,
    pub performance: BTreeMap<String, PerformanceSample>,
    /// Free-form bag, `state[component][key]` for STATE_CHANGED
    pub state: Map<String, Value>,
    pub repository: RepositoryActivity,
    /// RFC 3339 time of the last mutation, `None` until the first one
    pub last_updated: Option<String>,
}

/// One accepted action, as recorded in the action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    /// uuid v4
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Epoch millis
    pub timestamp: i64,
    pub payload: Value,
}

impl ActionLogEntry {
    pub fn new(kind: MessageType, timestamp: i64, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            timestamp,
            payload,
        }
    }
}
