use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// Payload structs are camelCase on the wire. Semantic checks (non-empty names,
// numeric ranges) live in the validator; these types only fix the shape.

/// Payload for COMPONENT_ADDED
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentAddedPayload {
    pub component_name: String,
    pub file_path: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Payload for COMPONENT_REMOVED
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRemovedPayload {
    pub component_name: String,
}

/// Payload for STATE_CHANGED
///
/// Sets `state[componentName][stateKey] = newValue` in the project context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangedPayload {
    pub component_name: String,
    pub state_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileModifiedPayload {
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryChangeType {
    Created,
    Deleted,
    Renamed,
    Modified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryChangedPayload {
    pub directory_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_type: Option<DirectoryChangeType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    #[default]
    Production,
    Development,
}

/// Payload for DEPENDENCY_ADDED
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyAddedPayload {
    pub name: String,
    pub version: String,
    /// Defaults to `production` when omitted
    #[serde(rename = "type", default)]
    pub kind: DependencyKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentationChange {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentationUpdatedPayload {
    pub file: String,
    #[serde(rename = "type")]
    pub change: DocumentationChange,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    Unit,
    Integration,
    E2e,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAddedPayload {
    pub file_path: String,
    pub test_type: TestType,
    /// Percentage in `0..=100`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigChangedPayload {
    pub file: String,
    pub changes: Map<String, Value>,
}

/// Payload for PERFORMANCE_METRIC. All times are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformancePayload {
    pub component_name: String,
    pub render_time: f64,
    pub mount_time: f64,
    pub update_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInteractionPayload {
    pub component_name: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlowPayload {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Payload shared by WARNING and INFO
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoticePayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Payload for UPDATE_CONTEXT. Both maps are merged key by key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UpdateContextPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Map<String, Value>>,
}

/// Project plan document.
///
/// Only `steps` and `lastUpdated` are fixed; any other field is kept as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanDocument {
    pub steps: Vec<Value>,
    pub last_updated: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for PlanDocument {
    /// `{objectives: [], steps: [], lastUpdated: null}`
    fn default() -> Self {
        let mut extra = Map::new();
        extra.insert("objectives".to_string(), Value::Array(Vec::new()));
        Self {
            steps: Vec::new(),
            last_updated: None,
            extra,
        }
    }
}

/// Project guidelines document. Same layout rules as [`PlanDocument`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuidelinesDocument {
    pub rules: Vec<Value>,
    pub last_updated: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dependency_kind_defaults_to_production() {
        let p: DependencyAddedPayload =
            serde_json::from_value(json!({"name": "react", "version": "18.2.0"})).unwrap();
        assert_eq!(p.kind, DependencyKind::Production);

        let p: DependencyAddedPayload = serde_json::from_value(
            json!({"name": "vitest", "version": "1.0.0", "type": "development"}),
        )
        .unwrap();
        assert_eq!(p.kind, DependencyKind::Development);
    }

    #[test]
    fn test_plan_keeps_extra_fields() {
        let plan: PlanDocument = serde_json::from_value(json!({
            "objectives": ["ship"],
            "steps": [{"id": 1}],
            "lastUpdated": "2024-01-01T00:00:00.000Z",
            "owner": "team"
        }))
        .unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.extra["owner"], "team");

        let back = serde_json::to_value(&plan).unwrap();
        assert_eq!(back["objectives"], json!(["ship"]));
        assert_eq!(back["lastUpdated"], "2024-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_default_documents() {
        assert_eq!(
            serde_json::to_value(PlanDocument::default()).unwrap(),
            json!({"objectives": [], "steps": [], "lastUpdated": null})
        );
        assert_eq!(
            serde_json::to_value(GuidelinesDocument::default()).unwrap(),
            json!({"rules": [], "lastUpdated": null})
        );
    }

    #[test]
    fn test_test_type_spelling() {
        let p: TestAddedPayload =
            serde_json::from_value(json!({"filePath": "a.test.ts", "testType": "e2e"})).unwrap();
        assert_eq!(p.test_type, TestType::E2e);
        assert!(p.coverage.is_none());
    }
}
