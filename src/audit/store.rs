//! JSON files behind the audit surface.
//!
//! ```text
//! {data_dir}/plan.json        project plan document
//! {data_dir}/guidelines.json  guidelines document
//! {data_dir}/audit.json       append-only array of audit entries
//! ```
//!
//! Unreadable or missing files read as their fallback value. Every write
//! holds the store lock, so concurrent appends never lose entries, and goes
//! through a sibling `.tmp` file renamed into place.

use crate::config::AuditConfig;
use crate::models::{GuidelinesDocument, PlanDocument};
use crate::structure::{snapshot, ScanOptions, TreeNode};
use crate::utils::now_utc;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

const PLAN_FILE: &str = "plan.json";
const GUIDELINES_FILE: &str = "guidelines.json";
const AUDIT_FILE: &str = "audit.json";
const README_FILE: &str = "README.md";

/// Actor recorded for `/logPrompt`
pub const USER_ACTOR: &str = "USER";

pub struct AuditStore {
    data_dir: PathBuf,
    project_root: PathBuf,
    assistant_actor: String,
    lock: Mutex<()>,
}

impl AuditStore {
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            data_dir: config.data_dir.clone(),
            project_root: config.project_root.clone(),
            assistant_actor: config.assistant_actor.clone(),
            lock: Mutex::new(()),
        }
    }

    pub async fn plan(&self) -> Value {
        read_json(&self.data_dir.join(PLAN_FILE), || to_value(&PlanDocument::default())).await
    }

    /// Store a new plan, stamping `lastUpdated`, and record `SET_PLAN`.
    pub async fn set_plan(&self, plan: Map<String, Value>) -> Result<Value, String> {
        self.set_document(PLAN_FILE, "SET_PLAN", plan).await
    }

    pub async fn guidelines(&self) -> Value {
        read_json(&self.data_dir.join(GUIDELINES_FILE), || {
            to_value(&GuidelinesDocument::default())
        })
        .await
    }

    /// Store new guidelines, stamping `lastUpdated`, and record
    /// `SET_GUIDELINES`.
    pub async fn set_guidelines(&self, guidelines: Map<String, Value>) -> Result<Value, String> {
        self.set_document(GUIDELINES_FILE, "SET_GUIDELINES", guidelines)
            .await
    }

    async fn set_document(
        &self,
        file: &str,
        action: &str,
        mut document: Map<String, Value>,
    ) -> Result<Value, String> {
        let _guard = self.lock.lock().await;

        document.insert("lastUpdated".to_string(), Value::String(now_utc()));
        let document = Value::Object(document);
        write_json(&self.data_dir.join(file), &document).await?;

        let mut entry = Map::new();
        entry.insert("action".to_string(), Value::String(action.to_string()));
        entry.insert("details".to_string(), document.clone());
        self.append_locked(entry).await?;

        log::info!("Stored {} ({})", file, action);
        Ok(document)
    }

    /// The audit log, oldest first.
    pub async fn audit_log(&self) -> Value {
        read_json(&self.data_dir.join(AUDIT_FILE), || Value::Array(Vec::new())).await
    }

    /// Append an entry, overwriting its `timestamp` with the current time.
    pub async fn append(&self, entry: Map<String, Value>) -> Result<Value, String> {
        let _guard = self.lock.lock().await;
        self.append_locked(entry).await
    }

    pub async fn log_prompt(&self, content: Value) -> Result<Value, String> {
        self.append(conversation_entry("USER_PROMPT", USER_ACTOR, content))
            .await
    }

    pub async fn log_response(&self, content: Value) -> Result<Value, String> {
        self.append(conversation_entry(
            "ASSISTANT_RESPONSE",
            &self.assistant_actor,
            content,
        ))
        .await
    }

    async fn append_locked(&self, mut entry: Map<String, Value>) -> Result<Value, String> {
        entry.insert("timestamp".to_string(), Value::String(now_utc()));
        let entry = Value::Object(entry);

        let path = self.data_dir.join(AUDIT_FILE);
        let mut log = match read_json(&path, || Value::Array(Vec::new())).await {
            Value::Array(entries) => entries,
            _ => {
                log::warn!("{} is not an array, starting a new log", path.display());
                Vec::new()
            }
        };
        log.push(entry.clone());
        write_json(&path, &Value::Array(log)).await?;
        Ok(entry)
    }

    /// README of the project root, if it can be read.
    pub async fn readme(&self) -> Option<String> {
        fs::read_to_string(self.project_root.join(README_FILE))
            .await
            .ok()
    }

    /// Directory tree of the project root.
    pub async fn structure(&self) -> Result<Vec<TreeNode>, String> {
        let root = self.project_root.clone();
        tokio::task::spawn_blocking(move || snapshot(&root, &ScanOptions::default()))
            .await
            .map_err(|e| format!("Snapshot task failed: {}", e))?
    }
}

fn conversation_entry(kind: &str, actor: &str, content: Value) -> Map<String, Value> {
    let mut entry = Map::new();
    entry.insert("type".to_string(), json!(kind));
    entry.insert("actor".to_string(), json!(actor));
    entry.insert("content".to_string(), content);
    entry
}

fn to_value<T: Serialize>(document: &T) -> Value {
    serde_json::to_value(document).unwrap_or(Value::Null)
}

async fn read_json(path: &Path, fallback: impl FnOnce() -> Value) -> Value {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(_) => return fallback(),
    };
    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("Ignoring unparseable {}: {}", path.display(), e);
            fallback()
        }
    }
}

async fn write_json(path: &Path, value: &Value) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }

    let content = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize {}: {}", path.display(), e))?;

    // Readers see either the old file or the new one, never a partial write.
    let staging = staging_path(path);
    fs::write(&staging, content)
        .await
        .map_err(|e| format!("Failed to write {}: {}", staging.display(), e))?;
    if let Err(e) = fs::rename(&staging, path).await {
        let _ = fs::remove_file(&staging).await;
        return Err(format!("Failed to replace {}: {}", path.display(), e));
    }
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> AuditStore {
        AuditStore::new(&AuditConfig {
            data_dir: temp_dir.path().join("data"),
            project_root: temp_dir.path().to_path_buf(),
            ..AuditConfig::default()
        })
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {}", other),
        }
    }

    #[tokio::test]
    async fn test_fallbacks_when_missing() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        assert_eq!(
            store.plan().await,
            json!({"objectives": [], "steps": [], "lastUpdated": null})
        );
        assert_eq!(store.guidelines().await, json!({"rules": [], "lastUpdated": null}));
        assert_eq!(store.audit_log().await, json!([]));
        assert!(store.readme().await.is_none());
    }

    #[tokio::test]
    async fn test_set_plan_stamps_and_audits() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        let stored = store
            .set_plan(object(json!({"objectives": ["ship"], "steps": []})))
            .await
            .unwrap();
        assert!(stored["lastUpdated"].is_string());
        assert_eq!(store.plan().await, stored);

        let log = store.audit_log().await;
        assert_eq!(log.as_array().unwrap().len(), 1);
        assert_eq!(log[0]["action"], "SET_PLAN");
        assert_eq!(log[0]["details"]["objectives"], json!(["ship"]));
        assert!(log[0]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_conversation_entries() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);

        store.log_prompt(json!("hello")).await.unwrap();
        store.log_response(json!("hi")).await.unwrap();

        let log = store.audit_log().await;
        assert_eq!(log[0]["type"], "USER_PROMPT");
        assert_eq!(log[0]["actor"], "USER");
        assert_eq!(log[1]["type"], "ASSISTANT_RESPONSE");
        assert_eq!(log[1]["actor"], "ASSISTANT");
        assert_eq!(log[1]["content"], "hi");
    }

    #[tokio::test]
    async fn test_corrupt_log_is_restarted() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        std::fs::create_dir_all(temp_dir.path().join("data")).unwrap();
        std::fs::write(temp_dir.path().join("data/audit.json"), "{not json").unwrap();

        assert_eq!(store.audit_log().await, json!([]));
        store.append(object(json!({"action": "NOTE"}))).await.unwrap();
        assert_eq!(store.audit_log().await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_writes_replace_files_whole() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let data = temp_dir.path().join("data");
        std::fs::create_dir_all(&data).unwrap();
        // Leftover from an interrupted write.
        std::fs::write(data.join("audit.json.tmp"), "[{\"action\":").unwrap();

        for n in 0..3 {
            store.append(object(json!({"action": "NOTE", "n": n}))).await.unwrap();
        }
        store.set_guidelines(object(json!({"rules": ["a"]}))).await.unwrap();

        let log: Value =
            serde_json::from_str(&std::fs::read_to_string(data.join("audit.json")).unwrap())
                .unwrap();
        assert_eq!(log.as_array().unwrap().len(), 4);
        assert_eq!(log[2]["n"], 2);
        assert!(!data.join("audit.json.tmp").exists());
        assert!(!data.join("guidelines.json.tmp").exists());

        let mut names: Vec<String> = std::fs::read_dir(&data)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["audit.json", "guidelines.json"]);
    }

    #[test]
    fn test_staging_path_is_a_sibling() {
        assert_eq!(
            staging_path(Path::new("/data/audit.json")),
            PathBuf::from("/data/audit.json.tmp")
        );
    }
}
