//! Structural and semantic validation of raw protocol messages.
//!
//! Runs on the parsed JSON before it is decoded into a typed [`Message`], so
//! every problem is reported at once as a readable string instead of the first
//! serde error. No I/O, never panics.
//!
//! [`Message`]: crate::models::Message

use crate::models::MessageType;
use crate::utils::time::{millis_to_utc, parse_to_utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// How a payload problem is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Ignore,
}

/// Policy knobs for [`validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    /// Payload absent or `null`
    pub missing_payload: Severity,
    /// Payload present but `{}` on a non-query type.
    ///
    /// Only controls the "Empty payload" notice. Field checks still run, and
    /// every non-query type has a required field, so `{}` is rejected with
    /// the field-specific error whatever this is set to.
    pub empty_payload: Severity,
    pub warn_missing_source: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            missing_payload: Severity::Error,
            empty_payload: Severity::Warning,
            warn_missing_source: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Resolve the `type` field of a raw message.
///
/// `Ok(None)` when the field is absent.
pub fn message_type(value: &Value) -> Result<Option<MessageType>, String> {
    match value.get("type") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s.parse::<MessageType>().map(Some),
        Some(other) => Err(format!("Invalid message type: {}", other)),
    }
}

/// Validate a raw message against the schema.
pub fn validate(value: &Value, options: &ValidationOptions) -> ValidationReport {
    let mut report = Report::default();

    let Some(obj) = value.as_object() else {
        report.error("Message must be a JSON object".to_string());
        return report.finish();
    };

    let kind = match message_type(value) {
        Ok(Some(kind)) => Some(kind),
        Ok(None) => {
            report.error("Missing required field: type".to_string());
            None
        }
        Err(e) => {
            report.error(e);
            None
        }
    };

    match obj.get("timestamp") {
        None | Some(Value::Null) => report.error("Missing required field: timestamp".to_string()),
        Some(ts) => {
            if !timestamp_is_valid(ts) {
                report.error(format!("Invalid timestamp format: {}", ts));
            }
        }
    }

    match obj.get("source") {
        None | Some(Value::Null) => {
            if options.warn_missing_source {
                report.warn("Missing source identifier".to_string());
            }
        }
        Some(Value::String(_)) => {}
        Some(_) => report.error("source must be a string".to_string()),
    }

    let Some(kind) = kind else {
        return report.finish();
    };

    // Query payloads are ignored entirely.
    if kind.is_query() {
        return report.finish();
    }

    let payload = match obj.get("payload") {
        None | Some(Value::Null) => {
            report.apply(
                options.missing_payload,
                format!("Missing required field: payload for {}", kind),
            );
            return report.finish();
        }
        Some(Value::Object(map)) => map,
        Some(_) => {
            report.error(format!("payload must be an object for {}", kind));
            return report.finish();
        }
    };

    if payload.is_empty() {
        report.apply(options.empty_payload, format!("Empty payload for {}", kind));
    }

    check_payload(kind, &mut Fields { payload, kind, report: &mut report });
    report.finish()
}

fn timestamp_is_valid(ts: &Value) -> bool {
    match ts {
        Value::String(s) => parse_to_utc(s).is_ok(),
        Value::Number(n) => n.as_i64().map(|ms| millis_to_utc(ms).is_ok()).unwrap_or(false),
        _ => false,
    }
}

fn check_payload(kind: MessageType, f: &mut Fields<'_>) {
    match kind {
        MessageType::ComponentAdded => {
            f.non_empty_string("componentName");
            f.string("filePath");
            f.string_array("dependencies", true);
        }
        MessageType::ComponentRemoved => {
            f.non_empty_string("componentName");
        }
        MessageType::StateChanged => {
            f.non_empty_string("componentName");
            f.non_empty_string("stateKey");
        }
        MessageType::StateUpdated => {}
        MessageType::FileModified => {
            f.non_empty_string("filePath");
            f.optional_string("summary");
            f.string_array("changes", false);
        }
        MessageType::DirectoryChanged => {
            f.non_empty_string("directoryPath");
            f.optional_one_of("changeType", &["created", "deleted", "renamed", "modified"]);
            f.optional_string("oldPath");
            f.optional_string("newPath");
        }
        MessageType::DependencyAdded => {
            f.non_empty_string("name");
            f.non_empty_string("version");
            f.optional_one_of("type", &["production", "development"]);
        }
        MessageType::DocumentationUpdated => {
            f.non_empty_string("file");
            f.one_of("type", &["added", "modified", "deleted"]);
            f.optional_string("summary");
        }
        MessageType::TestAdded => {
            f.non_empty_string("filePath");
            f.one_of("testType", &["unit", "integration", "e2e"]);
            f.optional_range("coverage", 0.0, 100.0);
        }
        MessageType::ConfigChanged => {
            f.non_empty_string("file");
            f.object("changes");
        }
        MessageType::PerformanceMetric => {
            f.non_empty_string("componentName");
            f.non_negative("renderTime");
            f.non_negative("mountTime");
            f.non_negative("updateTime");
        }
        MessageType::UserInteraction => {
            f.non_empty_string("componentName");
            f.non_empty_string("action");
        }
        MessageType::DataFlow => {
            f.non_empty_string("source");
            f.non_empty_string("target");
        }
        MessageType::Error => {
            f.non_empty_string("error");
        }
        MessageType::Warning | MessageType::Info => {
            f.non_empty_string("message");
        }
        MessageType::UpdateContext => {
            let has_components = f.optional_object("components");
            let has_state = f.optional_object("state");
            if !has_components && !has_state {
                f.report.error(format!(
                    "components or state is required for {}",
                    f.kind
                ));
            }
        }
        MessageType::UpdatePlan => {
            f.array("steps");
            f.string("lastUpdated");
        }
        MessageType::UpdateGuidelines => {
            f.array("rules");
            f.string("lastUpdated");
        }
        MessageType::GetState
        | MessageType::GetContext
        | MessageType::GetActionLog
        | MessageType::GetPlan
        | MessageType::GetGuidelines => {}
    }
}

#[derive(Default)]
struct Report {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl Report {
    fn error(&mut self, message: String) {
        self.errors.push(message);
    }

    fn warn(&mut self, message: String) {
        self.warnings.push(message);
    }

    fn apply(&mut self, severity: Severity, message: String) {
        match severity {
            Severity::Error => self.error(message),
            Severity::Warning => self.warn(message),
            Severity::Ignore => {}
        }
    }

    fn finish(self) -> ValidationReport {
        ValidationReport {
            is_valid: self.errors.is_empty(),
            errors: self.errors,
            warnings: self.warnings,
        }
    }
}

/// Field checks against one payload object.
struct Fields<'a> {
    payload: &'a Map<String, Value>,
    kind: MessageType,
    report: &'a mut Report,
}

impl<'a> Fields<'a> {
    fn present(&mut self, field: &str) -> Option<&'a Value> {
        let payload = self.payload;
        match payload.get(field) {
            None | Some(Value::Null) => {
                self.report
                    .error(format!("{} is required for {}", field, self.kind));
                None
            }
            Some(v) => Some(v),
        }
    }

    fn wrong_type(&mut self, field: &str, expected: &str) {
        self.report
            .error(format!("{} must be {} for {}", field, expected, self.kind));
    }

    fn string(&mut self, field: &str) {
        if let Some(v) = self.present(field) {
            if !v.is_string() {
                self.wrong_type(field, "a string");
            }
        }
    }

    fn non_empty_string(&mut self, field: &str) {
        let Some(v) = self.present(field) else { return };
        match v.as_str() {
            Some(s) if s.trim().is_empty() => self.wrong_type(field, "a non-empty string"),
            Some(_) => {}
            None => self.wrong_type(field, "a string"),
        }
    }

    fn optional_string(&mut self, field: &str) {
        let payload = self.payload;
        if let Some(v) = payload.get(field) {
            if !v.is_null() && !v.is_string() {
                self.wrong_type(field, "a string");
            }
        }
    }

    fn array(&mut self, field: &str) {
        if let Some(v) = self.present(field) {
            if !v.is_array() {
                self.wrong_type(field, "an array");
            }
        }
    }

    fn string_array(&mut self, field: &str, required: bool) {
        let payload = self.payload;
        let value = if required {
            self.present(field)
        } else {
            payload.get(field).filter(|v| !v.is_null())
        };
        let Some(v) = value else { return };
        match v.as_array() {
            Some(items) if items.iter().all(Value::is_string) => {}
            _ => self.wrong_type(field, "an array of strings"),
        }
    }

    fn object(&mut self, field: &str) {
        if let Some(v) = self.present(field) {
            if !v.is_object() {
                self.wrong_type(field, "an object");
            }
        }
    }

    /// Returns whether the field is present.
    fn optional_object(&mut self, field: &str) -> bool {
        let payload = self.payload;
        match payload.get(field) {
            None | Some(Value::Null) => false,
            Some(v) => {
                if !v.is_object() {
                    self.wrong_type(field, "an object");
                }
                true
            }
        }
    }

    fn one_of(&mut self, field: &str, allowed: &[&str]) {
        if let Some(v) = self.present(field) {
            let ok = v.as_str().map(|s| allowed.contains(&s)).unwrap_or(false);
            if !ok {
                self.wrong_type(field, &format!("one of {}", allowed.join("|")));
            }
        }
    }

    fn optional_one_of(&mut self, field: &str, allowed: &[&str]) {
        if self.payload.get(field).is_some_and(|v| !v.is_null()) {
            self.one_of(field, allowed);
        }
    }

    fn non_negative(&mut self, field: &str) {
        if let Some(v) = self.present(field) {
            match v.as_f64() {
                Some(n) if n >= 0.0 => {}
                _ => self.wrong_type(field, "a non-negative number"),
            }
        }
    }

    fn optional_range(&mut self, field: &str, min: f64, max: f64) {
        let payload = self.payload;
        let Some(v) = payload.get(field).filter(|v| !v.is_null()) else {
            return;
        };
        match v.as_f64() {
            Some(n) if (min..=max).contains(&n) => {}
            _ => self.wrong_type(field, &format!("a number between {} and {}", min, max)),
        }
    }
}
