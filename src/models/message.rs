use super::payloads::*;
use crate::utils::{now_millis, now_utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The closed set of message kinds understood by client and server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    // Component lifecycle
    ComponentAdded,
    ComponentRemoved,
    StateChanged,
    /// Server -> client broadcast of the full context snapshot
    StateUpdated,

    // Filesystem
    FileModified,
    DirectoryChanged,

    // Project bookkeeping
    DependencyAdded,
    DocumentationUpdated,
    TestAdded,
    ConfigChanged,

    // Telemetry
    PerformanceMetric,
    UserInteraction,
    DataFlow,

    // Protocol level
    Error,
    Warning,
    Info,
    GetState,
    GetContext,
    UpdateContext,
    GetActionLog,

    // Project documents
    GetPlan,
    UpdatePlan,
    GetGuidelines,
    UpdateGuidelines,
}

impl MessageType {
    pub const ALL: [MessageType; 24] = [
        MessageType::ComponentAdded,
        MessageType::ComponentRemoved,
        MessageType::StateChanged,
        MessageType::StateUpdated,
        MessageType::FileModified,
        MessageType::DirectoryChanged,
        MessageType::DependencyAdded,
        MessageType::DocumentationUpdated,
        MessageType::TestAdded,
        MessageType::ConfigChanged,
        MessageType::PerformanceMetric,
        MessageType::UserInteraction,
        MessageType::DataFlow,
        MessageType::Error,
        MessageType::Warning,
        MessageType::Info,
        MessageType::GetState,
        MessageType::GetContext,
        MessageType::UpdateContext,
        MessageType::GetActionLog,
        MessageType::GetPlan,
        MessageType::UpdatePlan,
        MessageType::GetGuidelines,
        MessageType::UpdateGuidelines,
    ];

    /// Wire spelling of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::ComponentAdded => "COMPONENT_ADDED",
            MessageType::ComponentRemoved => "COMPONENT_REMOVED",
            MessageType::StateChanged => "STATE_CHANGED",
            MessageType::StateUpdated => "STATE_UPDATED",
            MessageType::FileModified => "FILE_MODIFIED",
            MessageType::DirectoryChanged => "DIRECTORY_CHANGED",
            MessageType::DependencyAdded => "DEPENDENCY_ADDED",
            MessageType::DocumentationUpdated => "DOCUMENTATION_UPDATED",
            MessageType::TestAdded => "TEST_ADDED",
            MessageType::ConfigChanged => "CONFIG_CHANGED",
            MessageType::PerformanceMetric => "PERFORMANCE_METRIC",
            MessageType::UserInteraction => "USER_INTERACTION",
            MessageType::DataFlow => "DATA_FLOW",
            MessageType::Error => "ERROR",
            MessageType::Warning => "WARNING",
            MessageType::Info => "INFO",
            MessageType::GetState => "GET_STATE",
            MessageType::GetContext => "GET_CONTEXT",
            MessageType::UpdateContext => "UPDATE_CONTEXT",
            MessageType::GetActionLog => "GET_ACTION_LOG",
            MessageType::GetPlan => "GET_PLAN",
            MessageType::UpdatePlan => "UPDATE_PLAN",
            MessageType::GetGuidelines => "GET_GUIDELINES",
            MessageType::UpdateGuidelines => "UPDATE_GUIDELINES",
        }
    }

    /// Read-only requests. They never mutate the context and are not logged.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            MessageType::GetState
                | MessageType::GetContext
                | MessageType::GetActionLog
                | MessageType::GetPlan
                | MessageType::GetGuidelines
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Invalid message type: {}", s))
    }
}

/// Message timestamp: either an ISO-8601 string or epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Iso(String),
}

impl Timestamp {
    pub fn now() -> Self {
        Timestamp::Iso(now_utc())
    }

    /// Epoch milliseconds, if the timestamp parses.
    pub fn as_millis(&self) -> Option<i64> {
        match self {
            Timestamp::Millis(ms) => Some(*ms),
            Timestamp::Iso(s) => crate::utils::time::parse_to_utc(s)
                .ok()
                .map(|dt| dt.timestamp_millis()),
        }
    }
}

/// Strongly typed payload, one variant per [`MessageType`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    ComponentAdded(ComponentAddedPayload),
    ComponentRemoved(ComponentRemovedPayload),
    StateChanged(StateChangedPayload),
    StateUpdated(Value),
    FileModified(FileModifiedPayload),
    DirectoryChanged(DirectoryChangedPayload),
    DependencyAdded(DependencyAddedPayload),
    DocumentationUpdated(DocumentationUpdatedPayload),
    TestAdded(TestAddedPayload),
    ConfigChanged(ConfigChangedPayload),
    PerformanceMetric(PerformancePayload),
    UserInteraction(UserInteractionPayload),
    DataFlow(DataFlowPayload),
    Error(ErrorPayload),
    Warning(NoticePayload),
    Info(NoticePayload),
    GetState,
    GetContext,
    UpdateContext(UpdateContextPayload),
    GetActionLog,
    GetPlan,
    UpdatePlan(PlanDocument),
    GetGuidelines,
    UpdateGuidelines(GuidelinesDocument),
}

impl Payload {
    pub fn kind(&self) -> MessageType {
        match self {
            Payload::ComponentAdded(_) => MessageType::ComponentAdded,
            Payload::ComponentRemoved(_) => MessageType::ComponentRemoved,
            Payload::StateChanged(_) => MessageType::StateChanged,
            Payload::StateUpdated(_) => MessageType::StateUpdated,
            Payload::FileModified(_) => MessageType::FileModified,
            Payload::DirectoryChanged(_) => MessageType::DirectoryChanged,
            Payload::DependencyAdded(_) => MessageType::DependencyAdded,
            Payload::DocumentationUpdated(_) => MessageType::DocumentationUpdated,
            Payload::TestAdded(_) => MessageType::TestAdded,
            Payload::ConfigChanged(_) => MessageType::ConfigChanged,
            Payload::PerformanceMetric(_) => MessageType::PerformanceMetric,
            Payload::UserInteraction(_) => MessageType::UserInteraction,
            Payload::DataFlow(_) => MessageType::DataFlow,
            Payload::Error(_) => MessageType::Error,
            Payload::Warning(_) => MessageType::Warning,
            Payload::Info(_) => MessageType::Info,
            Payload::GetState => MessageType::GetState,
            Payload::GetContext => MessageType::GetContext,
            Payload::UpdateContext(_) => MessageType::UpdateContext,
            Payload::GetActionLog => MessageType::GetActionLog,
            Payload::GetPlan => MessageType::GetPlan,
            Payload::UpdatePlan(_) => MessageType::UpdatePlan,
            Payload::GetGuidelines => MessageType::GetGuidelines,
            Payload::UpdateGuidelines(_) => MessageType::UpdateGuidelines,
        }
    }

    /// Decode the raw payload for `kind`.
    ///
    /// Query kinds ignore whatever payload was sent.
    pub fn from_parts(kind: MessageType, payload: Value) -> Result<Self, serde_json::Error> {
        use serde_json::from_value as decode;

        Ok(match kind {
            MessageType::ComponentAdded => Payload::ComponentAdded(decode(payload)?),
            MessageType::ComponentRemoved => Payload::ComponentRemoved(decode(payload)?),
            MessageType::StateChanged => Payload::StateChanged(decode(payload)?),
            MessageType::StateUpdated => Payload::StateUpdated(payload),
            MessageType::FileModified => Payload::FileModified(decode(payload)?),
            MessageType::DirectoryChanged => Payload::DirectoryChanged(decode(payload)?),
            MessageType::DependencyAdded => Payload::DependencyAdded(decode(payload)?),
            MessageType::DocumentationUpdated => Payload::DocumentationUpdated(decode(payload)?),
            MessageType::TestAdded => Payload::TestAdded(decode(payload)?),
            MessageType::ConfigChanged => Payload::ConfigChanged(decode(payload)?),
            MessageType::PerformanceMetric => Payload::PerformanceMetric(decode(payload)?),
            MessageType::UserInteraction => Payload::UserInteraction(decode(payload)?),
            MessageType::DataFlow => Payload::DataFlow(decode(payload)?),
            MessageType::Error => Payload::Error(decode(payload)?),
            MessageType::Warning => Payload::Warning(decode(payload)?),
            MessageType::Info => Payload::Info(decode(payload)?),
            MessageType::GetState => Payload::GetState,
            MessageType::GetContext => Payload::GetContext,
            MessageType::UpdateContext => Payload::UpdateContext(decode(payload)?),
            MessageType::GetActionLog => Payload::GetActionLog,
            MessageType::GetPlan => Payload::GetPlan,
            MessageType::UpdatePlan => Payload::UpdatePlan(decode(payload)?),
            MessageType::GetGuidelines => Payload::GetGuidelines,
            MessageType::UpdateGuidelines => Payload::UpdateGuidelines(decode(payload)?),
        })
    }

    /// Encode back to the raw wire payload.
    pub fn to_value(&self) -> Value {
        fn encode<T: Serialize>(payload: &T) -> Value {
            serde_json::to_value(payload).unwrap_or(Value::Null)
        }

        match self {
            Payload::ComponentAdded(p) => encode(p),
            Payload::ComponentRemoved(p) => encode(p),
            Payload::StateChanged(p) => encode(p),
            Payload::StateUpdated(v) => v.clone(),
            Payload::FileModified(p) => encode(p),
            Payload::DirectoryChanged(p) => encode(p),
            Payload::DependencyAdded(p) => encode(p),
            Payload::DocumentationUpdated(p) => encode(p),
            Payload::TestAdded(p) => encode(p),
            Payload::ConfigChanged(p) => encode(p),
            Payload::PerformanceMetric(p) => encode(p),
            Payload::UserInteraction(p) => encode(p),
            Payload::DataFlow(p) => encode(p),
            Payload::Error(p) => encode(p),
            Payload::Warning(p) | Payload::Info(p) => encode(p),
            Payload::UpdateContext(p) => encode(p),
            Payload::UpdatePlan(p) => encode(p),
            Payload::UpdateGuidelines(p) => encode(p),
            Payload::GetState
            | Payload::GetContext
            | Payload::GetActionLog
            | Payload::GetPlan
            | Payload::GetGuidelines => Value::Object(serde_json::Map::new()),
        }
    }
}

/// Raw wire envelope: `{type, payload, timestamp, source?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// A typed protocol message.
///
/// Built by the sender right before transmission and never mutated after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Envelope", into = "Envelope")]
pub struct Message {
    pub payload: Payload,
    pub timestamp: Timestamp,
    pub source: Option<String>,
}

impl Message {
    /// Create a message stamped with the current time.
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            timestamp: Timestamp::now(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> MessageType {
        self.payload.kind()
    }

    /// Timestamp in epoch millis, falling back to now for unparseable input.
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.as_millis().unwrap_or_else(now_millis)
    }
}

impl TryFrom<Envelope> for Message {
    type Error = String;

    fn try_from(envelope: Envelope) -> Result<Self, Self::Error> {
        let payload = Payload::from_parts(envelope.kind, envelope.payload)
            .map_err(|e| format!("Invalid payload for {}: {}", envelope.kind, e))?;
        Ok(Self {
            payload,
            timestamp: envelope.timestamp,
            source: envelope.source,
        })
    }
}

impl From<Message> for Envelope {
    fn from(message: Message) -> Self {
        Self {
            kind: message.kind(),
            payload: message.payload.to_value(),
            timestamp: message.timestamp,
            source: message.source,
        }
    }
}
