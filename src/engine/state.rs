use super::events::ServerEvent;
use crate::models::*;
use crate::utils::now_utc;
use serde_json::{json, Map, Value};

/// Result of folding one action into the project state.
#[derive(Debug, Default)]
pub struct Applied {
    /// Domain event to publish, if any
    pub event: Option<ServerEvent>,
    /// Whether the context changed (and `lastUpdated` moved)
    pub mutated: bool,
}

impl Applied {
    fn mutated(event: ServerEvent) -> Self {
        Self {
            event: Some(event),
            mutated: true,
        }
    }
}

/// In-memory project state: the context plus the plan and guidelines
/// documents that sit next to it.
#[derive(Debug, Clone, Default)]
pub struct ProjectState {
    pub context: ProjectContext,
    pub plan: PlanDocument,
    pub guidelines: GuidelinesDocument,
}

impl ProjectState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer a read-only request.
    ///
    /// `GET_ACTION_LOG` is answered by the engine, which owns the log.
    pub fn query(&self, kind: MessageType) -> Option<Value> {
        match kind {
            MessageType::GetState => Some(json!({
                "state": self.context.state,
                "repository": self.context.repository,
                "lastUpdated": self.context.last_updated,
            })),
            MessageType::GetContext => serde_json::to_value(&self.context).ok(),
            MessageType::GetPlan => serde_json::to_value(&self.plan).ok(),
            MessageType::GetGuidelines => serde_json::to_value(&self.guidelines).ok(),
            _ => None,
        }
    }

    /// Apply one accepted, non-query message.
    pub fn apply(&mut self, message: &Message) -> Result<Applied, String> {
        let received_at = message.timestamp_millis();
        let ctx = &mut self.context;

        let applied = match &message.payload {
            Payload::ComponentAdded(p) => {
                ctx.components.insert(
                    p.component_name.clone(),
                    ComponentRecord {
                        file_path: p.file_path.clone(),
                        dependencies: p.dependencies.clone(),
                    },
                );
                Applied::mutated(ServerEvent::ComponentAdded {
                    name: p.component_name.clone(),
                })
            }
            Payload::ComponentRemoved(p) => {
                if ctx.components.remove(&p.component_name).is_none() {
                    log::warn!("COMPONENT_REMOVED for unknown component {}", p.component_name);
                }
                ctx.performance.remove(&p.component_name);
                Applied::mutated(ServerEvent::ComponentRemoved {
                    name: p.component_name.clone(),
                })
            }
            Payload::StateChanged(p) => {
                let slot = ctx
                    .state
                    .entry(p.component_name.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(component_state) = slot {
                    component_state.insert(
                        p.state_key.clone(),
                        p.new_value.clone().unwrap_or(Value::Null),
                    );
                }
                Applied::mutated(ServerEvent::StateChanged {
                    component_name: p.component_name.clone(),
                    state_key: p.state_key.clone(),
                })
            }
            Payload::StateUpdated(_) => {
                return Err(
                    "STATE_UPDATED is sent by the server and cannot be applied".to_string(),
                );
            }
            Payload::FileModified(p) => {
                ctx.repository.modified_files.insert(
                    p.file_path.clone(),
                    FileChangeRecord {
                        summary: p.summary.clone(),
                        changes: p.changes.clone(),
                        timestamp: received_at,
                    },
                );
                Applied {
                    event: None,
                    mutated: true,
                }
            }
            Payload::DirectoryChanged(p) => {
                ctx.repository.directory_changes.insert(
                    p.directory_path.clone(),
                    DirectoryChangeRecord {
                        change_type: p.change_type,
                        old_path: p.old_path.clone(),
                        new_path: p.new_path.clone(),
                        timestamp: received_at,
                    },
                );
                Applied {
                    event: None,
                    mutated: true,
                }
            }
            Payload::DependencyAdded(p) => {
                ctx.dependencies.insert(
                    p.name.clone(),
                    DependencyRecord {
                        version: p.version.clone(),
                        kind: p.kind,
                    },
                );
                Applied::mutated(ServerEvent::DependencyAdded {
                    name: p.name.clone(),
                    version: p.version.clone(),
                })
            }
            Payload::DocumentationUpdated(p) => {
                ctx.documentation.insert(
                    p.file.clone(),
                    DocumentationRecord {
                        change: p.change,
                        summary: p.summary.clone(),
                    },
                );
                Applied::mutated(ServerEvent::DocumentationUpdated {
                    file: p.file.clone(),
                })
            }
            Payload::TestAdded(p) => {
                ctx.tests.insert(
                    p.file_path.clone(),
                    TestRecord {
                        test_type: p.test_type,
                        coverage: p.coverage,
                    },
                );
                Applied {
                    event: None,
                    mutated: true,
                }
            }
            Payload::ConfigChanged(p) => {
                let merged = ctx.config.entry(p.file.clone()).or_default();
                for (key, value) in &p.changes {
                    merged.insert(key.clone(), value.clone());
                }
                Applied {
                    event: None,
                    mutated: true,
                }
            }
            Payload::PerformanceMetric(p) => {
                ctx.performance.insert(
                    p.component_name.clone(),
                    PerformanceSample {
                        render_time: p.render_time,
                        mount_time: p.mount_time,
                        update_time: p.update_time,
                        timestamp: received_at,
                    },
                );
                Applied {
                    event: None,
                    mutated: true,
                }
            }
            Payload::UpdateContext(p) => {
                // Decode everything before touching the context so a bad
                // entry leaves it unchanged.
                let records = p
                    .components
                    .iter()
                    .flatten()
                    .map(|(name, value)| {
                        serde_json::from_value::<ComponentRecord>(value.clone())
                            .map(|record| (name.clone(), record))
                            .map_err(|e| format!("Invalid component '{}': {}", name, e))
                    })
                    .collect::<Result<Vec<_>, String>>()?;
                ctx.components.extend(records);
                if let Some(state) = &p.state {
                    for (key, value) in state {
                        ctx.state.insert(key.clone(), value.clone());
                    }
                }
                Applied::mutated(ServerEvent::ContextUpdated)
            }
            Payload::UpdatePlan(plan) => {
                self.plan = plan.clone();
                Applied::mutated(ServerEvent::PlanUpdated)
            }
            Payload::UpdateGuidelines(guidelines) => {
                self.guidelines = guidelines.clone();
                Applied::mutated(ServerEvent::GuidelinesUpdated)
            }

            // Recorded in the action log only
            Payload::UserInteraction(_) | Payload::DataFlow(_) => Applied::default(),
            Payload::Error(p) => Applied {
                event: Some(ServerEvent::ClientNotice {
                    kind: MessageType::Error,
                    message: p.error.clone(),
                }),
                mutated: false,
            },
            Payload::Warning(p) | Payload::Info(p) => Applied {
                event: Some(ServerEvent::ClientNotice {
                    kind: message.kind(),
                    message: p.message.clone(),
                }),
                mutated: false,
            },

            Payload::GetState
            | Payload::GetContext
            | Payload::GetActionLog
            | Payload::GetPlan
            | Payload::GetGuidelines => {
                return Err(format!("{} is a query and cannot be applied", message.kind()));
            }
        };

        if applied.mutated {
            self.context.last_updated = Some(now_utc());
        }
        Ok(applied)
    }
}
