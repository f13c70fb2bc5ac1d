use super::action_log::ActionLog;
use super::events::ServerEvent;
use super::state::ProjectState;
use crate::models::{
    ActionLogEntry, GuidelinesDocument, Message, MessageType, PlanDocument, ProjectContext,
};
use crate::utils::now_millis;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};

/// What the engine hands back for one dispatched message.
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    /// Response `data` for the sender
    pub data: Option<Value>,
    /// Log entry for actions, `None` for queries
    pub entry: Option<ActionLogEntry>,
    /// Whether the context changed
    pub mutated: bool,
}

/// Messages that can be sent to the engine actor.
#[derive(Debug)]
pub enum EngineMessage {
    /// Apply an accepted message (action or query)
    Apply {
        message: Message,
        response: oneshot::Sender<Result<HandlerOutcome, String>>,
    },
    /// Clone of the current project context
    GetContext {
        response: oneshot::Sender<ProjectContext>,
    },
    /// Clone of the action log, oldest first
    GetActionLog {
        response: oneshot::Sender<Vec<ActionLogEntry>>,
    },
    GetDocuments {
        response: oneshot::Sender<(PlanDocument, GuidelinesDocument)>,
    },
    /// Shutdown the actor
    Shutdown,
}

/// Actor that owns the project state and the action log.
///
/// Messages are processed one at a time from the mailbox, so handlers never
/// race with each other no matter how many connections feed the engine.
pub struct ContextEngineActor {
    state: ProjectState,
    log: ActionLog,
    events: Option<broadcast::Sender<ServerEvent>>,
    mailbox: mpsc::UnboundedReceiver<EngineMessage>,
}

impl ContextEngineActor {
    pub fn new(
        max_log_size: usize,
        events: Option<broadcast::Sender<ServerEvent>>,
        mailbox: mpsc::UnboundedReceiver<EngineMessage>,
    ) -> Self {
        Self {
            state: ProjectState::new(),
            log: ActionLog::new(max_log_size),
            events,
            mailbox,
        }
    }

    /// Run the actor's main loop until Shutdown or until every handle is gone.
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                EngineMessage::Apply { message, response } => {
                    let result = self.process(message);
                    let _ = response.send(result);
                }
                EngineMessage::GetContext { response } => {
                    let _ = response.send(self.state.context.clone());
                }
                EngineMessage::GetActionLog { response } => {
                    let _ = response.send(self.log.entries());
                }
                EngineMessage::GetDocuments { response } => {
                    let _ = response.send((self.state.plan.clone(), self.state.guidelines.clone()));
                }
                EngineMessage::Shutdown => {
                    break;
                }
            }
        }
        log::debug!("Engine actor stopped");
    }

    /// Dispatch one message.
    ///
    /// Queries read state. Actions mutate state, then get one log entry.
    /// A failed handler leaves both untouched.
    fn process(&mut self, message: Message) -> Result<HandlerOutcome, String> {
        let kind = message.kind();

        if kind.is_query() {
            let data = match kind {
                MessageType::GetActionLog => serde_json::to_value(self.log.entries())
                    .map_err(|e| format!("Failed to encode action log: {}", e))?,
                _ => self
                    .state
                    .query(kind)
                    .ok_or_else(|| format!("No query handler for {}", kind))?,
            };
            return Ok(HandlerOutcome {
                data: Some(data),
                entry: None,
                mutated: false,
            });
        }

        let applied = self.state.apply(&message)?;

        let entry = ActionLogEntry::new(kind, now_millis(), message.payload.to_value());
        if let Some(evicted) = self.log.push(entry.clone()) {
            log::debug!("Action log full, evicted {} ({})", evicted.id, evicted.kind);
        }
        log::info!("Processed {} ({})", kind, entry.id);

        self.emit(ServerEvent::ActionProcessed(entry.clone()));
        if let Some(event) = applied.event {
            self.emit(event);
        }

        Ok(HandlerOutcome {
            data: Some(json!({ "actionId": entry.id })),
            entry: Some(entry),
            mutated: applied.mutated,
        })
    }

    fn emit(&self, event: ServerEvent) {
        if let Some(events) = &self.events {
            // No subscribers is not an error.
            let _ = events.send(event);
        }
    }
}

/// Handle for talking to the engine actor.
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::UnboundedSender<EngineMessage>,
}

impl EngineHandle {
    pub fn new(sender: mpsc::UnboundedSender<EngineMessage>) -> Self {
        Self { sender }
    }

    /// Dispatch a message and wait for the outcome.
    pub async fn apply(&self, message: Message) -> Result<HandlerOutcome, String> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EngineMessage::Apply {
                message,
                response: tx,
            })
            .map_err(|_| "Engine actor has shut down".to_string())?;

        rx.await
            .map_err(|_| "Engine actor did not respond".to_string())?
    }

    /// Get a snapshot of the project context.
    pub async fn context(&self) -> Result<ProjectContext, String> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EngineMessage::GetContext { response: tx })
            .map_err(|_| "Engine actor has shut down".to_string())?;

        rx.await
            .map_err(|_| "Engine actor did not respond".to_string())
    }

    /// Get the action log, oldest first. Empty if the engine is gone.
    pub async fn action_log(&self) -> Vec<ActionLogEntry> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(EngineMessage::GetActionLog { response: tx })
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Get the plan and guidelines documents.
    pub async fn documents(&self) -> Result<(PlanDocument, GuidelinesDocument), String> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(EngineMessage::GetDocuments { response: tx })
            .map_err(|_| "Engine actor has shut down".to_string())?;

        rx.await
            .map_err(|_| "Engine actor did not respond".to_string())
    }

    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Shutdown the engine actor.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(EngineMessage::Shutdown);
    }
}

/// Spawn an engine actor on the current tokio runtime.
pub fn spawn_engine(
    max_log_size: usize,
    events: Option<broadcast::Sender<ServerEvent>>,
) -> EngineHandle {
    let (tx, rx) = mpsc::unbounded_channel();

    let actor = ContextEngineActor::new(max_log_size, events, rx);
    tokio::spawn(async move {
        actor.run().await;
    });

    EngineHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComponentAddedPayload, FileModifiedPayload, Payload};

    fn component_added(name: &str) -> Message {
        Message::new(Payload::ComponentAdded(ComponentAddedPayload {
            component_name: name.to_string(),
            file_path: format!("src/{}.ts", name),
            dependencies: vec![],
        }))
    }

    #[tokio::test]
    async fn test_engine_actor_creation() {
        let handle = spawn_engine(10, None);

        let context = handle.context().await.unwrap();
        assert!(context.components.is_empty());
        assert!(handle.action_log().await.is_empty());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_engine_component_added() {
        let handle = spawn_engine(10, None);

        let outcome = handle
            .apply(component_added("Foo"))
            .await
            .expect("Failed to apply");
        assert!(outcome.mutated);
        let entry = outcome.entry.unwrap();
        assert_eq!(entry.kind, MessageType::ComponentAdded);
        assert_eq!(outcome.data.unwrap()["actionId"], entry.id);

        let context = handle.context().await.unwrap();
        assert_eq!(context.components["Foo"].file_path, "src/Foo.ts");

        let log = handle.action_log().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].payload["componentName"], "Foo");

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_queries_are_not_logged() {
        let handle = spawn_engine(10, None);
        handle.apply(component_added("Foo")).await.unwrap();

        let outcome = handle.apply(Message::new(Payload::GetContext)).await.unwrap();
        assert!(outcome.entry.is_none());
        assert!(!outcome.mutated);
        assert_eq!(
            outcome.data.unwrap()["components"]["Foo"]["filePath"],
            "src/Foo.ts"
        );

        let outcome = handle.apply(Message::new(Payload::GetActionLog)).await.unwrap();
        assert_eq!(outcome.data.unwrap().as_array().unwrap().len(), 1);
        assert_eq!(handle.action_log().await.len(), 1);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_action_log_eviction() {
        let handle = spawn_engine(3, None);
        for n in 0..4 {
            let message = Message::new(Payload::FileModified(FileModifiedPayload {
                file_path: format!("f{}", n),
                summary: None,
                changes: vec![],
            }));
            handle.apply(message).await.unwrap();
        }

        let paths: Vec<Value> = handle
            .action_log()
            .await
            .into_iter()
            .map(|e| e.payload["filePath"].clone())
            .collect();
        assert_eq!(paths, vec![json!("f1"), json!("f2"), json!("f3")]);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_handler_leaves_log_untouched() {
        let handle = spawn_engine(10, None);
        let err = handle
            .apply(Message::new(Payload::StateUpdated(json!({}))))
            .await
            .unwrap_err();
        assert!(err.contains("STATE_UPDATED"));
        assert!(handle.action_log().await.is_empty());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let (tx, mut rx) = broadcast::channel(16);
        let handle = spawn_engine(10, Some(tx));

        handle.apply(component_added("Foo")).await.unwrap();

        assert!(matches!(rx.recv().await.unwrap(), ServerEvent::ActionProcessed(_)));
        assert_eq!(
            rx.recv().await.unwrap(),
            ServerEvent::ComponentAdded { name: "Foo".to_string() }
        );

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_documents_follow_updates() {
        let handle = spawn_engine(10, None);
        let (plan, guidelines) = handle.documents().await.unwrap();
        assert!(plan.steps.is_empty());
        assert!(guidelines.rules.is_empty());

        let update = PlanDocument {
            steps: vec![json!("scaffold"), json!("test")],
            ..PlanDocument::default()
        };
        let outcome = handle
            .apply(Message::new(Payload::UpdatePlan(update)))
            .await
            .unwrap();
        assert!(outcome.mutated);

        let (plan, _) = handle.documents().await.unwrap();
        assert_eq!(plan.steps, vec![json!("scaffold"), json!("test")]);
        assert_eq!(plan.extra["objectives"], json!([]));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_handle_after_shutdown() {
        let handle = spawn_engine(10, None);
        handle.shutdown().await;
        // Give the actor a moment to exit.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(!handle.is_alive());
        assert!(handle.apply(component_added("Foo")).await.is_err());
        assert!(handle.action_log().await.is_empty());
    }
}
