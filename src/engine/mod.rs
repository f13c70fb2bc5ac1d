mod action_log;
mod actor;
mod events;
mod state;

pub use action_log::ActionLog;
pub use actor::{spawn_engine, EngineHandle, EngineMessage, HandlerOutcome};
pub use events::ServerEvent;
pub use state::{Applied, ProjectState};
