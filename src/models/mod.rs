mod context;
mod message;
mod payloads;

pub use context::*;
pub use message::{Envelope, Message, MessageType, Payload, Timestamp};
pub use payloads::*;
