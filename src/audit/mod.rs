//! Audit HTTP surface
//!
//! Serves and stores the project plan, the guidelines and an append-only
//! audit log, plus read-only views of the README and the directory tree.

mod server;
mod store;

pub use server::{router, start_audit_server, ContentBody};
pub use store::{AuditStore, USER_ACTOR};
