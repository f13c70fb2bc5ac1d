//! Wire-level protocol helpers shared by client and server.

pub mod response;
pub mod validation;

pub use response::{error_codes, Response};
pub use validation::{message_type, validate, Severity, ValidationOptions, ValidationReport};
