/// Utility modules for mcpwire
///
/// Shared helpers that every layer uses: timestamps in the wire formats.
pub mod time;

pub use time::{now_millis, now_utc};
