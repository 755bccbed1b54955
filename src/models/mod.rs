pub mod app_state;
pub mod messages;
pub mod registry;
pub mod room;

// Re-export important types
pub use app_state::AppState;
pub use messages::*;
pub use registry::RoomRegistry;
pub use room::*;

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, for move and archive timestamps.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
