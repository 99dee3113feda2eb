//! WebSocket transport to the sensor server.

mod client;
mod reconnect;

pub use reconnect::{ReconnectPolicy, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_INTERVAL_MS};
pub use client::ConnectionManager;

// =============================================================================
// WebSocket Integration Tests
// =============================================================================
