//! Event and command messaging on top of the sensor connection.
//!
//! - `EventBus`: push-based subscription to server events
//! - `CommandChannel`: request/response commands with timeouts
//! - `connection`: connection state and errors

pub mod command_channel;
pub mod connection;
pub mod event_bus;

pub use command_channel::{
    CommandChannel, PendingCommands, DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_HISTORY_LIMIT,
};
pub use connection::{ConnectionError, ConnectionState, ConnectionStatus};
pub use event_bus::{ClientEvent, EventBus, EventKind, SubscriptionHandle};
