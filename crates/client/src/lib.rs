//! RehaFlow Client - real-time link to the rehab sensor server.
//!
//! - `infrastructure`: WebSocket connection, event bus, command channel
//! - `application`: exercise loop and feedback rendering
//! - `client`: the [`SensorClient`] facade tying them together

pub mod application;
pub mod client;
pub mod config;
pub mod infrastructure;

pub use client::SensorClient;
pub use config::{ClientConfig, ConfigError};
pub use infrastructure::messaging::{
    ClientEvent, CommandChannel, ConnectionError, ConnectionState, ConnectionStatus, EventBus,
    EventKind, SubscriptionHandle,
};
pub use infrastructure::websocket::{ConnectionManager, ReconnectPolicy};
