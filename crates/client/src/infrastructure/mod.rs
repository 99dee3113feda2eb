//! Infrastructure: transport, messaging, and frame translation.

pub mod frame_translator;
pub mod messaging;
pub mod websocket;
