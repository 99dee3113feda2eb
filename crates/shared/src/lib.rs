//! RehaFlow Shared - wire protocol for the sensor server.
//!
//! JSON frames exchanged over the WebSocket, command names, and command
//! error types. Nothing here performs I/O.

pub mod commands;
pub mod messages;
pub mod responses;

pub use commands::CommandName;
pub use messages::{
    CommandResponse, ConnectionNotice, FrameError, InboundFrame, OutboundCommand,
    PressureSensors, ServerErrorFrame, WeightDataFrame, RESERVED_COMMAND_KEYS, STATUS_SUCCESS,
};
pub use responses::{CommandError, GENERIC_FAILURE_MESSAGE};
