//! Translates wire frames into client events.
//!
//! Kept separate from the socket code so the mapping can be tested without a
//! connection.

use rehaflow_domain::{HandPressure, SensorReading};
use rehaflow_shared::{InboundFrame, WeightDataFrame};

use crate::infrastructure::messaging::ClientEvent;

/// Build a domain reading; absent or `null` numbers become zero.
pub fn reading_from_frame(frame: &WeightDataFrame) -> SensorReading {
    let sensors = frame.pressure_sensors.unwrap_or_default();
    SensorReading::new(
        frame.timestamp.unwrap_or(0.0),
        frame.primary_scale,
        frame.secondary_scale.unwrap_or(0.0),
        HandPressure::new(
            sensors.sensor1.unwrap_or(0.0),
            sensors.sensor2.unwrap_or(0.0),
            sensors.sensor3.unwrap_or(0.0),
        ),
    )
}

/// Map a decoded frame to the event it publishes.
///
/// Returns `None` for frame types the client does not handle.
pub fn translate(frame: InboundFrame) -> Option<ClientEvent> {
    match frame {
        InboundFrame::Connection(notice) => Some(ClientEvent::ConnectionConfirmed(notice)),
        InboundFrame::WeightData(data) => Some(ClientEvent::WeightData(reading_from_frame(&data))),
        InboundFrame::Response(response) => Some(ClientEvent::CommandResponse(response)),
        InboundFrame::Error(error) => Some(ClientEvent::ServerError(error)),
        InboundFrame::Unknown { kind } => {
            tracing::debug!(frame_type = %kind, "Ignoring frame of unknown type");
            None
        }
    }
}
