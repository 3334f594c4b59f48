//! # Simulator message module
//!
//! The driving simulator talks in socket.io style text frames. A frame
//! starting with `42` carries an event, encoded as a JSON array whose first
//! element is the event name and whose second element is the event payload:
//!
//! ```text
//! 42["telemetry",{"ptsx":[...],"ptsy":[...],"x":1.0,...}]
//! ```
//!
//! A `42` frame containing `null` means the simulator is in manual mode.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::trace;
use serde::{Deserialize, Serialize};
use serde_json::{self, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Prefix of a frame carrying an event.
pub const EVENT_PREFIX: &str = "42";

/// Name of the telemetry event.
pub const TELEMETRY_EVENT: &str = "telemetry";

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Telemetry sent by the simulator once per update.
///
/// All positions are in the world frame, `psi` is the heading in radians and
/// `speed` is in the simulator's speed units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    /// World x coordinates of the reference waypoints
    pub ptsx: Vec<f64>,

    /// World y coordinates of the reference waypoints
    pub ptsy: Vec<f64>,

    /// Vehicle world x position
    pub x: f64,

    /// Vehicle world y position
    pub y: f64,

    /// Vehicle heading
    pub psi: f64,

    /// Vehicle speed
    pub speed: f64,

    /// Steering angle currently applied by the vehicle
    pub steering_angle: f64,

    /// Throttle currently applied by the vehicle
    pub throttle: f64,
}

/// Demands sent back to the simulator in reply to telemetry.
///
/// `mpc_x`/`mpc_y` are drawn as the predicted trajectory and
/// `next_x`/`next_y` as the reference line, both in the vehicle frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SteerDems {
    /// Normalised steering demand in `[-1, 1]`
    pub steering_angle: f64,

    /// Throttle demand in `[-1, 1]`
    pub throttle: f64,

    pub mpc_x: Vec<f64>,
    pub mpc_y: Vec<f64>,

    pub next_x: Vec<f64>,
    pub next_y: Vec<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An event received from the simulator.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    /// New telemetry, a reply is expected.
    Telemetry(Telemetry),

    /// The simulator is being driven manually, reply with a manual frame.
    Manual,
}

/// Possible errors while handling simulator messages.
#[derive(Debug, Error)]
pub enum SimMsgError {
    #[error("Frame contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("Frame is not an event array: {0}")]
    NotAnEvent(String),

    #[error("Unrecognised event \"{0}\"")]
    UnknownEvent(String),

    #[error("Invalid telemetry payload: {0}")]
    InvalidTelemetry(serde_json::Error),

    #[error("Cannot serialise the demands: {0}")]
    SerialiseError(serde_json::Error),
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl SimEvent {
    /// Parse an event from a raw frame.
    ///
    /// Returns `Ok(None)` if the frame does not carry an event at all (e.g.
    /// socket.io ping frames), in which case no reply should be sent.
    pub fn from_frame(frame: &str) -> Result<Option<Self>, SimMsgError> {
        let frame = frame.trim();

        if frame.len() <= EVENT_PREFIX.len() || !frame.starts_with(EVENT_PREFIX) {
            trace!("Ignoring non-event frame {:?}", frame);
            return Ok(None);
        }

        let event = match extract_event(frame) {
            Some(e) => e,
            None => {
                trace!("Manual driving frame");
                return Ok(Some(SimEvent::Manual));
            }
        };

        let val: Value = serde_json::from_str(event).map_err(SimMsgError::InvalidJson)?;

        let name = match val.get(0).and_then(Value::as_str) {
            Some(n) => n,
            None => {
                return Err(SimMsgError::NotAnEvent(String::from(
                    "Expected the first element to be the event name",
                )))
            }
        };

        match name {
            TELEMETRY_EVENT => {
                let payload = val.get(1).cloned().unwrap_or(Value::Null);
                let telem: Telemetry =
                    serde_json::from_value(payload).map_err(SimMsgError::InvalidTelemetry)?;
                Ok(Some(SimEvent::Telemetry(telem)))
            }
            _ => Err(SimMsgError::UnknownEvent(name.to_string())),
        }
    }
}

impl SteerDems {
    /// Build the `steer` frame to send to the simulator.
    pub fn to_frame(&self) -> Result<String, SimMsgError> {
        let payload = serde_json::to_string(self).map_err(SimMsgError::SerialiseError)?;

        Ok(format!("{}[\"steer\",{}]", EVENT_PREFIX, payload))
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Get the JSON event array out of an event frame.
///
/// Returns `None` if the frame contains `null` (manual driving) or has no
/// bracketed payload.
pub fn extract_event(frame: &str) -> Option<&str> {
    if frame.contains("null") {
        return None;
    }

    let start = frame.find('[')?;
    let end = frame.rfind("}]")?;

    if end < start {
        return None;
    }

    Some(&frame[start..end + 2])
}

/// The frame sent in reply to a manual driving frame.
pub fn manual_frame() -> String {
    format!("{}[\"manual\",{{}}]", EVENT_PREFIX)
}
