//! # MPC Executable Parameters
//!
//! This module provide parameters for the MPC executable.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MpcExecParams {
    /// Parameter file to initialise MpcCtrl from, relative to the params directory
    pub mpc_ctrl_params_file: String,

    /// Time to wait before replying to a telemetry frame, emulating the actuation latency of a
    /// real vehicle
    pub reply_delay_ms: u64,

    /// What to send when a control cycle fails
    pub fallback: FallbackMode,

    /// Throttle to send when braking in the `Brake` fallback
    pub brake_throttle: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Demands sent when no new demands could be computed.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum FallbackMode {
    /// Repeat the last demands sent
    HoldPrevious,

    /// Keep the last steering demand and brake
    Brake,
}
