//! # MPC control module
//!
//! Model predictive control keeps the vehicle on the reference curve. Each
//! cycle it plans the vehicle's motion over a short horizon of `N` states
//! spaced `dt` apart, choosing the steering and throttle at each step so as
//! to minimise a weighted sum of
//!
//! - the cross track and heading errors of every state,
//! - the deviation of every state's speed from the reference speed,
//! - the size of every actuation,
//! - the change between consecutive actuations,
//!
//! subject to the vehicle model holding between consecutive states and the
//! actuator limits. Only the first actuation of the plan is executed, the
//! whole plan is rebuilt from scratch next cycle.
//!
//! Demands take effect one latency period after they are computed, so the
//! plan starts from the state the vehicle will be in once the previous
//! demand has been executed for that long (see `delay`).

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod delay;
pub mod horizon;
pub mod layout;
pub mod params;
pub mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use horizon::HorizonProblem;
pub use layout::*;
pub use params::{Params, Weights};
pub use state::*;
