//! # MPC library.
//!
//! This library allows other crates in the workspace, and the benchmarks, to
//! access items defined inside the MPC crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// MPC control - computes steering and throttle demands to follow the reference curve
pub mod mpc_ctrl;

/// Nonlinear program interface and its `optimization_engine` backed solver
pub mod nlp;

/// Reference curve - fits and evaluates the reference path in the vehicle frame
pub mod reference;

/// Vehicle model - kinematic bicycle model used for prediction
pub mod vehicle_model;
