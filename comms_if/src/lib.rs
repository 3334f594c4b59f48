//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the controller.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Message definitions for the driving simulator's event protocol
pub mod sim;
