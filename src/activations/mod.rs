//! # Activation Functions Module
//!
//! Hidden layers of the Q-networks use the rectified linear unit, the output
//! layer is linear so that action values are unbounded.
//!
//! - **ReLU**: `max(0, x)`
//! - **Linear**: identity

pub mod functions;

pub use functions::Activation;
