//! Adapters for the protocol subsystem.

pub mod wire;
