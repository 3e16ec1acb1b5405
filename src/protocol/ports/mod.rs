//! Port definitions for the protocol subsystem.

pub mod validator;

pub use validator::{MessageValidator, ValidationConfig, ValidationResult};
