//! Communication services.

pub mod manager;

pub use manager::{CommunicationConfig, CommunicationManager};
