//! Session services.

mod manager;

pub use manager::{SessionConfig, SessionError, SessionResult, SessionStateManager};
