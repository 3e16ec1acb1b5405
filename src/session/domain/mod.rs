//! Session domain types.

mod session;

pub use session::{
    DEFAULT_MAX_HISTORY, DEFAULT_TTL, HistoryEntry, HistoryRole, Session, SessionLimits,
};
