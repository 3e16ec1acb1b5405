//! Session storage tiers.

pub mod file;
pub mod memory;

pub use file::FileSessionStore;
pub use memory::{EphemeralSessionStore, ScopedSessionStore};
