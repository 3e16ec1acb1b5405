//! Worker handler adapters.

pub mod handler_fn;

pub use handler_fn::{FnHandler, handler_fn};
