//! Ports for worker agents.

pub mod handler;

pub use handler::WorkerHandler;
