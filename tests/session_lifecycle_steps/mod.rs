//! Step definitions for session lifecycle scenarios.

pub mod world;

mod given;
mod then;
mod when;
