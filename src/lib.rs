//! Concierge: agent communication and reliability orchestration.
//!
//! This crate routes caller conversations to worker agents over a typed
//! message protocol, keeps per-session conversational state, and protects
//! every worker call with circuit breakers, adaptive retry and ordered
//! fallback chains.
//!
//! # Architecture
//!
//! Concierge follows hexagonal architecture principles:
//!
//! - **Domain**: Pure state and rules with no infrastructure dependencies
//! - **Ports**: Trait interfaces for workers, storage and the NLU boundary
//! - **Adapters**: Concrete implementations of ports (memory, files, templates)
//!
//! # Modules
//!
//! - [`protocol`]: Message format, error taxonomy and validation
//! - [`communication`]: Dispatch, correlation and timeouts
//! - [`session`]: Session lifecycle over pluggable storage tiers
//! - [`resilience`]: Circuit breakers, adaptive retry and fallback chains
//! - [`orchestrator`]: The `process_input` composition root
//! - [`config`]: TOML configuration
//! - [`clock`]: Deterministic time for tests

pub mod clock;
pub mod communication;
pub mod config;
pub mod orchestrator;
pub mod protocol;
pub mod resilience;
pub mod session;
