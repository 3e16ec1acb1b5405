//! Unit tests for the orchestrator module.

mod service_tests;
