//! Unit tests for the protocol module.

mod validation_tests;
