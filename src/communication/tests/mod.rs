//! Unit tests for the communication module.

mod domain_tests;
