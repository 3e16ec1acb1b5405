//! Unit tests for the resilience primitives.

mod circuit_breaker_tests;
