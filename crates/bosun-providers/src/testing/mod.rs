//! Testing utilities for resolver and runtime tests
//!
//! Mock providers that count every call so tests can assert on probe traffic.

pub mod mocks;

pub use mocks::MockProvider;
