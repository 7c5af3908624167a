//! Deterministic, pure logic shared by the runtime.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod intent;
pub mod intent_rules;
pub mod plan;
pub mod policy;
pub mod schema;
pub mod status;
pub mod types;
pub mod validator;
