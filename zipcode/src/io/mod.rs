//! I/O helpers for the runtime: providers, configuration, persistence,
//! approval signals and step execution.

pub mod approval;
pub mod config;
pub mod executor;
pub mod history;
pub mod openai;
pub mod prompt;
pub mod provider;
pub mod workspace;
