//! Deterministic runtime for a coding agent.
//!
//! A run turns one user prompt into a classified intent, an ordered plan,
//! per-step policy decisions and finally step executions, halting on the
//! first blocked or failed step. The crate keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (intent parsing, plans, policy,
//!   validation, lifecycle states). No I/O.
//! - **[`io`]**: Side effects (model backends, configuration, history,
//!   approval prompts, step executors). Behind traits so tests can script them.
//! - **[`agents`]**: The model-backed classifier and planner.
//!
//! [`runtime`] orchestrates a run and [`bootstrap`] wires one from a
//! workspace.

pub mod agents;
pub mod bootstrap;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod runtime;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
