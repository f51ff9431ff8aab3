//! CLI command implementations.
//!
//! Each submodule keeps pure formatting separate from Docker IO for
//! testability.

pub mod exec;
pub mod format;
pub mod remove;
pub mod serve;
