//! Kaniko build plugins for CI pipelines.
//!
//! Each binary logs in to one kind of registry, resolves the
//! image tags, and runs the kaniko executor.

pub mod commands;
pub mod plugin;
