//! Side-effecting operations: filesystem, model HTTP calls, git and build
//! processes.

pub mod artifacts;
pub mod build;
pub mod config;
pub mod context;
pub mod git;
pub mod model;
pub mod process;
pub mod prompt;
pub mod report;
