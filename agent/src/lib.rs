//! Issue-driven "build-small" agent.
//!
//! Turns an issue description into a validated change proposal: the model is
//! asked for a plan and a unified diff, the diff is applied to the working
//! tree, the project is built, and a report is written for the PR creator.
//!
//! - **[`core`]**: Pure, deterministic logic (response parsing, scope checks,
//!   text helpers, record types). No I/O.
//! - **[`io`]**: Side-effecting operations (filesystem, model HTTP calls,
//!   git and build processes). Isolated behind traits so tests can script them.
//!
//! [`pipeline`] coordinates the stages; [`render`] holds the non-LLM
//! comment/PR-body renderers used by the plan-only and smoke workflows.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod render;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
