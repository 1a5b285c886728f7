//! Content analysis pipeline for postcheck.
//!
//! This crate sequences query planning, research, and rewriting into a single
//! fact-check pass over one post (see [`pipeline::Analyzer`]). Each stage returns
//! its own counters; the orchestrator sums them and owns the deadline.

pub mod fallback;
pub mod pipeline;
pub mod planner;
pub mod research;
pub mod rewrite;

#[cfg(test)]
pub(crate) mod testing;

pub use pipeline::{Analyzer, PipelineError, ProgressReporter, SilentProgress};
