//! Workflow orchestration for Blogsmith.
//!
//! This crate turns the completion and spreadsheet ports into the scheduled
//! blog pipeline: prompt constants, the four stages, the workflow runner with
//! its event hook, and the fixed-period scheduler.

pub mod events;
pub mod prompts;
pub mod runner;
pub mod scheduler;
pub mod stages;

#[cfg(test)]
mod testing;

pub use events::{RunEvent, RunEventSink, TracingEventSink};
pub use runner::{PREVIEW_CHARS, RunOutcome, WorkflowRunner};
pub use scheduler::{Clock, Job, Scheduler, TokioClock};
pub use stages::Stages;
